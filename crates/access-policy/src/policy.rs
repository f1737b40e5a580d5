//! Policy definition and composition.

use crate::condition::{Condition, ConditionRegistry};
use crate::context::EvaluationContext;
use crate::decision::AccessEnforcement;
use crate::error::{json_type_name, PolicyError, Result};
use crate::evaluator::PolicyEvaluator;
use crate::principal::{ActorGroups, GroupMembership, GroupResolver, PrincipalMatcher};
use crate::statement::{FieldStatement, Statement};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Default prefix of group principal tokens.
pub const DEFAULT_GROUP_PREFIX: &str = "group:";

/// Default prefix of identity principal tokens.
pub const DEFAULT_ID_PREFIX: &str = "id:";

/// Where a policy's statements come from.
///
/// Policies can embed other policies, either as built instances or as
/// templates that are built on demand, to reuse groups of statements.
#[derive(Clone)]
pub enum Source<S> {
    /// A typed statement.
    Statement(S),
    /// A raw mapping, converted when the policy is flattened.
    Mapping(serde_json::Value),
    /// Another policy whose statements are spliced in place.
    Policy(Arc<AccessPolicy>),
    /// A policy built with no arguments, then spliced in place.
    Template(fn() -> AccessPolicy),
}

/// Source of access statements.
pub type StatementSource = Source<Statement>;

/// Source of field statements.
pub type FieldStatementSource = Source<FieldStatement>;

impl<S> Source<S> {
    /// Embeds the statements of a policy type.
    pub fn template<T: PolicyTemplate>() -> Self {
        Source::Template(T::build)
    }
}

impl From<Statement> for StatementSource {
    fn from(statement: Statement) -> Self {
        Source::Statement(statement)
    }
}

impl From<FieldStatement> for FieldStatementSource {
    fn from(statement: FieldStatement) -> Self {
        Source::Statement(statement)
    }
}

impl<S> From<serde_json::Value> for Source<S> {
    fn from(value: serde_json::Value) -> Self {
        Source::Mapping(value)
    }
}

impl<S> From<AccessPolicy> for Source<S> {
    fn from(policy: AccessPolicy) -> Self {
        Source::Policy(Arc::new(policy))
    }
}

impl<S> From<Arc<AccessPolicy>> for Source<S> {
    fn from(policy: Arc<AccessPolicy>) -> Self {
        Source::Policy(policy)
    }
}

impl<S: fmt::Debug> fmt::Debug for Source<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Statement(s) => f.debug_tuple("Statement").field(s).finish(),
            Source::Mapping(v) => f.debug_tuple("Mapping").field(v).finish(),
            Source::Policy(p) => f.debug_tuple("Policy").field(&p.to_string()).finish(),
            Source::Template(_) => f.write_str("Template"),
        }
    }
}

/// A policy type that can be embedded without building it first.
pub trait PolicyTemplate {
    fn build() -> AccessPolicy;
}

/// A complete access policy.
#[derive(Clone)]
pub struct AccessPolicy {
    id: Option<String>,
    name: String,
    statements: Vec<StatementSource>,
    field_permissions: BTreeMap<String, Vec<FieldStatementSource>>,
    group_prefix: String,
    id_prefix: String,
    conditions: HashMap<String, Condition>,
    group_resolver: Option<Arc<dyn GroupResolver>>,
    membership: Arc<dyn GroupMembership>,
    registry: Option<Arc<ConditionRegistry>>,
}

/// Serialized form of a policy.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    group_prefix: Option<String>,
    #[serde(default)]
    id_prefix: Option<String>,
    #[serde(default)]
    statements: Vec<serde_json::Value>,
    #[serde(default)]
    field_permissions: BTreeMap<String, Vec<serde_json::Value>>,
}

impl AccessPolicy {
    /// Creates an empty policy.
    pub fn new() -> Self {
        Self {
            id: None,
            name: "AccessPolicy".to_string(),
            statements: Vec::new(),
            field_permissions: BTreeMap::new(),
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            conditions: HashMap::new(),
            group_resolver: None,
            membership: Arc::new(ActorGroups),
            registry: None,
        }
    }

    /// Sets the policy id shown in error messages.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the policy type name shown in error messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends a statement source.
    pub fn with_statement(mut self, source: impl Into<StatementSource>) -> Self {
        self.statements.push(source.into());
        self
    }

    /// Replaces the statement sources.
    pub fn with_statements<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<StatementSource>,
    {
        self.statements = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the field statement sources for a field-permission key.
    pub fn with_field_permissions<I>(mut self, key: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldStatementSource>,
    {
        self.field_permissions
            .insert(key.into(), sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Registers a condition local to this policy.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.insert(condition.name().to_string(), condition);
        self
    }

    /// Resolves group tokens by listing the actor's group values.
    pub fn with_group_resolver(mut self, resolver: impl GroupResolver + 'static) -> Self {
        self.group_resolver = Some(Arc::new(resolver));
        self
    }

    /// Resolves group tokens by asking a membership store. Ignored while a
    /// group resolver is set.
    pub fn with_group_membership(mut self, membership: impl GroupMembership + 'static) -> Self {
        self.membership = Arc::new(membership);
        self
    }

    /// Uses a private condition registry instead of the global one.
    pub fn with_registry(mut self, registry: Arc<ConditionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Parses a policy from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: PolicyDocument = serde_yaml::from_str(yaml)?;
        let policy = Self::from_document(document);
        policy.validate()?;
        Ok(policy)
    }

    /// Builds a policy from an already parsed YAML document.
    pub fn from_yaml_value(value: serde_yaml::Value) -> Result<Self> {
        let document: PolicyDocument = serde_yaml::from_value(value)?;
        let policy = Self::from_document(document);
        policy.validate()?;
        Ok(policy)
    }

    /// Parses a policy from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: PolicyDocument = serde_json::from_str(json)?;
        let policy = Self::from_document(document);
        policy.validate()?;
        Ok(policy)
    }

    fn from_document(document: PolicyDocument) -> Self {
        let mut policy = AccessPolicy::new().with_statements(document.statements);
        policy.id = document.id;
        if let Some(name) = document.name {
            policy.name = name;
        }
        if let Some(prefix) = document.group_prefix {
            policy.group_prefix = prefix;
        }
        if let Some(prefix) = document.id_prefix {
            policy.id_prefix = prefix;
        }
        for (key, sources) in document.field_permissions {
            policy = policy.with_field_permissions(key, sources);
        }
        policy
    }

    /// Checks that every statement source converts into a statement.
    pub fn validate(&self) -> Result<()> {
        self.flatten_statements()?;
        for key in self.field_permissions.keys() {
            self.flatten_field_statements(key)?;
        }
        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn group_prefix(&self) -> &str {
        &self.group_prefix
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    pub fn statement_sources(&self) -> &[StatementSource] {
        &self.statements
    }

    /// Field-permission keys, in sorted order.
    pub fn field_permission_keys(&self) -> impl Iterator<Item = &str> {
        self.field_permissions.keys().map(String::as_str)
    }

    /// Field statement sources for a key.
    pub fn field_statement_sources(&self, key: &str) -> Result<&[FieldStatementSource]> {
        self.field_permissions
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| PolicyError::UnknownFieldKey {
                policy: self.to_string(),
                key: key.to_string(),
            })
    }

    /// A condition registered on this policy.
    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    /// The registry consulted for conditions not registered on the policy.
    pub fn registry(&self) -> &ConditionRegistry {
        match &self.registry {
            Some(registry) => registry,
            None => ConditionRegistry::global(),
        }
    }

    /// The principal matcher configured by this policy.
    pub fn principal_matcher(&self) -> PrincipalMatcher<'_> {
        PrincipalMatcher {
            group_prefix: &self.group_prefix,
            id_prefix: &self.id_prefix,
            resolver: self.group_resolver.as_deref(),
            membership: self.membership.as_ref(),
        }
    }

    /// Flattens nested statement sources into typed statements, in order.
    pub fn flatten_statements(&self) -> Result<Vec<Statement>> {
        let mut out = Vec::new();
        self.collect_statements(&mut out)?;
        Ok(out)
    }

    fn collect_statements(&self, out: &mut Vec<Statement>) -> Result<()> {
        for (index, source) in self.statements.iter().enumerate() {
            match source {
                Source::Statement(statement) => out.push(statement.clone()),
                Source::Mapping(value @ serde_json::Value::Object(_)) => out.push(Statement::from_mapping(value)?),
                Source::Mapping(value) => {
                    return Err(PolicyError::InvalidStatementSource {
                        kind: json_type_name(value).to_string(),
                        policy: self.to_string(),
                        index,
                    })
                }
                Source::Policy(policy) => policy.collect_statements(out)?,
                Source::Template(build) => build().collect_statements(out)?,
            }
        }
        Ok(())
    }

    /// Flattens the field statement sources of one key, in order.
    pub fn flatten_field_statements(&self, key: &str) -> Result<Vec<FieldStatement>> {
        let mut out = Vec::new();
        self.collect_field_statements(key, &mut out)?;
        Ok(out)
    }

    fn collect_field_statements(&self, key: &str, out: &mut Vec<FieldStatement>) -> Result<()> {
        for (index, source) in self.field_statement_sources(key)?.iter().enumerate() {
            match source {
                Source::Statement(statement) => out.push(statement.clone()),
                Source::Mapping(value @ serde_json::Value::Object(_)) => {
                    out.push(FieldStatement::from_mapping(value)?)
                }
                Source::Mapping(value) => {
                    return Err(PolicyError::InvalidFieldStatementSource {
                        kind: json_type_name(value).to_string(),
                        policy: self.to_string(),
                        key: key.to_string(),
                        index,
                    })
                }
                Source::Policy(policy) => policy.collect_field_statements(key, out)?,
                Source::Template(build) => build().collect_field_statements(key, out)?,
            }
        }
        Ok(())
    }

    /// Whether the context is allowed by this policy.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool> {
        PolicyEvaluator::new(self).evaluate(ctx)
    }

    /// Evaluates the context and records the outcome.
    pub fn enforce(&self, ctx: &EvaluationContext) -> Result<AccessEnforcement> {
        PolicyEvaluator::new(self).enforce(ctx)
    }

    /// Names of the fields restricted for the context under `key`.
    pub fn select_fields<'f, I>(&self, key: &str, ctx: &EvaluationContext, fields: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'f str>,
    {
        PolicyEvaluator::new(self).select_fields(key, ctx, fields)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} (id={})", self.name, id),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("statements", &self.statements)
            .field("field_permissions", &self.field_permissions)
            .field("group_prefix", &self.group_prefix)
            .field("id_prefix", &self.id_prefix)
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .field("group_resolver", &self.group_resolver.is_some())
            .finish()
    }
}
