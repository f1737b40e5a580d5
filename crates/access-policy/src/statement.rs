//! Access and field statements.

use crate::action;
use crate::condition;
use crate::context::EvaluationContext;
use crate::error::{PolicyError, Result};
use crate::expression::Expression;
use crate::policy::AccessPolicy;
use crate::types::{Effect, Tokens};
use serde::{Deserialize, Serialize};

const STATEMENT_KIND: &str = "Access Policy Statement";
const FIELD_STATEMENT_KIND: &str = "Access Policy Serializer Statement";

/// Atomic access rule.
///
/// A statement matches when its principal, action, conditions and
/// condition expressions all match, checked in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    principal: Tokens,
    action: Tokens,
    #[serde(skip_serializing_if = "Option::is_none")]
    effect: Option<Effect>,
    #[serde(skip_serializing_if = "Tokens::is_empty")]
    condition: Tokens,
    #[serde(skip_serializing_if = "Tokens::is_empty")]
    condition_expression: Tokens,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StatementRecord {
    principal: Tokens,
    action: Tokens,
    #[serde(default)]
    effect: Option<String>,
    #[serde(default)]
    condition: Option<Tokens>,
    #[serde(default)]
    condition_expression: Option<Tokens>,
}

impl Statement {
    /// Starts a statement for the given principals and actions.
    pub fn builder(principal: impl Into<Tokens>, action: impl Into<Tokens>) -> StatementBuilder {
        StatementBuilder::new(principal, action)
    }

    /// Builds a statement from a mapping such as a parsed policy document entry.
    pub fn from_mapping(value: &serde_json::Value) -> Result<Self> {
        require_keys(value, STATEMENT_KIND, &["principal", "action"])?;

        let record: StatementRecord = serde_json::from_value(value.clone())
            .map_err(|e| PolicyError::InvalidStatement(e.to_string()))?;

        let effect = record.effect.as_deref().map(str::parse::<Effect>).transpose()?;

        Ok(Statement {
            principal: record.principal,
            action: record.action,
            effect,
            condition: record.condition.unwrap_or_default().or_none(),
            condition_expression: record.condition_expression.unwrap_or_default().or_none(),
        })
    }

    pub fn principal(&self) -> &Tokens {
        &self.principal
    }

    pub fn action(&self) -> &Tokens {
        &self.action
    }

    pub fn effect(&self) -> Option<Effect> {
        self.effect
    }

    pub fn conditions(&self) -> &Tokens {
        &self.condition
    }

    pub fn condition_expressions(&self) -> &Tokens {
        &self.condition_expression
    }

    /// Whether the context's actor is one of this statement's principals.
    pub fn match_principal(&self, policy: &AccessPolicy, ctx: &EvaluationContext) -> bool {
        policy.principal_matcher().matches(&self.principal, &ctx.actor)
    }

    /// Whether the context's action or request method is covered.
    pub fn match_action(&self, ctx: &EvaluationContext) -> bool {
        action::matches(&self.action, &ctx.method, &ctx.action)
    }

    /// All named conditions hold.
    pub fn match_condition(&self, policy: &AccessPolicy, ctx: &EvaluationContext) -> Result<bool> {
        for reference in self.condition.iter() {
            if !condition::check_condition(policy, reference, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// All condition expressions hold.
    pub fn match_condition_expression(&self, policy: &AccessPolicy, ctx: &EvaluationContext) -> Result<bool> {
        for source in self.condition_expression.iter() {
            let expression = Expression::parse(source)?;
            if !expression.evaluate(policy, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluates the statement against the context.
    ///
    /// Matchers run in a fixed order and stop at the first one that fails, so
    /// conditions never see a request whose principal or action did not match.
    pub fn evaluate(&self, policy: &AccessPolicy, ctx: &EvaluationContext) -> Result<bool> {
        let matched = self.match_principal(policy, ctx)
            && self.match_action(ctx)
            && self.match_condition(policy, ctx)?
            && self.match_condition_expression(policy, ctx)?;

        tracing::trace!(
            principal = ?self.principal,
            action = ?self.action,
            effect = ?self.effect,
            matched,
            "statement evaluated"
        );
        Ok(matched)
    }
}

/// Builder for creating statements.
#[derive(Debug)]
pub struct StatementBuilder {
    principal: Tokens,
    action: Tokens,
    effect: Option<Effect>,
    condition: Tokens,
    condition_expression: Tokens,
}

impl StatementBuilder {
    /// Creates a new statement builder.
    pub fn new(principal: impl Into<Tokens>, action: impl Into<Tokens>) -> Self {
        Self {
            principal: principal.into(),
            action: action.into(),
            effect: None,
            condition: Tokens::default(),
            condition_expression: Tokens::default(),
        }
    }

    /// Sets the effect.
    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Sets the effect to Allow.
    pub fn allow(self) -> Self {
        self.effect(Effect::Allow)
    }

    /// Sets the effect to Deny.
    pub fn deny(self) -> Self {
        self.effect(Effect::Deny)
    }

    /// Sets the named conditions, each optionally suffixed with `:arg`.
    pub fn condition(mut self, condition: impl Into<Tokens>) -> Self {
        self.condition = condition.into().or_none();
        self
    }

    /// Sets the boolean condition expressions.
    pub fn condition_expression(mut self, expression: impl Into<Tokens>) -> Self {
        self.condition_expression = expression.into().or_none();
        self
    }

    /// Builds the statement.
    pub fn build(self) -> Statement {
        Statement {
            principal: self.principal,
            action: self.action,
            effect: self.effect,
            condition: self.condition,
            condition_expression: self.condition_expression,
        }
    }
}

/// Atomic rule selecting which fields are restricted for matching principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldStatement {
    principal: Tokens,
    fields: Tokens,
    #[serde(skip_serializing_if = "Option::is_none")]
    effect: Option<Effect>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldStatementRecord {
    principal: Tokens,
    fields: Tokens,
    #[serde(default)]
    effect: Option<String>,
}

impl FieldStatement {
    /// Creates a default-effect field statement.
    pub fn new(principal: impl Into<Tokens>, fields: impl Into<Tokens>) -> Self {
        Self {
            principal: principal.into(),
            fields: fields.into(),
            effect: None,
        }
    }

    /// Sets the effect.
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Builds a field statement from a mapping.
    pub fn from_mapping(value: &serde_json::Value) -> Result<Self> {
        require_keys(value, FIELD_STATEMENT_KIND, &["principal", "fields"])?;

        let record: FieldStatementRecord = serde_json::from_value(value.clone())
            .map_err(|e| PolicyError::InvalidStatement(e.to_string()))?;

        Ok(FieldStatement {
            principal: record.principal,
            fields: record.fields,
            effect: record.effect.as_deref().map(str::parse::<Effect>).transpose()?,
        })
    }

    pub fn principal(&self) -> &Tokens {
        &self.principal
    }

    pub fn fields(&self) -> &Tokens {
        &self.fields
    }

    pub fn effect(&self) -> Option<Effect> {
        self.effect
    }

    /// Field statements carry no action, so only the principal decides a match.
    pub fn match_principal(&self, policy: &AccessPolicy, ctx: &EvaluationContext) -> bool {
        policy.principal_matcher().matches(&self.principal, &ctx.actor)
    }

    /// Whether the statement names the field, directly or through `*`.
    pub fn match_field(&self, field_name: &str) -> bool {
        self.fields.contains(crate::types::WILDCARD) || self.fields.contains(field_name)
    }
}

fn require_keys(value: &serde_json::Value, kind: &'static str, keys: &[&'static str]) -> Result<()> {
    for key in keys {
        if value.get(key).is_none() {
            return Err(PolicyError::MissingKey { kind, key });
        }
    }
    Ok(())
}
