//! Named conditions and the process-wide reusable condition registry.
//!
//! A statement refers to conditions by name, optionally with one string
//! argument: `is_owner` or `user_must_be:author`. Names resolve first against
//! the conditions registered on the policy, then against the reusable
//! condition registry.
//!
//! The registry is populated at startup: condition modules are registered
//! with [`ConditionRegistry::register_module`] and the search path is set from
//! [`AccessPolicySettings`](crate::config::AccessPolicySettings). Lookups are
//! memoized per name until [`ConditionRegistry::reset`] or the next
//! [`ConditionRegistry::configure`].

use crate::context::EvaluationContext;
use crate::error::{json_type_name, BoxError, PolicyError, Result};
use crate::policy::AccessPolicy;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// What a condition callable returns. Anything but a JSON boolean is rejected.
pub type ConditionResult = std::result::Result<serde_json::Value, BoxError>;

type ConditionFn = dyn Fn(&EvaluationContext, Option<&str>) -> ConditionResult + Send + Sync;

/// Whether a condition takes the `:arg` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    NoArgument,
    OneArgument,
}

/// A named predicate over the evaluation context.
#[derive(Clone)]
pub struct Condition {
    name: String,
    arity: Arity,
    func: Arc<ConditionFn>,
}

impl Condition {
    /// A condition that takes no argument.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&EvaluationContext) -> ConditionResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity: Arity::NoArgument,
            func: Arc::new(move |ctx: &EvaluationContext, _: Option<&str>| func(ctx)),
        }
    }

    /// A condition that takes exactly one string argument.
    pub fn with_arg<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&EvaluationContext, &str) -> ConditionResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity: Arity::OneArgument,
            func: Arc::new(move |ctx: &EvaluationContext, arg: Option<&str>| {
                func(ctx, arg.unwrap_or_default())
            }),
        }
    }

    /// A boolean predicate that takes no argument.
    pub fn predicate<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&EvaluationContext) -> bool + Send + Sync + 'static,
    {
        Self::new(name, move |ctx| Ok(serde_json::Value::Bool(func(ctx))))
    }

    /// A boolean predicate that takes one string argument.
    pub fn predicate_with_arg<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&EvaluationContext, &str) -> bool + Send + Sync + 'static,
    {
        Self::with_arg(name, move |ctx, arg| Ok(serde_json::Value::Bool(func(ctx, arg))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Invokes the callable without checking its arity.
    pub fn call(&self, ctx: &EvaluationContext, arg: Option<&str>) -> ConditionResult {
        (self.func)(ctx, arg)
    }

    fn check_arity(&self, arg: Option<&str>) -> Result<()> {
        match (self.arity, arg) {
            (Arity::NoArgument, Some(arg)) => Err(PolicyError::ConditionArgument {
                condition: self.name.clone(),
                message: format!("takes no argument but \"{}\" was given", arg),
            }),
            (Arity::OneArgument, None) => Err(PolicyError::ConditionArgument {
                condition: self.name.clone(),
                message: "requires an argument (use \"name:arg\")".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A named group of reusable conditions.
#[derive(Debug, Clone, Default)]
pub struct ConditionModule {
    name: String,
    conditions: HashMap<String, Condition>,
}

impl ConditionModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: HashMap::new(),
        }
    }

    /// Adds a condition, replacing any with the same name.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.insert(condition.name.clone(), condition);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }
}

/// Process-wide fallback for conditions not defined on a policy.
#[derive(Debug, Default)]
pub struct ConditionRegistry {
    modules: RwLock<HashMap<String, Arc<ConditionModule>>>,
    search_path: RwLock<Vec<String>>,
    cache: DashMap<String, Option<Condition>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every policy in the process.
    pub fn global() -> &'static ConditionRegistry {
        static GLOBAL: OnceLock<ConditionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ConditionRegistry::new)
    }

    /// Makes a module available to the search path under its name.
    pub fn register_module(&self, module: ConditionModule) {
        tracing::debug!(module = module.name(), "registering condition module");
        let mut modules = self.modules.write();
        modules.insert(module.name.clone(), Arc::new(module));
        self.cache.clear();
    }

    /// Sets the modules searched for reusable conditions, in order.
    pub fn configure<I, S>(&self, module_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = module_names.into_iter().map(Into::into).collect();
        tracing::debug!(modules = ?names, "configuring reusable conditions");
        let mut search_path = self.search_path.write();
        *search_path = names;
        self.cache.clear();
    }

    /// Forgets modules, search path and cached lookups.
    pub fn reset(&self) {
        self.modules.write().clear();
        self.search_path.write().clear();
        self.cache.clear();
    }

    /// Finds a reusable condition by name.
    ///
    /// The first module on the search path defining the name wins. Results,
    /// including misses, are memoized; errors are not. Modules and search
    /// path stay read-locked until the result is cached, so a concurrent
    /// `configure` or `register_module` clears it afterwards.
    pub fn lookup(&self, name: &str) -> Result<Option<Condition>> {
        if let Some(hit) = self.cache.get(name) {
            return Ok(hit.value().clone());
        }

        let modules = self.modules.read();
        let search_path = self.search_path.read();
        let found = scan(&modules, &search_path, name)?;
        Ok(self
            .cache
            .entry(name.to_string())
            .or_insert(found)
            .value()
            .clone())
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

fn scan(
    modules: &HashMap<String, Arc<ConditionModule>>,
    search_path: &[String],
    name: &str,
) -> Result<Option<Condition>> {
    for module_name in search_path {
        let module = modules
            .get(module_name)
            .ok_or_else(|| PolicyError::ConditionModuleNotFound(module_name.clone()))?;

        if let Some(condition) = module.get(name) {
            tracing::trace!(condition = name, module = module_name.as_str(), "resolved reusable condition");
            return Ok(Some(condition.clone()));
        }
    }
    Ok(None)
}

/// Resolves a condition name on the policy first, then in the registry.
pub fn resolve(policy: &AccessPolicy, name: &str) -> Result<Condition> {
    if let Some(condition) = policy.condition(name) {
        return Ok(condition.clone());
    }

    policy
        .registry()
        .lookup(name)?
        .ok_or_else(|| PolicyError::ConditionNotFound(name.to_string()))
}

/// Evaluates a condition reference of the form `name` or `name:arg`.
pub fn check_condition(policy: &AccessPolicy, reference: &str, ctx: &EvaluationContext) -> Result<bool> {
    let (name, arg) = match reference.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (reference, None),
    };

    let condition = resolve(policy, name)?;
    condition.check_arity(arg)?;

    let value = condition
        .call(ctx, arg)
        .map_err(|source| PolicyError::ConditionFailed {
            condition: reference.to_string(),
            source,
        })?;

    match value {
        serde_json::Value::Bool(result) => {
            tracing::trace!(condition = reference, result, "condition evaluated");
            Ok(result)
        }
        other => {
            tracing::warn!(condition = reference, value = %other, "condition returned a non-boolean");
            Err(PolicyError::ConditionReturnType {
                condition: reference.to_string(),
                value: match &other {
                    serde_json::Value::String(s) => s.clone(),
                    v => v.to_string(),
                },
                kind: json_type_name(&other),
            })
        }
    }
}
