//! Access decision engine.
//!
//! Statements are grouped by effect and combined as:
//!
//! 1. no statements at all: deny
//! 2. any `deny` statement matches: deny
//! 3. any `allow` statement matches: allow
//! 4. otherwise allow only if there are default statements and all match
//!
//! Each group is evaluated in document order and stops at the first statement
//! that settles it, so later statements (and their conditions) are not run.

use crate::context::EvaluationContext;
use crate::decision::{AccessEnforcement, PolicyDecision};
use crate::error::Result;
use crate::fields;
use crate::policy::AccessPolicy;
use crate::statement::Statement;
use crate::types::Effect;
use std::collections::{BTreeMap, BTreeSet};

/// Evaluates a policy's statements.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEvaluator<'a> {
    policy: &'a AccessPolicy,
}

impl<'a> PolicyEvaluator<'a> {
    /// Creates a new evaluator for the policy.
    pub fn new(policy: &'a AccessPolicy) -> Self {
        Self { policy }
    }

    /// Decides the context, reporting which statement settled it.
    pub fn decide(&self, ctx: &EvaluationContext) -> Result<PolicyDecision> {
        let statements = self.policy.flatten_statements()?;
        let decision = combine(self.policy, &statements, ctx)?;

        tracing::debug!(
            policy = %self.policy,
            action = ctx.action.as_str(),
            method = ctx.method.as_str(),
            decision = ?decision.decision,
            basis = ?decision.basis,
            "access decided"
        );
        Ok(decision)
    }

    /// Whether the context is allowed.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool> {
        Ok(self.decide(ctx)?.is_allowed())
    }

    /// Evaluates the context and records the action alongside the outcome.
    pub fn enforce(&self, ctx: &EvaluationContext) -> Result<AccessEnforcement> {
        Ok(AccessEnforcement {
            action: ctx.action.clone(),
            allowed: self.evaluate(ctx)?,
        })
    }

    /// Names of the fields restricted for the context under one key.
    pub fn select_fields<'f, I>(&self, key: &str, ctx: &EvaluationContext, field_names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'f str>,
    {
        let statements = self.policy.flatten_field_statements(key)?;
        let known: BTreeSet<&str> = field_names.into_iter().collect();
        let selected = fields::select(self.policy, &statements, ctx, &known);

        tracing::debug!(policy = %self.policy, key, fields = ?selected, "fields selected");
        Ok(selected)
    }

    /// Restricted fields for every field-permission key of the policy.
    pub fn field_restrictions<'f, I>(
        &self,
        ctx: &EvaluationContext,
        field_names: I,
    ) -> Result<BTreeMap<String, BTreeSet<String>>>
    where
        I: IntoIterator<Item = &'f str>,
    {
        let known: Vec<&str> = field_names.into_iter().collect();
        self.policy
            .field_permission_keys()
            .map(|key| Ok((key.to_string(), self.select_fields(key, ctx, known.iter().copied())?)))
            .collect()
    }
}

/// Combines already flattened statements into a decision.
pub fn combine(policy: &AccessPolicy, statements: &[Statement], ctx: &EvaluationContext) -> Result<PolicyDecision> {
    if statements.is_empty() {
        return Ok(PolicyDecision::empty_policy());
    }

    let mut deny = Vec::new();
    let mut allow = Vec::new();
    let mut default = Vec::new();
    for (index, statement) in statements.iter().enumerate() {
        match statement.effect() {
            Some(Effect::Deny) => deny.push((index, statement)),
            Some(Effect::Allow) => allow.push((index, statement)),
            None => default.push((index, statement)),
        }
    }

    for (index, statement) in deny {
        if statement.evaluate(policy, ctx)? {
            return Ok(PolicyDecision::explicit_deny(index));
        }
    }

    for (index, statement) in allow {
        if statement.evaluate(policy, ctx)? {
            return Ok(PolicyDecision::explicit_allow(index));
        }
    }

    if default.is_empty() {
        return Ok(PolicyDecision::no_match(None));
    }

    for (index, statement) in default {
        if !statement.evaluate(policy, ctx)? {
            return Ok(PolicyDecision::no_match(Some(index)));
        }
    }
    Ok(PolicyDecision::default_statements())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionRegistry};
    use crate::decision::DecisionBasis;
    use crate::policy::StatementSource;
    use crate::types::Actor;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(Actor::user("1").with_group("test_group"), "create")
    }

    fn policy(statements: Vec<serde_json::Value>) -> AccessPolicy {
        AccessPolicy::new()
            .with_registry(Arc::new(ConditionRegistry::new()))
            .with_statements(statements)
    }

    #[test]
    fn test_all_match() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "create"}),
            json!({"principal": "id:1", "action": "*"}),
        ]);
        assert!(policy.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn test_not_all_match() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "create"}),
            json!({"principal": "staff", "action": "*"}),
            json!({"principal": "is_authenticated", "action": "*"}),
        ]);
        assert!(!policy.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn test_no_statements() {
        let decision = PolicyEvaluator::new(&policy(vec![])).decide(&ctx()).unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.basis, DecisionBasis::EmptyPolicy);
    }

    #[test]
    fn test_deny_matched() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "create", "effect": "allow"}),
            json!({"principal": "*", "action": "*", "effect": "deny"}),
            json!({"principal": "*", "action": "*"}),
        ]);
        let decision = PolicyEvaluator::new(&policy).decide(&ctx()).unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.basis, DecisionBasis::ExplicitDeny);
        assert_eq!(decision.statement_index, Some(1));
    }

    #[test]
    fn test_allow_matched() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "create", "effect": "allow"}),
            json!({"principal": "*", "action": "take_out_the_trash"}),
            json!({"principal": "staff", "action": "*", "effect": "deny"}),
        ]);
        let decision = PolicyEvaluator::new(&policy).decide(&ctx()).unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.statement_index, Some(0));
    }

    #[test]
    fn test_all_default_matched() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "create"}),
            json!({"principal": "*", "action": "take_out_the_trash", "effect": "allow"}),
            json!({"principal": "staff", "action": "*", "effect": "deny"}),
        ]);
        let decision = PolicyEvaluator::new(&policy).decide(&ctx()).unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.basis, DecisionBasis::DefaultStatements);
    }

    #[test]
    fn test_not_all_default_matched() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "create"}),
            json!({"principal": "*", "action": "get"}),
            json!({"principal": "*", "action": "take_out_the_trash", "effect": "allow"}),
            json!({"principal": "staff", "action": "*", "effect": "deny"}),
        ]);
        let decision = PolicyEvaluator::new(&policy).decide(&ctx()).unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.statement_index, Some(1));
    }

    #[test]
    fn test_no_default_remained() {
        let policy = policy(vec![
            json!({"principal": "*", "action": "take_out_the_trash", "effect": "allow"}),
            json!({"principal": "staff", "action": "*", "effect": "deny"}),
        ]);
        let decision = PolicyEvaluator::new(&policy).decide(&ctx()).unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.basis, DecisionBasis::NoMatch);
        assert_eq!(decision.statement_index, None);
    }

    fn counted(name: &'static str, calls: &Arc<AtomicUsize>) -> Condition {
        let calls = Arc::clone(calls);
        Condition::predicate(name, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        })
    }

    #[test]
    fn test_no_unnecessary_evaluations_when_deny() {
        let (allow, deny, default) = (
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );
        let policy = AccessPolicy::new()
            .with_registry(Arc::new(ConditionRegistry::new()))
            .with_condition(counted("allow_hit", &allow))
            .with_condition(counted("deny_hit", &deny))
            .with_condition(counted("default_hit", &default))
            .with_statements([
                Statement::builder("*", "*").allow().condition("allow_hit").build(),
                Statement::builder("*", "*").deny().condition("deny_hit").build(),
                Statement::builder("*", "*").condition("default_hit").build(),
            ]);

        assert!(!policy.evaluate(&ctx()).unwrap());
        assert_eq!(deny.load(Ordering::SeqCst), 1);
        assert_eq!(allow.load(Ordering::SeqCst), 0);
        assert_eq!(default.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_unnecessary_evaluations_when_allow() {
        let (allow, default) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let policy = AccessPolicy::new()
            .with_registry(Arc::new(ConditionRegistry::new()))
            .with_condition(counted("allow_hit", &allow))
            .with_condition(counted("default_hit", &default))
            .with_statements([
                Statement::builder("*", "*").allow().condition(["allow_hit", "allow_hit"]).build(),
                Statement::builder("*", "*").allow().condition("allow_hit").build(),
                Statement::builder("*", "*").condition("default_hit").build(),
            ]);

        assert!(policy.evaluate(&ctx()).unwrap());
        assert_eq!(allow.load(Ordering::SeqCst), 2);
        assert_eq!(default.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_evaluation_order_within_statement() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = AccessPolicy::new()
            .with_registry(Arc::new(ConditionRegistry::new()))
            .with_condition(counted("guarded", &calls))
            .with_condition(Condition::predicate("is_false", |_| false));

        let ctx = ctx();
        let principal_miss = Statement::builder("staff", "*").condition("guarded").build();
        let action_miss = Statement::builder("*", "other").condition("guarded").build();
        let condition_miss = Statement::builder("*", "*")
            .condition("is_false")
            .condition_expression("guarded")
            .build();

        assert!(!principal_miss.evaluate(&policy, &ctx).unwrap());
        assert!(!action_miss.evaluate(&policy, &ctx).unwrap());
        assert!(!condition_miss.evaluate(&policy, &ctx).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let all = Statement::builder("*", "*").condition("guarded").condition_expression("guarded").build();
        assert!(all.evaluate(&policy, &ctx).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_condition_expression_multiple() {
        let policy = AccessPolicy::new()
            .with_registry(Arc::new(ConditionRegistry::new()))
            .with_condition(Condition::predicate("is_true", |_| true))
            .with_condition(Condition::predicate("is_false", |_| false))
            .with_statement(
                Statement::builder("*", "*")
                    .condition_expression(["not is_true", "not is_false"])
                    .build(),
            );
        assert!(!policy.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn test_errors_abort_evaluation() {
        let missing = policy(vec![json!({"principal": "*", "action": "*", "condition": "missing"})]);
        assert!(missing.evaluate(&ctx()).is_err());

        let malformed = AccessPolicy::new()
            .with_registry(Arc::new(ConditionRegistry::new()))
            .with_condition(Condition::predicate("is_true", |_| true))
            .with_statement(Statement::builder("*", "*").condition_expression("is_true and (").build());
        assert!(malformed.evaluate(&ctx()).is_err());
    }

    #[test]
    fn test_group_membership_fallback() {
        let member = policy(vec![json!({"principal": "group:test_group", "action": "*"})]);
        assert!(member.evaluate(&ctx()).unwrap());

        let outsider = policy(vec![json!({"principal": "group:other", "action": "*"})]);
        assert!(!outsider.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn test_group_resolver() {
        let member = policy(vec![json!({"principal": "group:test_group", "action": "*"})])
            .with_group_resolver(|actor: &Actor| actor.groups.clone());
        assert!(member.evaluate(&ctx()).unwrap());

        let outsider = policy(vec![json!({"principal": "group:does_not_exist", "action": "*"})])
            .with_group_resolver(|actor: &Actor| actor.groups.clone());
        assert!(!outsider.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn test_id_prefix() {
        let by_uuid = policy(vec![json!({"principal": "uuid:1", "action": "*"})]).with_id_prefix("uuid:");
        assert!(by_uuid.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn test_enforce() {
        let allow_create = policy(vec![json!({"principal": "*", "action": "create", "effect": "allow"})]);
        let enforcement = allow_create.enforce(&ctx()).unwrap();
        assert_eq!(
            enforcement,
            AccessEnforcement {
                action: "create".to_string(),
                allowed: true
            }
        );
    }

    #[test]
    fn test_different_actors() {
        let by_group = policy(vec![
            json!({"action": "get", "principal": "group:hr", "effect": "allow"}),
            json!({"action": "*", "principal": "group:admin", "effect": "allow"}),
        ]);
        let fred = EvaluationContext::new(Actor::user("fred").with_group("admin"), "create");
        let jane = EvaluationContext::new(Actor::user("jane").with_group("hr"), "create");

        assert!(by_group.evaluate(&fred).unwrap());
        assert!(!by_group.evaluate(&jane).unwrap());
    }

    #[test]
    fn test_anonymous_actor() {
        let anonymous = EvaluationContext::new(Actor::anonymous(), "create");
        let policy_anonymous = policy(vec![json!({"action": "*", "principal": "anonymous"})]);
        let policy_authenticated = policy(vec![json!({"action": "*", "principal": "authenticated"})]);

        assert!(policy_anonymous.evaluate(&anonymous).unwrap());
        assert!(!policy_authenticated.evaluate(&anonymous).unwrap());
    }

    #[test]
    fn test_combine_flattened_statements() {
        let statements: Vec<StatementSource> = vec![json!({"principal": "*", "action": "*"}).into()];
        let policy = AccessPolicy::new().with_statements(statements);
        let flattened = policy.flatten_statements().unwrap();
        assert!(combine(&policy, &flattened, &ctx()).unwrap().is_allowed());
        assert!(combine(&policy, &[], &ctx()).unwrap().is_denied());
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_policy_is_shareable() {
        assert_send_sync::<AccessPolicy>();
        assert_send_sync::<ConditionRegistry>();
        assert_send_sync::<PolicyEvaluator<'static>>();
    }

    #[test]
    fn test_concurrent_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shared = policy(vec![
            json!({"principal": "authenticated", "action": "update", "condition": "is_owner", "effect": "allow"}),
            json!({"principal": "anonymous", "action": "*", "effect": "deny"}),
        ])
        .with_condition(Condition::predicate("is_owner", move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            ctx.get_value("owner_id").and_then(|owner| owner.as_str()) == ctx.actor.id.as_deref()
        }));

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let shared = &shared;
                scope.spawn(move || {
                    for round in 0..50 {
                        let owner = ((worker + round) % 4).to_string();
                        let data = json!({"owner_id": owner});
                        let owned = EvaluationContext::new(Actor::user(owner), "update").with_data(data.clone());
                        let other = EvaluationContext::new(Actor::user("nobody"), "update").with_data(data.clone());
                        let anonymous = EvaluationContext::new(Actor::anonymous(), "update").with_data(data);

                        assert!(shared.evaluate(&owned).unwrap());
                        assert!(!shared.evaluate(&other).unwrap());
                        assert!(PolicyEvaluator::new(shared).decide(&anonymous).unwrap().is_denied());
                    }
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 8 * 50 * 2);
    }
}
