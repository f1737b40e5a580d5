//! Evaluation context for access decisions.

use crate::types::Actor;
use serde::{Deserialize, Serialize};

fn default_method() -> String {
    "GET".to_string()
}

/// Everything a policy sees about a single access attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// The actor making the request.
    #[serde(default)]
    pub actor: Actor,

    /// The action being performed (view action, operation name, ...).
    #[serde(default)]
    pub action: String,

    /// The request method, upper case (`GET`, `POST`, ...).
    #[serde(default = "default_method")]
    pub method: String,

    /// Opaque data handed through to condition callables.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EvaluationContext {
    /// Creates a new evaluation context for a `GET` request.
    pub fn new(actor: Actor, action: impl Into<String>) -> Self {
        Self {
            actor,
            action: action.into(),
            method: default_method(),
            data: serde_json::Value::Null,
        }
    }

    /// Sets the request method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the pass-through data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Gets a value from the pass-through data by dotted path.
    ///
    /// - "owner_id"
    /// - "article.author.id"
    /// - "tags.0"
    pub fn get_value(&self, field_path: &str) -> Option<&serde_json::Value> {
        if field_path.is_empty() {
            return None;
        }

        field_path.split('.').try_fold(&self.data, |value, part| match value {
            serde_json::Value::Object(map) => map.get(part),
            serde_json::Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AccessPolicy;
    use serde_json::json;

    fn create_test_context() -> EvaluationContext {
        EvaluationContext::new(Actor::user("42"), "update")
            .with_method("PATCH")
            .with_data(json!({
                "article": {"author": {"id": "42"}, "tags": ["draft", "news"]},
                "owner_id": "42",
            }))
    }

    #[test]
    fn test_get_value() {
        let ctx = create_test_context();

        assert_eq!(ctx.get_value("owner_id"), Some(&json!("42")));
        assert_eq!(ctx.get_value("article.author.id"), Some(&json!("42")));
        assert_eq!(ctx.get_value("article.tags.1"), Some(&json!("news")));
        assert_eq!(ctx.get_value("article.missing"), None);
        assert_eq!(ctx.get_value(""), None);
    }

    #[test]
    fn test_deserialize_defaults() {
        let ctx: EvaluationContext = serde_json::from_str(r#"{"action": "list"}"#).unwrap();
        assert_eq!(ctx.method, "GET");
        assert!(ctx.actor.is_anonymous);
        assert!(ctx.data.is_null());
    }

    #[test]
    fn test_deserialize_empty_actor_is_anonymous() {
        let ctx: EvaluationContext = serde_json::from_str(r#"{"actor": {}, "action": "list"}"#).unwrap();
        assert_eq!(ctx.actor, Actor::anonymous());

        let policy = AccessPolicy::new().with_statements([json!({
            "principal": "authenticated",
            "action": "list",
            "effect": "allow",
        })]);
        assert!(!policy.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_deserialize_actor_with_id_is_active() {
        let ctx: EvaluationContext =
            serde_json::from_str(r#"{"actor": {"id": "7", "groups": ["editors"]}}"#).unwrap();
        assert_eq!(ctx.actor, Actor::user("7").with_group("editors"));

        let policy = AccessPolicy::new().with_statements([json!({
            "principal": "disabled",
            "action": "*",
            "effect": "allow",
        })]);
        assert!(!policy.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_deserialize_explicit_actor_flags() {
        let actor: Actor = serde_json::from_str(r#"{"id": "7", "is_active": false}"#).unwrap();
        assert_eq!(actor, Actor::user("7").inactive());

        let actor: Actor = serde_json::from_str(r#"{"is_anonymous": false, "is_active": true}"#).unwrap();
        assert!(!actor.is_anonymous && actor.is_active && actor.id.is_none());
    }
}
