//! Policy document parser.

use crate::error::Result;
use crate::policy::AccessPolicy;
use serde::Deserialize;

/// Supported policy document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Yaml,
    Json,
}

impl PolicyFormat {
    /// Detects format from content.
    pub fn detect(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            PolicyFormat::Json
        } else {
            PolicyFormat::Yaml
        }
    }
}

/// Parses a policy from a string, auto-detecting format.
pub fn parse_policy(content: &str) -> Result<AccessPolicy> {
    parse_policy_with_format(content, PolicyFormat::detect(content))
}

/// Parses a policy from a string with specified format.
pub fn parse_policy_with_format(content: &str, format: PolicyFormat) -> Result<AccessPolicy> {
    match format {
        PolicyFormat::Yaml => AccessPolicy::from_yaml(content),
        PolicyFormat::Json => AccessPolicy::from_json(content),
    }
}

/// Parses every policy of a multi-document YAML stream. Empty documents are
/// skipped.
pub fn parse_policies_yaml(content: &str) -> Result<Vec<AccessPolicy>> {
    let mut policies = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        policies.push(AccessPolicy::from_yaml_value(value)?);
    }
    tracing::debug!(count = policies.len(), "policies parsed");
    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;

    #[test]
    fn test_format_detection() {
        assert_eq!(PolicyFormat::detect(r#"  {"id": "test"}"#), PolicyFormat::Json);
        assert_eq!(PolicyFormat::detect("id: test"), PolicyFormat::Yaml);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
id: test
statements:
  - principal: "*"
    action: list
"#;
        let policy = parse_policy(yaml).unwrap();
        assert_eq!(policy.id(), Some("test"));
        assert_eq!(policy.flatten_statements().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"id": "test", "statements": [{"principal": ["*"], "action": "list", "effect": "allow"}]}"#;
        let policy = parse_policy(json).unwrap();
        assert_eq!(policy.id(), Some("test"));
    }

    #[test]
    fn test_parse_multiple() {
        let yaml = r#"
id: policy1
statements:
  - principal: "*"
    action: "---"
---
id: policy2
statements: []
---
"#;
        let policies = parse_policies_yaml(yaml).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[1].id(), Some("policy2"));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let yaml = "id: test\nrules: []\n";
        assert!(matches!(parse_policy(yaml), Err(PolicyError::ParseError(_))));
    }

    #[test]
    fn test_parse_reports_missing_action() {
        let yaml = "statements:\n  - principal: \"*\"\n";
        let err = parse_policy(yaml).unwrap_err();
        assert_eq!(err.to_string(), "Access Policy Statement must specify \"action\" value.");
    }
}
