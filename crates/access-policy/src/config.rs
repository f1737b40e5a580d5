//! Process-wide access policy settings.

use crate::condition::ConditionRegistry;
use crate::error::Result;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Settings shared by every policy in the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicySettings {
    /// Condition modules searched, in order, for conditions a policy does not
    /// define itself. `None` when the setting is absent or malformed.
    #[serde(default, deserialize_with = "module_names", skip_serializing_if = "Option::is_none")]
    pub reusable_conditions: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModuleNames {
    One(String),
    Many(Vec<String>),
    Other(IgnoredAny),
}

fn module_names<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ModuleNames::deserialize(deserializer)? {
        ModuleNames::One(name) => Some(vec![name]),
        ModuleNames::Many(names) => Some(names),
        ModuleNames::Other(_) => None,
    })
}

impl AccessPolicySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reusable_conditions<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reusable_conditions = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Configured module names, empty when not configured.
    pub fn modules(&self) -> &[String] {
        self.reusable_conditions.as_deref().unwrap_or_default()
    }

    /// Installs these settings into the global condition registry.
    pub fn apply(&self) {
        self.apply_to(ConditionRegistry::global());
    }

    /// Installs these settings into a registry, dropping its cached lookups.
    pub fn apply_to(&self, registry: &ConditionRegistry) {
        if self.reusable_conditions.is_none() {
            tracing::debug!("reusable conditions not configured");
        }
        registry.configure(self.modules().iter().cloned());
    }
}
