//! Core types for the access policy engine.

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request methods matched by the `<safe_methods>` action token.
pub const SAFE_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

/// Token that matches every principal, action or field.
pub const WILDCARD: &str = "*";

/// Effect of a statement.
///
/// A statement without an effect is a "default" statement, represented as
/// `Option<Effect>::None` wherever statements are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl FromStr for Effect {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(PolicyError::InvalidEffect(other.to_string())),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more string tokens.
///
/// Documents may give a single string or a list of strings wherever a
/// statement takes tokens; both forms normalize to the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct Tokens(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Tokens {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => Tokens(vec![s]),
            OneOrMany::Many(v) => Tokens(v),
        }
    }
}

impl Tokens {
    /// Returns true if the exact token is present.
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    /// Iterates over the tokens in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops a lone empty string, which optional token lists treat as "none".
    pub(crate) fn or_none(self) -> Self {
        if self.0.len() == 1 && self.0[0].is_empty() {
            Tokens::default()
        } else {
            self
        }
    }
}

impl From<&str> for Tokens {
    fn from(value: &str) -> Self {
        Tokens(vec![value.to_string()])
    }
}

impl From<String> for Tokens {
    fn from(value: String) -> Self {
        Tokens(vec![value])
    }
}

impl From<Vec<String>> for Tokens {
    fn from(value: Vec<String>) -> Self {
        Tokens(value)
    }
}

impl From<Vec<&str>> for Tokens {
    fn from(value: Vec<&str>) -> Self {
        Tokens(value.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Tokens {
    fn from(value: [&str; N]) -> Self {
        Tokens(value.iter().map(|s| s.to_string()).collect())
    }
}

/// The actor whose access is being decided.
///
/// Flags missing from a serialized actor follow its id: an actor without an
/// id is anonymous, and an actor that is not anonymous is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ActorRecord")]
pub struct Actor {
    /// Unique id; anonymous actors have none.
    pub id: Option<String>,

    /// Names of the groups the actor belongs to.
    pub groups: Vec<String>,

    pub is_superuser: bool,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_anonymous: bool,
}

#[derive(Deserialize)]
struct ActorRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    is_superuser: bool,
    #[serde(default)]
    is_staff: bool,
    is_active: Option<bool>,
    is_anonymous: Option<bool>,
}

impl From<ActorRecord> for Actor {
    fn from(record: ActorRecord) -> Self {
        let is_anonymous = record.is_anonymous.unwrap_or(record.id.is_none());
        Actor {
            id: record.id,
            groups: record.groups,
            is_superuser: record.is_superuser,
            is_staff: record.is_staff,
            is_active: record.is_active.unwrap_or(!is_anonymous),
            is_anonymous,
        }
    }
}

impl Actor {
    /// An unauthenticated actor.
    pub fn anonymous() -> Self {
        Self {
            id: None,
            groups: Vec::new(),
            is_superuser: false,
            is_staff: false,
            is_active: false,
            is_anonymous: true,
        }
    }

    /// An active, authenticated actor with the given id.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            groups: Vec::new(),
            is_superuser: false,
            is_staff: false,
            is_active: true,
            is_anonymous: false,
        }
    }

    /// Adds a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    /// Marks the actor as disabled.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

impl Default for Actor {
    fn default() -> Self {
        Actor::anonymous()
    }
}
