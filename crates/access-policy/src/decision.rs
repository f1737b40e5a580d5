//! Access decision types.

use serde::{Deserialize, Serialize};

/// The final decision from policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Which step of the combination algorithm produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    /// The policy has no statements at all.
    EmptyPolicy,
    /// A `deny` statement matched.
    ExplicitDeny,
    /// An `allow` statement matched.
    ExplicitAllow,
    /// Every default statement matched.
    DefaultStatements,
    /// Nothing decided in favour of access.
    NoMatch,
}

/// A complete access decision with the statement that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// The final decision.
    pub decision: Decision,

    /// How the decision was reached.
    pub basis: DecisionBasis,

    /// Position, in the flattened statement list, of the deciding statement.
    pub statement_index: Option<usize>,
}

impl PolicyDecision {
    pub fn empty_policy() -> Self {
        Self {
            decision: Decision::Deny,
            basis: DecisionBasis::EmptyPolicy,
            statement_index: None,
        }
    }

    pub fn explicit_deny(index: usize) -> Self {
        Self {
            decision: Decision::Deny,
            basis: DecisionBasis::ExplicitDeny,
            statement_index: Some(index),
        }
    }

    pub fn explicit_allow(index: usize) -> Self {
        Self {
            decision: Decision::Allow,
            basis: DecisionBasis::ExplicitAllow,
            statement_index: Some(index),
        }
    }

    pub fn default_statements() -> Self {
        Self {
            decision: Decision::Allow,
            basis: DecisionBasis::DefaultStatements,
            statement_index: None,
        }
    }

    /// No statement granted access; `index` is the default statement that
    /// failed, if any.
    pub fn no_match(index: Option<usize>) -> Self {
        Self {
            decision: Decision::Deny,
            basis: DecisionBasis::NoMatch,
            statement_index: index,
        }
    }

    /// Returns true if the decision is allow.
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, Decision::Allow)
    }

    /// Returns true if the decision is deny.
    pub fn is_denied(&self) -> bool {
        matches!(self.decision, Decision::Deny)
    }
}

/// Outcome of a permission check, kept by callers alongside the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessEnforcement {
    pub action: String,
    pub allowed: bool,
}
