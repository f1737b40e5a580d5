//! Access Policy Engine
//!
//! Declarative, IAM-style access policies. A policy is a list of statements
//! naming principals, actions, an optional effect and conditions; evaluating
//! it against an actor and a requested action yields allow or deny. Field
//! statements select which fields are restricted for the actor.
//!
//! Compiles to both native and WASM (feature `wasm`).

pub mod action;
pub mod condition;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod fields;
pub mod parser;
pub mod policy;
pub mod principal;
pub mod statement;
pub mod types;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use condition::{Condition, ConditionModule, ConditionRegistry};
pub use config::AccessPolicySettings;
pub use context::EvaluationContext;
pub use decision::{AccessEnforcement, Decision, PolicyDecision};
pub use error::{PolicyError, Result};
pub use evaluator::PolicyEvaluator;
pub use policy::{AccessPolicy, PolicyTemplate, Source, StatementSource};
pub use statement::{FieldStatement, Statement};

/// Version of the access policy engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::condition::{Condition, ConditionModule, ConditionRegistry};
    pub use crate::config::AccessPolicySettings;
    pub use crate::context::EvaluationContext;
    pub use crate::decision::{AccessEnforcement, Decision, PolicyDecision};
    pub use crate::error::{PolicyError, Result};
    pub use crate::evaluator::PolicyEvaluator;
    pub use crate::policy::{AccessPolicy, FieldStatementSource, PolicyTemplate, Source, StatementSource};
    pub use crate::principal::{GroupMembership, GroupResolver};
    pub use crate::statement::{FieldStatement, Statement};
    pub use crate::types::*;
}
