//! Error types for the access policy engine.

use thiserror::Error;

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Boxed error raised from inside a condition callable.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while building or evaluating a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy document could not be parsed.
    #[error("Failed to parse policy: {0}")]
    ParseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Statement effect is neither `allow` nor `deny`.
    #[error("Statement effect must be either \"allow\" or \"deny\" (not \"{0}\")")]
    InvalidEffect(String),

    /// A mapping is missing one of the keys its statement kind requires.
    #[error("{kind} must specify \"{key}\" value.")]
    MissingKey { kind: &'static str, key: &'static str },

    /// A mapping could not be turned into a statement.
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    /// An access statement source has a shape that cannot yield statements.
    #[error("Invalid statement object type \"{kind}\", in policy {policy} at index {index}")]
    InvalidStatementSource {
        kind: String,
        policy: String,
        index: usize,
    },

    /// A field statement source has a shape that cannot yield statements.
    #[error(
        "Invalid field permissions statement object type \"{kind}\", in policy {policy} \
         for \"{key}\" at index {index}"
    )]
    InvalidFieldStatementSource {
        kind: String,
        policy: String,
        key: String,
        index: usize,
    },

    /// Field statements were requested for a key the policy does not declare.
    #[error("Policy {policy} has no field permissions for \"{key}\"")]
    UnknownFieldKey { policy: String, key: String },

    /// Condition name resolved neither on the policy nor in the registry.
    #[error(
        "Unable to find condition method \"{0}\". Condition must be registered on the access policy \
         or in a module listed on the \"reusable_conditions\" setting."
    )]
    ConditionNotFound(String),

    /// A configured reusable-condition module was never registered.
    #[error("Reusable condition module \"{0}\" is not registered")]
    ConditionModuleNotFound(String),

    /// Condition returned something other than a boolean.
    #[error(
        "Received invalid value \"{value}\" (type {kind}) from condition \"{condition}\". \
         Conditions must return a boolean value (true/false)."
    )]
    ConditionReturnType {
        condition: String,
        value: String,
        kind: &'static str,
    },

    /// Condition was called with the wrong number of arguments.
    #[error("Condition \"{condition}\" {message}")]
    ConditionArgument { condition: String, message: String },

    /// Error raised by the condition callable itself.
    #[error("Condition \"{condition}\" failed: {source}")]
    ConditionFailed {
        condition: String,
        #[source]
        source: BoxError,
    },

    /// Malformed condition expression.
    #[error("Invalid condition expression \"{expression}\": {message}")]
    ExpressionSyntax { expression: String, message: String },
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PolicyError {
    fn from(err: serde_yaml::Error) -> Self {
        PolicyError::ParseError(err.to_string())
    }
}

/// Name of a JSON value's type, used in error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
