// # Gateway error taxonomy
//
// A closed set of caller-visible error kinds. Every fallible operation in the
// gateway returns one of these; internal error types (store, engine) convert
// into `Internal` at the collaborator boundary rather than leaking their own
// shape to callers.

use thiserror::Error;

/// Caller-visible error kinds for the gateway.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Malformed request: empty SQL, unknown operator, column/type mismatch,
    /// missing base schema.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced principal, table, or rule does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The policy resolver refused access. Carries the denied securable name,
    /// never the rule that caused the denial.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Store I/O or engine compile/execute failure. Safe to retry; the
    /// gateway itself never retries.
    #[error("internal error: {0}")]
    Internal(String),

    /// The caller's context was canceled before the operation completed.
    #[error("canceled")]
    Canceled,
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GatewayError::NotFound(msg.into())
    }

    pub fn access_denied(securable: impl Into<String>) -> Self {
        GatewayError::AccessDenied(securable.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// True for error kinds that are safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Internal(_))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("plan serialization failed: {e}"))
    }
}

impl From<sqlparser::parser::ParserError> for GatewayError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        GatewayError::Validation(format!("sql compile failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
