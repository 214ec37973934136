//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
///
/// None of these escape [`crate::PolicyEngine::authorize`]; they surface from
/// construction-time operations (claims extraction, registry building, config
/// loading) and are folded into denials on the decision path.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Token claims could not be mapped to an identity
    #[error("Malformed claims: {0}")]
    MalformedClaims(String),

    /// Directory or audit sink unreachable
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Unexpected fault while evaluating a rule
    #[error("Rule evaluation failed: {0}")]
    EvaluationError(String),

    /// Invalid rule definition
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Rule not registered
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Failure reported by a [`crate::roles::DirectoryLookup`] implementation
///
/// Yields an empty role set, like a missing record, but the role deriver
/// marks its provenance as unavailable.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Directory answered with a non-success status
    #[error("directory returned status {0}")]
    Status(u16),

    /// Directory could not be reached
    #[error("directory unreachable: {0}")]
    Unreachable(String),

    /// Directory did not answer before the deadline
    #[error("directory lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure reported by a [`crate::audit::AuditSink`]
#[derive(Debug, Error)]
pub enum AuditError {
    /// Sink rejected or failed to store the record
    #[error("audit sink failed: {0}")]
    Sink(String),

    /// Sink did not acknowledge in time
    #[error("audit sink timed out")]
    Timeout,
}

impl From<LookupError> for AuthzError {
    fn from(err: LookupError) -> Self {
        AuthzError::DependencyUnavailable(err.to_string())
    }
}

impl From<AuditError> for AuthzError {
    fn from(err: AuditError) -> Self {
        AuthzError::DependencyUnavailable(err.to_string())
    }
}
