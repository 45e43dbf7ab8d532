//! Error types for connection-engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("An actor cannot target itself: {0}")]
    SelfReference(String),

    #[error("A connection request is already pending or accepted between {0} and {1}")]
    AlreadyRequested(String, String),

    #[error("Connection request {0} has already been resolved")]
    AlreadyResolved(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection request {0} is no longer pending and cannot be canceled")]
    NotCancelable(String),

    #[error("Relationship between {0} and {1} is blocked")]
    Blocked(String, String),

    #[error("Administrators cannot follow their own organization {0}")]
    SelfFollow(String),

    #[error("A declined request between {0} and {1} cannot be sent again")]
    ResendNotAllowed(String, String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code surfaced to API clients
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::SelfReference(_) => "self_reference",
            EngineError::AlreadyRequested(..) => "already_requested",
            EngineError::AlreadyResolved(_) => "already_resolved",
            EngineError::NotFound(_) => "not_found",
            EngineError::NotCancelable(_) => "not_cancelable",
            EngineError::Blocked(..) => "blocked",
            EngineError::SelfFollow(_) => "self_follow",
            EngineError::ResendNotAllowed(..) => "resend_not_allowed",
            EngineError::InvalidInput(_) | EngineError::Json(_) => "invalid_input",
            EngineError::Timeout(_) => "timeout",
            EngineError::Database(_)
            | EngineError::Pool(_)
            | EngineError::Config(_)
            | EngineError::Io(_)
            | EngineError::Internal(_) => "internal",
        }
    }

    /// Transient store failures the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Database(_) | EngineError::Pool(_) | EngineError::Timeout(_)
        )
    }
}

impl From<diesel::r2d2::PoolError> for EngineError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        EngineError::Pool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_specific() {
        assert_eq!(EngineError::AlreadyRequested("a".into(), "b".into()).code(), "already_requested");
        assert_eq!(EngineError::AlreadyResolved("r".into()).code(), "already_resolved");
        assert_eq!(EngineError::Blocked("a".into(), "b".into()).code(), "blocked");
        assert_eq!(EngineError::Internal("boom".into()).code(), "internal");
    }

    #[test]
    fn test_retryable() {
        assert!(EngineError::Timeout("slow".into()).is_retryable());
        assert!(EngineError::Pool("exhausted".into()).is_retryable());
        assert!(!EngineError::Unauthorized("nope".into()).is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());
    }
}
