use thiserror::Error;

/// Core error type for supervisor operations.
///
/// "No node available to route to" is deliberately absent: it is a normal
/// routing outcome, see [`crate::routing::RouteOutcome`].
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Shorthand for a missing node.
    pub fn node_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("node {}", id))
    }

    /// Whether the caller supplied bad input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the referenced entity no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for SupervisorError {
    fn from(e: serde_json::Error) -> Self {
        SupervisorError::Serialization(e.to_string())
    }
}

/// Result type alias using SupervisorError.
pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SupervisorError::Validation("x".into()).is_validation());
        assert!(SupervisorError::node_not_found("abc").is_not_found());
        assert!(!SupervisorError::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_not_found_message() {
        let err = SupervisorError::node_not_found("1234");
        assert_eq!(err.to_string(), "Not found: node 1234");
    }
}
