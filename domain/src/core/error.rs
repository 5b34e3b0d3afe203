//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid objective: {0}")]
    InvalidObjective(String),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Illegal mission transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error_display() {
        let error = DomainError::Cancelled;
        assert_eq!(error.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_is_cancelled_check() {
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::UnknownStatus("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_illegal_transition_display() {
        let error = DomainError::IllegalTransition {
            from: "success".to_string(),
            to: "running".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Illegal mission transition: success -> running"
        );
    }
}
