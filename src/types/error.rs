use thiserror::Error;

use super::OrderStatus;

/// salesboard error types
#[derive(Error, Debug)]
pub enum SalesboardError {
    /// No signed-in principal when a subscription was requested
    #[error("unauthenticated: no operator is signed in")]
    Unauthenticated,

    /// Store or network failure during an active subscription
    #[error("transport error: {0}")]
    Transport(String),

    /// A delivered record could not be used as-is
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// Failed to parse JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Record id not present in the store
    #[error("not found: {0}")]
    NotFound(String),

    /// Status change not allowed from the current status
    #[error("cannot move order {id} from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: OrderStatus,
    },
}

impl SalesboardError {
    /// Errors delivered through the snapshot channel rather than returned
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias for salesboard
pub type Result<T> = std::result::Result<T, SalesboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SalesboardError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "transport error: connection reset");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SalesboardError = io_err.into();
        assert!(err.to_string().contains("io error"));
    }

    #[test]
    fn test_malformed_record_display() {
        let err = SalesboardError::MalformedRecord {
            id: "abc".into(),
            reason: "missing createdAt".into(),
        };
        assert_eq!(err.to_string(), "malformed record abc: missing createdAt");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = SalesboardError::InvalidTransition {
            id: "o1".into(),
            from: "cancelled".into(),
            to: OrderStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "cannot move order o1 from cancelled to completed"
        );
    }

    #[test]
    fn test_is_transport() {
        assert!(SalesboardError::Transport("x".into()).is_transport());
        assert!(!SalesboardError::Unauthenticated.is_transport());
    }
}
