//! Error types for the alerts-manager crate.

use alerts_common::SchedulerError;

/// Errors surfaced by [`AlertManager`](crate::AlertManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// A public operation was called with a missing or malformed argument
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        name: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// The alert or query was rejected by the validator
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The transport adapter failed
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Scheduling or retrying an action failed
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The manager has been disposed
    #[error("The AlertManager has been disposed")]
    Disposed,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AlertError {
    pub(crate) fn missing(name: &'static str) -> Self {
        AlertError::InvalidArgument {
            name,
            reason: "a non-empty value is required".to_string(),
        }
    }
}

/// Errors reported by a transport adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The adapter does not implement the operation
    #[error("Operation not supported by adapter: {0}")]
    Unsupported(&'static str),

    /// The adapter has not connected yet
    #[error("Adapter is not connected")]
    NotConnected,

    /// A transport-level failure (socket closed, request failed, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with an error
    #[error("Remote error {status}: {message}")]
    Remote {
        /// Status code reported by the service
        status: u16,
        /// Message reported by the service
        message: String,
    },

    /// A payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Shape errors raised by an [`AlertValidator`](crate::AlertValidator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("Invalid field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

/// Result type for adapter operations
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Result type for AlertManager operations
pub type Result<T> = std::result::Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_error_display() {
        let error = AlertError::missing("query.user_id");
        assert_eq!(
            error.to_string(),
            "Invalid argument query.user_id: a non-empty value is required"
        );

        assert_eq!(
            AlertError::Disposed.to_string(),
            "The AlertManager has been disposed"
        );

        let error = AlertError::Configuration("empty host".to_string());
        assert_eq!(error.to_string(), "Configuration error: empty host");
    }

    #[test]
    fn test_adapter_error_display() {
        let error = AdapterError::Unsupported("get_targets");
        assert_eq!(
            error.to_string(),
            "Operation not supported by adapter: get_targets"
        );

        let error = AdapterError::Remote {
            status: 404,
            message: "alert not found".to_string(),
        };
        assert_eq!(error.to_string(), "Remote error 404: alert not found");
    }

    #[test]
    fn test_conversions() {
        let error: AlertError = ValidationError::MissingField("alert_id").into();
        assert!(matches!(
            error,
            AlertError::Validation(ValidationError::MissingField("alert_id"))
        ));

        let error: AlertError = AdapterError::NotConnected.into();
        match error {
            AlertError::Adapter(inner) => assert_eq!(inner.to_string(), "Adapter is not connected"),
            _ => panic!("Expected Adapter variant"),
        }

        let error: AlertError = SchedulerError::Disposed.into();
        assert!(matches!(error, AlertError::Scheduler(SchedulerError::Disposed)));
    }
}
