//! Error types for the alerts-common crate.

/// Boxed error produced by a scheduled action
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the [`Scheduler`](crate::Scheduler)
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler was disposed before the call
    #[error("The Scheduler has been disposed")]
    Disposed,

    /// No tokio runtime is available to drive timers
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// A pending timer was cancelled before it fired
    #[error("Scheduled action was cancelled: {description}")]
    Cancelled {
        /// Description of the cancelled action
        description: String,
    },

    /// The backoff driver ran out of attempts
    #[error("Maximum failures reached for {description} after {attempts} attempts")]
    AttemptsExhausted {
        /// Description of the retried action
        description: String,
        /// Number of attempts that were run
        attempts: u32,
    },

    /// The scheduled action itself failed
    #[error("Scheduled action failed ({description}): {source}")]
    Action {
        /// Description of the failed action
        description: String,
        /// The action's error
        #[source]
        source: BoxError,
    },
}

impl SchedulerError {
    /// Whether the error is terminal for a backoff sequence
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Disposed | SchedulerError::NoRuntime(_) | SchedulerError::Cancelled { .. }
        )
    }
}

/// Convenience type alias for Results using SchedulerError.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_error_display() {
        assert_eq!(
            SchedulerError::Disposed.to_string(),
            "The Scheduler has been disposed"
        );

        let error = SchedulerError::AttemptsExhausted {
            description: "reconnect".to_string(),
            attempts: 4,
        };
        assert_eq!(
            error.to_string(),
            "Maximum failures reached for reconnect after 4 attempts"
        );

        let error = SchedulerError::Cancelled {
            description: "refresh, attempt 2".to_string(),
        };
        assert!(error.to_string().contains("refresh, attempt 2"));
    }

    #[test]
    fn test_action_error_keeps_source() {
        let source: BoxError = "socket closed".into();
        let error = SchedulerError::Action {
            description: "connect".to_string(),
            source,
        };

        assert!(error.to_string().contains("socket closed"));
        assert!(std::error::Error::source(&error).is_some());
        assert!(!error.is_terminal());
    }

    #[test]
    fn test_terminal_errors() {
        assert!(SchedulerError::Disposed.is_terminal());
        assert!(SchedulerError::Cancelled {
            description: String::new()
        }
        .is_terminal());
        assert!(!SchedulerError::AttemptsExhausted {
            description: String::new(),
            attempts: 1
        }
        .is_terminal());
    }
}
