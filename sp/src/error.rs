//! Scheduler error types

use thiserror::Error;

/// Errors raised by schedulers, the disposing wrapper and the provider
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Teardown of scheduler {scheduler} failed: {source}")]
    Teardown {
        scheduler: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Scheduler {name} is shut down")]
    Shutdown { name: String },

    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build task pool runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl SchedulerError {
    /// Check if the error came from a scheduler refusing work after shutdown
    pub fn is_shutdown(&self) -> bool {
        matches!(self, SchedulerError::Shutdown { .. })
    }

    /// Check if retrying the same operation can succeed
    ///
    /// Only a failed teardown is retryable: the disposal state is rolled back.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::Teardown { .. })
    }

    /// Wrap an arbitrary failure raised by a teardown action
    pub fn teardown(scheduler: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SchedulerError::Teardown {
            scheduler: scheduler.into(),
            source: source.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_message() {
        let err = SchedulerError::Shutdown {
            name: "event-loop-7".to_string(),
        };
        assert!(err.to_string().contains("event-loop-7"));
        assert!(err.is_shutdown());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_teardown_is_retryable() {
        let err = SchedulerError::teardown("loop-a", "queue closed");

        let msg = err.to_string();
        assert!(msg.contains("loop-a"));
        assert!(msg.contains("queue closed"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = SchedulerError::InvalidArgument("thread name must not be empty".to_string());
        assert_eq!(err.to_string(), "Invalid argument: thread name must not be empty");
        assert!(!err.is_retryable());
    }
}
