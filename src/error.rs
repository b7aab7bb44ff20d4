//! Error types for breakers, the swarm adapter and configuration.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::intent::BeeKind;
use crate::provider::ProviderError;

/// Result type for circuit breaker operations.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error type for circuit breaker operations.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open, not yet eligible for a probe, and no fallback was given.
    Open {
        /// Name of the breaker that rejected the call.
        breaker: String,
    },

    /// The primary call did not settle within the configured timeout.
    Timeout {
        /// Name of the breaker that timed the call out.
        breaker: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The primary call returned an error.
    Operation(E),

    /// The primary path failed and the supplied fallback failed too.
    FallbackFailed {
        /// Why the primary path was abandoned (open circuit, timeout or operation error).
        primary: Box<BreakerError<E>>,
        /// The fallback's own error.
        fallback: E,
    },
}

impl<E> BreakerError<E> {
    /// Whether the call was rejected without reaching the remote dependency.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Whether the primary call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open { breaker } => {
                write!(f, "circuit breaker '{}' is open", breaker)
            }
            BreakerError::Timeout { breaker, after } => write!(
                f,
                "circuit breaker '{}' timed out after {}ms",
                breaker,
                after.as_millis()
            ),
            BreakerError::Operation(e) => write!(f, "operation error: {}", e),
            BreakerError::FallbackFailed { primary, fallback } => write!(
                f,
                "primary failed ({}) and fallback also failed: {}",
                primary, fallback
            ),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Open { .. } | BreakerError::Timeout { .. } => None,
            BreakerError::Operation(e) => Some(e),
            BreakerError::FallbackFailed { fallback, .. } => Some(fallback),
        }
    }
}

/// Failures inside the swarm adapter's primary paths.
///
/// None of these reach callers of the public text operations: the adapter
/// converts them into a local-fallback response.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    /// A breaker-protected remote call failed and its fallback did too.
    #[error(transparent)]
    Breaker(#[from] BreakerError<ProviderError>),

    /// The task queue did not accept a task for a specialized bee.
    #[error("task submission for the {kind} bee failed: {source}")]
    TaskSubmissionFailed {
        /// Specialization the task was meant for.
        kind: BeeKind,
        /// Why the submission failed.
        source: BreakerError<ProviderError>,
    },

    /// The worker reported a failed or cancelled task.
    #[error("task {task_id} ended without a result: {reason}")]
    TaskFailed {
        /// Queue-assigned task id.
        task_id: String,
        /// Reason reported by the queue.
        reason: String,
    },

    /// The queue dropped the subscription before a terminal status arrived.
    #[error("subscription to task {task_id} closed before completion")]
    SubscriptionClosed {
        /// Queue-assigned task id.
        task_id: String,
    },

    /// No terminal status arrived within the configured wait.
    #[error("task {task_id} did not finish within {}ms", .after.as_millis())]
    TaskWaitTimeout {
        /// Queue-assigned task id.
        task_id: String,
        /// How long the adapter waited.
        after: Duration,
    },

    /// The remote answer could not be used.
    #[error("unusable provider response: {0}")]
    EmptyResponse(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML for the expected schema.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more values are out of range.
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_failure_mentions_both_causes() {
        let err: BreakerError<ProviderError> = BreakerError::FallbackFailed {
            primary: Box::new(BreakerError::Timeout {
                breaker: "text-generation".into(),
                after: Duration::from_millis(8000),
            }),
            fallback: ProviderError::Unavailable("no local model".into()),
        };

        let text = err.to_string();
        assert!(text.contains("timed out after 8000ms"));
        assert!(text.contains("no local model"));
        assert!(err.source().is_some());
    }

    #[test]
    fn open_error_names_the_breaker() {
        let err: BreakerError<ProviderError> = BreakerError::Open {
            breaker: "image-generation".into(),
        };
        assert!(err.is_open());
        assert!(err.to_string().contains("image-generation"));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "validation failed: a, b");
    }
}
