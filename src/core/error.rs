//! Error types for runtime operations.

use thiserror::Error;

/// Errors produced by runtime components.
///
/// The first three variants make up the invalid-state family: a lifecycle
/// target that does not resolve, an operation attempted against a closed
/// component, and a phase transition requested from the wrong phase. All of
/// them are raised synchronously to the caller and are never retried.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Requested lifecycle state is not part of the configured sequence.
    #[error("state `{target}` is not in the available states: {available:?}")]
    InvalidState {
        /// The name or index that failed to resolve, in display form.
        target: String,
        /// The sequence the state machine currently accepts.
        available: Vec<String>,
    },
    /// Operation attempted while the owning component is in a closed state.
    #[error("{component} is in state `{state}`: accepting new work is not allowed")]
    Closed {
        /// Component that rejected the operation (e.g. "event bus", "core").
        component: &'static str,
        /// The closed state's string form at rejection time.
        state: String,
    },
    /// A start/stop call arrived while the runtime was in the wrong phase.
    #[error("cannot {operation} while in state `{state}`")]
    InvalidTransition {
        /// The rejected operation ("start" or "stop").
        operation: &'static str,
        /// Current state's string form.
        state: String,
    },
    /// A queried registry entry is absent. Used internally by listener
    /// resolution and surfaced as an empty sequence, never across the API.
    #[error("not found: {0}")]
    NotFound(String),
    /// An event string did not match the `NAMESPACE[:NAME]` wire format.
    #[error("invalid event spec `{0}`: expected `NAMESPACE[:NAME]` with at most one colon")]
    InvalidEventSpec(String),
    /// A config key violated the uppercase key convention.
    #[error("invalid config key `{0}`: keys must be non-empty ASCII uppercase, digits, or underscores")]
    InvalidKey(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The task queue reached its configured depth bound.
    #[error("task queue is full: depth {depth} reached")]
    QueueFull {
        /// The bound that was hit.
        depth: usize,
    },
    /// The task queue has been closed; no further submissions are accepted.
    #[error("task queue is closed")]
    QueueClosed,
    /// The worker pool has been shut down.
    #[error("worker pool has been shut down")]
    PoolShutdown,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let err = RuntimeError::InvalidState {
            target: "FOOBAR".into(),
            available: vec![String::new(), "STARTING".into()],
        };
        assert_eq!(
            format!("{err}"),
            "state `FOOBAR` is not in the available states: [\"\", \"STARTING\"]"
        );
    }

    #[test]
    fn test_closed_display() {
        let err = RuntimeError::Closed {
            component: "event bus",
            state: "STOPPED".into(),
        };
        assert_eq!(
            format!("{err}"),
            "event bus is in state `STOPPED`: accepting new work is not allowed"
        );
    }

    #[test]
    fn test_queue_full_display() {
        let err = RuntimeError::QueueFull { depth: 8 };
        assert_eq!(format!("{err}"), "task queue is full: depth 8 reached");
    }
}
