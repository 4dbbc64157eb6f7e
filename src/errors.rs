use thiserror::Error;

use crate::coord::types::State;

/// Unified error type for the forkjoin library
#[derive(Debug, Error)]
pub enum ForkJoinError {
    /// A registration method or `join` was used outside the `Pending` state.
    #[error("{operation} requires a pending coordinator (current state: {state:?})")]
    IllegalState {
        operation: &'static str,
        state: State,
    },

    /// An operation failed synchronously while being started by `join`.
    /// Tasks registered after it were never started.
    #[error("task {index} failed to start")]
    TaskStart {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ForkJoinError>;
