//! Dispatcher error types.

use thiserror::Error;

/// Errors returned to callers of the dispatcher.
///
/// Failures inside individual comment tasks are not errors here: they end
/// the task in `TaskState::Failed` and are logged.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    #[error("state store error: {0}")]
    State(#[from] ofsocial_state::StateError),
}

pub type DispatcherResult<T> = Result<T, DispatcherError>;
