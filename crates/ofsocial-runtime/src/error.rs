//! Resource manager error types.

use thiserror::Error;

/// Errors surfaced by the resource manager.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("resource index {index} out of range ({count} resources)")]
    InvalidResource { index: usize, count: usize },

    #[error("no compute resources configured")]
    NoResources,

    #[error("generation failed on resource {index}: {source}")]
    Generation {
        index: usize,
        source: anyhow::Error,
    },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
