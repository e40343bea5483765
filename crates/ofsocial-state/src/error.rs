//! Errors raised by the feed store.

use std::fmt;

use thiserror::Error;

use crate::types::PostId;

pub type StateResult<T> = Result<T, StateError>;

/// The redb step a storage failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStep {
    Open,
    Transaction,
    Table,
    Read,
    Write,
    Encode,
    Decode,
}

impl fmt::Display for StorageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            StorageStep::Open => "open",
            StorageStep::Transaction => "transaction",
            StorageStep::Table => "table",
            StorageStep::Read => "read",
            StorageStep::Write => "write",
            StorageStep::Encode => "encode",
            StorageStep::Decode => "decode",
        };
        f.write_str(step)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("feed store {step} failed: {message}")]
    Storage { step: StorageStep, message: String },

    /// Comments can only be added to a stored post.
    #[error("post {0} does not exist")]
    PostNotFound(PostId),

    /// Persona ordinals are positions in insertion order.
    #[error("no persona at position {0}")]
    PersonaNotFound(usize),
}

impl StateError {
    /// True for a missing post or persona, as opposed to a storage failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::PostNotFound(_) | StateError::PersonaNotFound(_))
    }
}
