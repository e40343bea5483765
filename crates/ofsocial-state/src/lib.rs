//! ofsocial-state: embedded store for posts, comments, and personas.
//!
//! Backed by [redb](https://docs.rs/redb). Records are JSON-serialized into
//! `&[u8]` value columns. Posts and personas are keyed by autoincrement ids
//! drawn from a counters table inside the inserting write transaction.
//! Comments use a composite `{post_id}:{comment_id}` key (both zero-padded)
//! so the comments of one post form a contiguous, ordered range.
//!
//! redb admits one write transaction at a time, which serializes all writers.
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult, StorageStep};
pub use store::StateStore;
pub use types::*;
