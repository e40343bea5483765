//! ofsocial-dispatcher: parallel comment generation.
//!
//! The [`Dispatcher`] turns "a post was created" into one comment task per
//! persona, spread over the compute resources by persona ordinal, and runs
//! them on a bounded worker pool.
//!
//! ```text
//! Dispatcher
//!   ├── StateStore (persona snapshot in, comments out)
//!   ├── Lanes (per-resource queue position, fixed at submission)
//!   ├── Semaphore (R * workers_per_resource permits, FIFO)
//!   ├── JoinSet (outstanding tasks, joined or aborted on shutdown)
//!   └── GenerationPolicy
//!       └── ResourceManager (one lease per resource at a time)
//! ```

pub mod assignment;
pub mod dispatcher;
pub mod error;
mod lane;
pub mod task;

pub use dispatcher::Dispatcher;
pub use error::{DispatcherError, DispatcherResult};
pub use task::{DispatcherStats, TaskHandle, TaskState};
