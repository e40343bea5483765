//! ofsocial-runtime: exclusive compute resources for text generation.
//!
//! A compute resource is one model replica pinned to one accelerator. Each
//! replica is stateful and non-reentrant, so it sits behind its own guard:
//!
//! - **One call per resource**: `acquire_and_generate` waits for the
//!   resource's guard (FIFO), then runs one generation call while holding it;
//!   `acquire` hands out a [`ResourceLease`] for several calls in a row
//! - **Full parallelism across resources**: guards are independent
//! - **Release on every exit path**: the guard is owned by the in-flight call
//!   and dropped when it returns, fails, or is abandoned
//!
//! # Architecture
//!
//! ```text
//! ResourceManager
//!   └── ComputeResource[i]  (device, Arc<Mutex<Box<dyn TextGenerator>>>)
//!         └── CompletionBackend (HTTP completion endpoint per accelerator)
//! ```

pub mod backend;
pub mod error;
pub mod manager;

pub use backend::{CompletionBackend, TextGenerator, decode_continuation};
pub use error::{RuntimeError, RuntimeResult};
pub use manager::{ComputeResource, ResourceLease, ResourceManager};
