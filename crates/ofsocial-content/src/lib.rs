//! ofsocial-content: turning raw model output into usable posts and comments.
//!
//! - [`ContentSanitizer`] strips leaked instruction fragments from raw model
//!   output using a data-driven list of regex rules and decides whether the
//!   result is acceptable. It is pure and needs no model.
//! - [`GenerationPolicy`] builds role-framed prompts and runs the bounded
//!   generate → clean → accept loop against the `ResourceManager`, degrading
//!   to fixed fallback text instead of failing.

pub mod policy;
pub mod prompt;
pub mod sanitizer;

pub use policy::{GenerationPolicy, PolicyConfig};
pub use sanitizer::{ARTIFACT_RULES, ArtifactRule, ContentSanitizer};
