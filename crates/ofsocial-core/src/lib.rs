pub mod config;
pub mod types;

pub use config::{ConfigError, OfsConfig};
pub use types::*;
