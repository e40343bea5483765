//! ofsocial.toml configuration parser.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one model resource must be configured")]
    NoResources,

    #[error("resource {index} has an empty endpoint")]
    EmptyEndpoint { index: usize },

    #[error("workers_per_resource must be at least 1")]
    NoWorkers,

    #[error("admin password digest must be 64 hex characters")]
    BadPasswordDigest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OfsConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub dispatcher: DispatcherConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            data_dir: PathBuf::from("."),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// One entry per compute resource (model replica).
    pub resources: Vec<ResourceConfig>,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            resources: vec![
                ResourceConfig {
                    device: "cuda:0".to_string(),
                    endpoint: "http://127.0.0.1:8080".to_string(),
                },
                ResourceConfig {
                    device: "cuda:1".to_string(),
                    endpoint: "http://127.0.0.1:8081".to_string(),
                },
            ],
            request_timeout_secs: 120,
        }
    }
}

/// A model replica pinned to one accelerator, reachable at `endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub device: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub workers_per_resource: usize,
    /// AI posts generated per search query.
    pub search_posts: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers_per_resource: 1,
            search_posts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,
    /// Hex SHA-256 digest of the admin password.
    pub password_sha256: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password_sha256: password_digest("admin"),
        }
    }
}

impl AdminConfig {
    /// Check a username/password pair against the configured credentials.
    ///
    /// Both comparisons take the same time wherever the inputs first differ.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Ok(expected) = hex::decode(self.password_sha256.trim()) else {
            return false;
        };
        let supplied = Sha256::digest(password.as_bytes());
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let password_ok = constant_time_eq(supplied.as_slice(), &expected);
        user_ok & password_ok
    }
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Hex-encoded SHA-256 digest of a password.
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl OfsConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OfsConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.resources.is_empty() {
            return Err(ConfigError::NoResources);
        }
        if let Some(index) = self
            .model
            .resources
            .iter()
            .position(|r| r.endpoint.trim().is_empty())
        {
            return Err(ConfigError::EmptyEndpoint { index });
        }
        if self.dispatcher.workers_per_resource == 0 {
            return Err(ConfigError::NoWorkers);
        }
        let digest = &self.admin.password_sha256;
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::BadPasswordDigest);
        }
        Ok(())
    }

    /// Path of the redb database file inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join("ofsocial.redb")
    }
}
