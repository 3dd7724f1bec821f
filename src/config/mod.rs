//! Configuration management for tunebox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use tunebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TUNEBOX__<section>__<key>`
//!
//! Examples:
//! - `TUNEBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `TUNEBOX__PLATFORM__CONTAINER_ID=-1001234567890`
//! - `TUNEBOX__POOL__MAX_ATTEMPTS=3`
//!
//! Secrets are only read from the environment: `PLATFORM_API_HASH` and the
//! worker credentials `WORKER_TOKEN_1` .. `WORKER_TOKEN_<pool.worker_slots>`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/tunebox.toml`.
//! This can be overridden using the `TUNEBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{Config, Credential, PlatformConfig, PoolConfig, ServerConfig};
pub use sources::load_secrets;
pub use validation::{MAX_CHUNK_BYTES, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails (missing identity, bad chunk size, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, with secrets from `lookup`
    ///
    /// Useful for testing without touching the process environment.
    pub fn load_from_path<F>(path: std::path::PathBuf, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config, lookup);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Run validation again, e.g. after CLI overrides
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
