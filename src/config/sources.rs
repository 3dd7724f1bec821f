use super::models::{Config, Credential};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "TUNEBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/tunebox.toml";
const ENV_PREFIX: &str = "TUNEBOX";
const ENV_SEPARATOR: &str = "__";

const API_HASH_ENV_VAR: &str = "PLATFORM_API_HASH";
const WORKER_TOKEN_PREFIX: &str = "WORKER_TOKEN_";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config, |key| env::var(key).ok());

    Ok(config)
}

/// Fill secrets from a key lookup (the process environment in production)
///
/// Worker credentials come from `WORKER_TOKEN_1..=worker_slots`, in slot
/// order. Missing or blank slots are skipped; each credential keeps its
/// slot number.
pub fn load_secrets<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(api_hash) = lookup(API_HASH_ENV_VAR).filter(|v| !v.trim().is_empty()) {
        config.platform.api_hash = Some(api_hash);
    }

    config.credentials = (1..=config.pool.worker_slots)
        .filter_map(|slot| {
            let key = format!("{WORKER_TOKEN_PREFIX}{slot}");
            let credential = lookup(&key).and_then(|token| Credential::for_slot(slot, token));
            if credential.is_none() {
                tracing::debug!(slot, "Worker credential slot empty, skipping");
            }
            credential
        })
        .collect();
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // TUNEBOX__PLATFORM__CONTAINER_ID -> platform.container_id
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
