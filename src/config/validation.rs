use super::models::Config;
use crate::humanize::ByteSize;
use crate::platform::{ContainerId, InvalidId};
use thiserror::Error;

/// Largest chunk the platform will hand out per download request
pub const MAX_CHUNK_BYTES: u64 = ByteSize::MIB;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid platform endpoint '{endpoint}', expected 'http://' or 'https://'")]
    InvalidEndpointScheme { endpoint: String },

    #[error("platform.app_id must be set to a non-zero application id")]
    MissingAppId,

    #[error("Platform application secret missing (set PLATFORM_API_HASH)")]
    MissingApiHash,

    #[error("platform.container_id must not be empty")]
    MissingContainerId,

    #[error("platform.container_id is invalid: {0}")]
    InvalidContainerId(#[from] InvalidId),

    #[error("platform.chunk_size ({actual}) must be between 1 byte and {limit}")]
    InvalidChunkSize { actual: ByteSize, limit: ByteSize },

    #[error("pool.max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("pool.worker_slots must be at least 1")]
    InvalidWorkerSlots,

    #[error("server.max_concurrent_streams must be at least 1")]
    InvalidConcurrencyLimit,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_platform(config)?;
    validate_pool(config)?;

    if config.server.max_concurrent_streams == 0 {
        return Err(ValidationError::InvalidConcurrencyLimit);
    }

    if config.credentials.is_empty() {
        tracing::warn!(
            slots = config.pool.worker_slots,
            "No worker credentials configured; every stream request will be unavailable"
        );
    }

    Ok(())
}

fn validate_platform(config: &Config) -> Result<(), ValidationError> {
    let platform = &config.platform;

    if !(platform.endpoint.starts_with("http://") || platform.endpoint.starts_with("https://")) {
        return Err(ValidationError::InvalidEndpointScheme {
            endpoint: platform.endpoint.clone(),
        });
    }

    if platform.app_id == 0 {
        return Err(ValidationError::MissingAppId);
    }

    if platform.api_hash.as_deref().is_none_or(str::is_empty) {
        return Err(ValidationError::MissingApiHash);
    }

    if platform.container_id.trim().is_empty() {
        return Err(ValidationError::MissingContainerId);
    }
    platform.container_id.parse::<ContainerId>()?;

    let chunk = platform.chunk_size.as_u64();
    if chunk == 0 || chunk > MAX_CHUNK_BYTES {
        return Err(ValidationError::InvalidChunkSize {
            actual: platform.chunk_size,
            limit: ByteSize(MAX_CHUNK_BYTES),
        });
    }

    Ok(())
}

fn validate_pool(config: &Config) -> Result<(), ValidationError> {
    if config.pool.worker_slots == 0 {
        return Err(ValidationError::InvalidWorkerSlots);
    }

    if config.pool.max_attempts == Some(0) {
        return Err(ValidationError::InvalidMaxAttempts);
    }

    Ok(())
}
