use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Worker credentials in slot order (loaded from environment, never from file)
    #[serde(skip)]
    pub credentials: Vec<Credential>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound on concurrently handled stream requests
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: usize,
    #[serde(default = "default_true")]
    pub cors_allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_concurrent_streams: default_max_concurrent_streams(),
            cors_allow_any_origin: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_concurrent_streams() -> usize {
    256
}

fn default_true() -> bool {
    true
}

/// Shared identity and transport settings for the content platform
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub app_id: u64,
    /// Application secret (loaded from environment, not from config file)
    #[serde(skip)]
    pub api_hash: Option<String>,
    /// Channel the content messages live in
    #[serde(default)]
    pub container_id: String,
    /// Per-worker session cache files are written here
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            app_id: 0,
            api_hash: None,
            container_id: String::new(),
            sessions_dir: default_sessions_dir(),
            chunk_size: default_chunk_size(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_chunk_size() -> ByteSize {
    ByteSize(512 * ByteSize::KIB)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// Worker pool behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// How many `WORKER_TOKEN_<n>` slots are scanned at startup
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,
    /// Fixed lookup attempt budget; the live worker count when unset
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    pub attempt_timeout: Option<HumanDuration>,
    /// Cap applied to server-specified rate-limit waits
    #[serde(default = "default_max_cooldown")]
    pub max_cooldown: HumanDuration,
    /// Seconds advertised in `Retry-After` when no worker can serve a request
    #[serde(default = "default_retry_after_hint")]
    pub retry_after_hint: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_slots: default_worker_slots(),
            max_attempts: None,
            attempt_timeout: None,
            max_cooldown: default_max_cooldown(),
            retry_after_hint: default_retry_after_hint(),
        }
    }
}

fn default_worker_slots() -> usize {
    8
}

fn default_max_cooldown() -> HumanDuration {
    HumanDuration::from_secs(3600)
}

fn default_retry_after_hint() -> u64 {
    5
}

/// Opaque worker credential; never printed
///
/// Credentials loaded from the environment remember the slot they came
/// from, so per-worker state stays keyed to the identity and not to its
/// position among the configured workers.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    slot: Option<usize>,
    token: String,
}

impl Credential {
    /// Returns `None` for blank values so empty slots are skipped.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        (!token.is_empty()).then_some(Self { slot: None, token })
    }

    /// Credential read from `WORKER_TOKEN_<slot>`
    pub fn for_slot(slot: usize, token: impl Into<String>) -> Option<Self> {
        Self::new(token).map(|credential| Self {
            slot: Some(slot),
            ..credential
        })
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn expose(&self) -> &str {
        &self.token
    }

    /// SHA-256 of the token, hex encoded; safe to persist next to session state
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(self.token.as_bytes()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "Credential(slot {slot}, ***)"),
            None => f.write_str("Credential(***)"),
        }
    }
}
