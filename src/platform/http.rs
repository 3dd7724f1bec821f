//! HTTP gateway client for the content platform
//!
//! Wire contract:
//! - `POST /auth/bot` `{app_id, api_hash, bot_token}` -> `{session}`
//! - `GET  /auth/me` (bearer session) -> 200 while the session is valid
//! - `GET  /containers/{container}/messages/{id}` -> [`Message`] JSON,
//!   404 when absent, 429 + `Retry-After` when throttled
//! - `GET  /media/{handle}?chunk_size=N` -> raw bytes

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    ByteStream, ContainerId, ContentId, LookupError, MediaHandle, Message, PlatformConnector,
    PlatformError, PlatformSession,
};
use crate::config::{Credential, PlatformConfig};

/// Used when a 429 carries no usable wait hint
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;
const USER_AGENT: &str = concat!("tunebox/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct AuthRequest<'a> {
    app_id: u64,
    api_hash: &'a str,
    bot_token: &'a str,
}

#[derive(Serialize, Deserialize)]
struct CachedSession {
    session: String,
    /// Fingerprint of the credential the session was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<u64>,
}

/// Connects workers to the platform gateway over HTTP
pub struct HttpConnector {
    client: Client,
    endpoint: Url,
    app_id: u64,
    api_hash: String,
    sessions_dir: PathBuf,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| PlatformError::Transport(format!("invalid endpoint: {e}")))?;

        // Lookups set a per-request timeout; downloads are only bounded by read stalls.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout.as_duration())
            .read_timeout(config.request_timeout.as_duration())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            app_id: config.app_id,
            api_hash: config.api_hash.clone().unwrap_or_default(),
            sessions_dir: config.sessions_dir.clone(),
            request_timeout: config.request_timeout.as_duration(),
        })
    }

    /// Session cache file for a credential.
    ///
    /// Keyed by the credential's slot when it has one, since worker
    /// indices shift when a slot in the middle is left empty.
    pub fn session_path(&self, worker: usize, credential: &Credential) -> PathBuf {
        match credential.slot() {
            Some(slot) => self.sessions_dir.join(format!("slot_{slot}.json")),
            None => self.sessions_dir.join(format!("worker_{worker}.json")),
        }
    }

    async fn authenticate(&self, credential: &Credential) -> Result<String, PlatformError> {
        let url = endpoint_url(&self.endpoint, &["auth", "bot"])?;
        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&AuthRequest {
                app_id: self.app_id,
                api_hash: &self.api_hash,
                bot_token: credential.expose(),
            })
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PlatformError::AuthRejected(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(PlatformError::Transport(format!(
                "auth failed with HTTP {}",
                status.as_u16()
            )));
        }

        let body: CachedSession = response
            .json()
            .await
            .map_err(|e| PlatformError::Transport(format!("invalid auth response: {e}")))?;
        Ok(body.session)
    }

    async fn session_is_valid(&self, session: &str) -> Result<bool, PlatformError> {
        let url = endpoint_url(&self.endpoint, &["auth", "me"])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(session)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            s => Err(PlatformError::Transport(format!(
                "session check failed with HTTP {}",
                s.as_u16()
            ))),
        }
    }
}

#[async_trait]
impl PlatformConnector for HttpConnector {
    async fn connect(
        &self,
        worker: usize,
        credential: &Credential,
    ) -> Result<Arc<dyn PlatformSession>, PlatformError> {
        let cache_path = self.session_path(worker, credential);
        let fingerprint = credential.fingerprint();

        let cached = match read_cached_session(&cache_path, &fingerprint).await? {
            Some(session) => {
                if self.session_is_valid(&session).await? {
                    debug!(worker, path = %cache_path.display(), "Reusing cached session");
                    Some(session)
                } else {
                    info!(worker, "Cached session rejected, re-authenticating");
                    None
                }
            }
            None => None,
        };

        let session = match cached {
            Some(session) => session,
            None => {
                let session = self.authenticate(credential).await?;
                write_cached_session(&cache_path, &session, &fingerprint).await?;
                session
            }
        };

        Ok(Arc::new(HttpSession {
            worker,
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            session,
            request_timeout: self.request_timeout,
            connected: AtomicBool::new(true),
        }))
    }
}

/// Cached session for the credential with `fingerprint`, if one is stored at `path`
async fn read_cached_session(
    path: &Path,
    fingerprint: &str,
) -> Result<Option<String>, PlatformError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice::<CachedSession>(&raw) {
        Ok(cached) if cached.session.is_empty() => {
            warn!(path = %path.display(), "Ignoring empty session cache");
            Ok(None)
        }
        Ok(cached) if cached.fingerprint.as_deref() == Some(fingerprint) => {
            Ok(Some(cached.session))
        }
        Ok(_) => {
            info!(path = %path.display(), "Session cache belongs to another credential, ignoring");
            Ok(None)
        }
        Err(_) => {
            warn!(path = %path.display(), "Ignoring unreadable session cache");
            Ok(None)
        }
    }
}

async fn write_cached_session(
    path: &Path,
    session: &str,
    fingerprint: &str,
) -> Result<(), PlatformError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let body = serde_json::to_vec(&CachedSession {
        session: session.to_string(),
        fingerprint: Some(fingerprint.to_string()),
    })
    .map_err(|e| PlatformError::SessionCache(std::io::Error::other(e)))?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Append path segments to the gateway base URL
fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, PlatformError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PlatformError::Transport(format!("endpoint {base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

struct HttpSession {
    worker: usize,
    client: Client,
    endpoint: Url,
    session: String,
    request_timeout: Duration,
    connected: AtomicBool,
}

impl HttpSession {
    async fn rate_limit_wait(response: reqwest::Response) -> u64 {
        let from_header = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(secs) = from_header {
            return secs;
        }

        response
            .json::<RateLimitBody>()
            .await
            .ok()
            .and_then(|body| body.retry_after)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
    }
}

#[async_trait]
impl PlatformSession for HttpSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn lookup(
        &self,
        container: &ContainerId,
        content: &ContentId,
    ) -> Result<Message, LookupError> {
        if !self.is_connected() {
            return Err(LookupError::Disconnected);
        }

        let url = endpoint_url(
            &self.endpoint,
            &["containers", container.as_str(), "messages", content.as_str()],
        )
        .map_err(|e| LookupError::Transport(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.session)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LookupError::Transport("request timed out".to_string())
                } else {
                    LookupError::Transport(e.to_string())
                }
            })?;

        match response.status() {
            s if s.is_success() => response
                .json::<Message>()
                .await
                .map_err(|e| LookupError::Decode(e.to_string())),
            StatusCode::NOT_FOUND => Err(LookupError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(LookupError::RateLimited {
                retry_after_secs: Self::rate_limit_wait(response).await,
            }),
            StatusCode::UNAUTHORIZED => {
                warn!(worker = self.worker, "Session revoked by platform");
                self.connected.store(false, Ordering::Release);
                Err(LookupError::Disconnected)
            }
            s => Err(LookupError::Transport(format!(
                "HTTP {}: {}",
                s.as_u16(),
                s.canonical_reason().unwrap_or("Unknown")
            ))),
        }
    }

    async fn open_download(
        &self,
        media: &MediaHandle,
        chunk_size: usize,
    ) -> Result<ByteStream, PlatformError> {
        if !self.is_connected() {
            return Err(PlatformError::Disconnected);
        }

        let url = endpoint_url(&self.endpoint, &["media", media.as_str()])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.session)
            .query(&[("chunk_size", chunk_size)])
            .send()
            .await
            .map_err(|e| PlatformError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Download(format!("HTTP {}", status.as_u16())));
        }

        debug!(worker = self.worker, %media, "Download opened");

        Ok(Box::pin(
            response
                .bytes_stream()
                .map_err(|e| PlatformError::Download(e.to_string())),
        ))
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        debug!(worker = self.worker, "Session disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_endpoint_url_handles_trailing_slash() {
        let base = Url::parse("https://gw.example.com/api/").unwrap();
        let url = endpoint_url(&base, &["containers", "-100", "messages", "5"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://gw.example.com/api/containers/-100/messages/5"
        );

        let base = Url::parse("https://gw.example.com").unwrap();
        let url = endpoint_url(&base, &["auth", "bot"]).unwrap();
        assert_eq!(url.as_str(), "https://gw.example.com/auth/bot");
    }

    #[tokio::test]
    async fn test_session_cache_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("slot_1.json");

        assert_eq!(read_cached_session(&path, "fp-a").await.unwrap(), None);

        write_cached_session(&path, "sess-abc", "fp-a").await.unwrap();
        assert_eq!(
            read_cached_session(&path, "fp-a").await.unwrap().as_deref(),
            Some("sess-abc")
        );
    }

    #[tokio::test]
    async fn test_session_cache_of_other_credential_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slot_2.json");

        write_cached_session(&path, "sess-abc", "fp-a").await.unwrap();
        assert_eq!(read_cached_session(&path, "fp-b").await.unwrap(), None);

        // Caches written without a fingerprint cannot be attributed
        tokio::fs::write(&path, br#"{"session":"sess-old"}"#)
            .await
            .unwrap();
        assert_eq!(read_cached_session(&path, "fp-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_session_cache_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slot_1.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        assert_eq!(read_cached_session(&path, "fp-a").await.unwrap(), None);
    }

    #[test]
    fn test_session_paths_follow_slot() {
        let config = PlatformConfig {
            sessions_dir: PathBuf::from("/tmp/sessions"),
            ..PlatformConfig::default()
        };
        let connector = HttpConnector::new(&config).unwrap();

        let slot_three = Credential::for_slot(3, "333:ccc").unwrap();
        // The worker index does not matter once the slot is known
        assert_eq!(
            connector.session_path(1, &slot_three),
            PathBuf::from("/tmp/sessions/slot_3.json")
        );
        assert_eq!(
            connector.session_path(2, &slot_three),
            connector.session_path(1, &slot_three)
        );

        let unslotted = Credential::new("t").unwrap();
        assert_eq!(
            connector.session_path(2, &unslotted),
            PathBuf::from("/tmp/sessions/worker_2.json")
        );
        assert_ne!(
            connector.session_path(0, &unslotted),
            connector.session_path(1, &unslotted)
        );
    }
}
