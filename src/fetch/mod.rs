//! Fetch orchestration: find content on some healthy worker, then relay it
//!
//! Every platform response is first classified into a [`FetchOutcome`];
//! the retry loop then only looks at the variant. Rate limits cool the
//! responsible worker down and move on, transient errors just move on,
//! and "not found" ends the call immediately since no other connection
//! can change that answer.

mod relay;

pub use relay::MediaStream;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::observability::Metrics;
use crate::platform::{ContainerId, ContentId, LookupError, MediaHandle, Message};
use crate::pool::{Pool, WorkerLease};

/// Tunables for the retry loop and the relay
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Fixed attempt budget; the pool size when `None`
    pub max_attempts: Option<usize>,
    pub attempt_timeout: Option<Duration>,
    pub max_cooldown: Duration,
    pub chunk_size: usize,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.pool.max_attempts,
            attempt_timeout: config.pool.attempt_timeout.map(|t| t.as_duration()),
            max_cooldown: config.pool.max_cooldown.as_duration(),
            chunk_size: config.platform.chunk_size.as_usize(),
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            attempt_timeout: None,
            max_cooldown: Duration::from_secs(3600),
            chunk_size: 512 * 1024,
        }
    }
}

/// Content located on a specific worker
#[derive(Debug, Clone)]
pub struct FoundContent {
    pub worker: WorkerLease,
    pub media: MediaHandle,
    pub filename: String,
    pub mime_type: mime::Mime,
    pub size: Option<u64>,
}

/// Classification of one lookup attempt, and the result of a whole fetch.
///
/// [`Fetcher::fetch_content`] never returns `RateLimited`: the loop
/// consumes it by cooling the worker down and trying another one.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(FoundContent),
    NotFound,
    RateLimited { retry_after_secs: u64 },
    TransientError,
    PoolExhausted,
}

impl FetchOutcome {
    /// Map a single lookup result onto the closed outcome set
    pub fn classify(lease: &WorkerLease, result: Result<Message, LookupError>) -> Self {
        match result {
            Ok(message) => match message.playable_media() {
                Some(media) => FetchOutcome::Found(FoundContent {
                    worker: lease.clone(),
                    media: media.handle.clone(),
                    filename: message.filename(),
                    mime_type: message.mime_type(),
                    size: message.size(),
                }),
                None => FetchOutcome::NotFound,
            },
            Err(LookupError::NotFound) => FetchOutcome::NotFound,
            Err(LookupError::RateLimited { retry_after_secs }) => {
                FetchOutcome::RateLimited { retry_after_secs }
            }
            Err(
                LookupError::Transport(_) | LookupError::Decode(_) | LookupError::Disconnected,
            ) => FetchOutcome::TransientError,
        }
    }
}

/// Why a stream request could not be served right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    PoolExhausted,
    RetriesExhausted,
    DownloadFailed,
}

impl Unavailable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unavailable::PoolExhausted => "no worker available",
            Unavailable::RetriesExhausted => "all attempts failed",
            Unavailable::DownloadFailed => "download could not be opened",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("content not found")]
    NotFound,
    #[error("temporarily unavailable: {}", .0.as_str())]
    Unavailable(Unavailable),
}

/// A ready-to-relay stream plus the attributes the caller needs for headers
pub struct ContentStream {
    pub filename: String,
    pub mime_type: mime::Mime,
    pub size: Option<u64>,
    pub worker: usize,
    pub body: MediaStream,
}

pub struct Fetcher {
    pool: Arc<Pool>,
    container: ContainerId,
    policy: FetchPolicy,
    metrics: Arc<Metrics>,
}

impl Fetcher {
    pub fn new(
        pool: Arc<Pool>,
        container: ContainerId,
        policy: FetchPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pool,
            container,
            policy,
            metrics,
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    fn attempt_budget(&self) -> usize {
        self.policy.max_attempts.unwrap_or(self.pool.len()).max(1)
    }

    /// Locate `content` on some healthy worker
    pub async fn fetch_content(&self, content: &ContentId) -> FetchOutcome {
        let span = info_span!("fetch", fetch_id = %Uuid::now_v7(), content_id = %content);
        self.fetch_inner(content).instrument(span).await
    }

    async fn fetch_inner(&self, content: &ContentId) -> FetchOutcome {
        let budget = self.attempt_budget();

        for attempt in 1..=budget {
            let lease = match self.pool.select_healthy() {
                Ok(lease) => lease,
                Err(e) => {
                    warn!(attempt, error = %e, "Pool exhausted");
                    return FetchOutcome::PoolExhausted;
                }
            };

            let result = self.lookup(&lease, content).await;
            if let Err(e) = &result {
                debug!(attempt, worker = lease.index(), error = %e, "Lookup attempt failed");
            }

            match FetchOutcome::classify(&lease, result) {
                FetchOutcome::RateLimited { retry_after_secs } => {
                    let wait = Duration::from_secs(retry_after_secs).min(self.policy.max_cooldown);
                    self.pool.trigger_cooldown(lease.index(), wait);
                    self.metrics.rate_limited();
                }
                FetchOutcome::TransientError => {
                    warn!(attempt, worker = lease.index(), "Lookup failed, trying another worker");
                    self.metrics.transient_error();
                }
                FetchOutcome::NotFound => {
                    info!(worker = lease.index(), "Content not found or not playable");
                    return FetchOutcome::NotFound;
                }
                found @ FetchOutcome::Found(_) => {
                    debug!(attempt, worker = lease.index(), "Content located");
                    return found;
                }
                FetchOutcome::PoolExhausted => return FetchOutcome::PoolExhausted,
            }
        }

        warn!(attempts = budget, "Giving up after exhausting attempt budget");
        FetchOutcome::TransientError
    }

    async fn lookup(
        &self,
        lease: &WorkerLease,
        content: &ContentId,
    ) -> Result<Message, LookupError> {
        let call = lease.lookup(&self.container, content);
        match self.policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(LookupError::Transport(format!(
                    "lookup timed out after {}ms",
                    limit.as_millis()
                )))
            }),
            None => call.await,
        }
    }

    /// Fetch `content` and open its download on the worker that found it
    pub async fn fetch_and_stream(&self, content: &ContentId) -> Result<ContentStream, StreamError> {
        let found = match self.fetch_content(content).await {
            FetchOutcome::Found(found) => found,
            FetchOutcome::NotFound => {
                self.metrics.fetch_not_found();
                return Err(StreamError::NotFound);
            }
            FetchOutcome::PoolExhausted => {
                self.metrics.fetch_unavailable();
                return Err(StreamError::Unavailable(Unavailable::PoolExhausted));
            }
            FetchOutcome::TransientError | FetchOutcome::RateLimited { .. } => {
                self.metrics.fetch_unavailable();
                return Err(StreamError::Unavailable(Unavailable::RetriesExhausted));
            }
        };

        let worker = found.worker.index();
        let bytes = match found
            .worker
            .open_download(&found.media, self.policy.chunk_size)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(worker, content_id = %content, error = %e, "Failed to open download");
                self.metrics.fetch_unavailable();
                return Err(StreamError::Unavailable(Unavailable::DownloadFailed));
            }
        };

        self.metrics.fetch_found();
        info!(worker, content_id = %content, filename = %found.filename, "Streaming content");

        Ok(ContentStream {
            body: MediaStream::new(bytes, worker, content.clone(), self.metrics.clone()),
            filename: found.filename,
            mime_type: found.mime_type,
            size: found.size,
            worker,
        })
    }
}
