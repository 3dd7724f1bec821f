//! Content platform collaborator contract
//!
//! The pool never talks to the network directly. It goes through a
//! [`PlatformConnector`], which turns one worker credential into one
//! authenticated [`PlatformSession`]. Sessions look up messages in a
//! container and open lazy byte streams for the media they carry.
//!
//! Two implementations ship with the crate:
//! - [`HttpConnector`] - talks to an HTTP gateway in front of the platform
//! - [`MemoryPlatform`] - scripted in-process platform for tests and local runs

mod http;
mod memory;
mod types;

pub use http::HttpConnector;
pub use memory::{LookupRecord, MemoryPlatform, Scripted};
pub use types::{
    ContainerId, ContentId, DEFAULT_FILENAME, DEFAULT_MIME_TYPE, FileInfo, InvalidId, Media,
    MediaHandle, MediaKind, Message,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Credential;

/// Lazy, forward-only sequence of download chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, PlatformError>> + Send>>;

/// Connection-level failures (connect, download)
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session cache error: {0}")]
    SessionCache(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Download(String),

    #[error("session is disconnected")]
    Disconnected,
}

/// Outcome of a message lookup that did not produce a message
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("content not found")]
    NotFound,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed platform response: {0}")]
    Decode(String),

    #[error("session is disconnected")]
    Disconnected,
}

/// Creates authenticated sessions, one per worker
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    /// Establish a session for `worker` using its credential
    ///
    /// Any local session state must be scoped to `worker` so that
    /// concurrently connected workers never share it.
    async fn connect(
        &self,
        worker: usize,
        credential: &Credential,
    ) -> Result<Arc<dyn PlatformSession>, PlatformError>;
}

/// One authenticated connection to the platform
#[async_trait]
pub trait PlatformSession: Send + Sync {
    /// Cheap liveness check; must not block
    fn is_connected(&self) -> bool;

    async fn lookup(
        &self,
        container: &ContainerId,
        content: &ContentId,
    ) -> Result<Message, LookupError>;

    async fn open_download(
        &self,
        media: &MediaHandle,
        chunk_size: usize,
    ) -> Result<ByteStream, PlatformError>;

    async fn disconnect(&self);
}
