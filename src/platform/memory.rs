//! In-process content platform for tests and local development

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    ByteStream, ContainerId, ContentId, FileInfo, LookupError, Media, MediaHandle, MediaKind,
    Message, PlatformConnector, PlatformError, PlatformSession,
};
use crate::config::Credential;

/// A response queued for the next lookup made with a given credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    RateLimited(u64),
    Transient(String),
}

/// One lookup as seen by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRecord {
    pub worker: usize,
    pub content: String,
}

#[derive(Default)]
struct MemoryState {
    messages: HashMap<String, Message>,
    media: HashMap<String, Bytes>,
    scripts: HashMap<String, VecDeque<Scripted>>,
    throttled: HashMap<String, u64>,
    refused: HashSet<String>,
    lookups: Vec<LookupRecord>,
    sessions: HashMap<usize, Arc<AtomicBool>>,
}

/// Scripted platform keyed by credential
///
/// Cloning shares the underlying catalog and scripts.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    state: Arc<Mutex<MemoryState>>,
    live_downloads: Arc<AtomicUsize>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an audio message with downloadable bytes under `content`
    pub fn insert_track(
        &self,
        content: &str,
        filename: Option<&str>,
        mime_type: Option<&str>,
        data: impl Into<Bytes>,
    ) {
        let Ok(content_id) = content.parse::<ContentId>() else {
            tracing::warn!(content, "Ignoring track with invalid content id");
            return;
        };
        let data = data.into();
        let handle = MediaHandle::derived_from(&content_id);
        let message = Message {
            media: Some(Media {
                handle: handle.clone(),
                kind: MediaKind::Audio,
            }),
            file: Some(FileInfo {
                name: filename.map(str::to_string),
                mime_type: mime_type.map(str::to_string),
                size: Some(data.len() as u64),
            }),
        };

        let mut state = self.state.lock();
        state.messages.insert(content.to_string(), message);
        state.media.insert(handle.to_string(), data);
    }

    /// Publish an arbitrary message (e.g. one without playable media)
    pub fn insert_message(&self, content: &str, message: Message) {
        self.state.lock().messages.insert(content.to_string(), message);
    }

    /// Make every connect attempt with `token` fail
    pub fn refuse(&self, token: &str) {
        self.state.lock().refused.insert(token.to_string());
    }

    /// Queue a one-shot response for the next lookup made with `token`
    pub fn script(&self, token: &str, response: Scripted) {
        self.state
            .lock()
            .scripts
            .entry(token.to_string())
            .or_default()
            .push_back(response);
    }

    /// Rate-limit every lookup made with `token`
    pub fn throttle(&self, token: &str, retry_after_secs: u64) {
        self.state
            .lock()
            .throttled
            .insert(token.to_string(), retry_after_secs);
    }

    /// Simulate the platform dropping the connection of `worker`
    pub fn drop_connection(&self, worker: usize) {
        if let Some(flag) = self.state.lock().sessions.get(&worker) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn lookups(&self) -> Vec<LookupRecord> {
        self.state.lock().lookups.clone()
    }

    /// Number of download streams that have been opened and not yet dropped
    pub fn live_downloads(&self) -> usize {
        self.live_downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformConnector for MemoryPlatform {
    async fn connect(
        &self,
        worker: usize,
        credential: &Credential,
    ) -> Result<Arc<dyn PlatformSession>, PlatformError> {
        let mut state = self.state.lock();
        if state.refused.contains(credential.expose()) {
            return Err(PlatformError::AuthRejected(format!(
                "credential for worker {worker} rejected"
            )));
        }

        let connected = Arc::new(AtomicBool::new(true));
        state.sessions.insert(worker, connected.clone());

        Ok(Arc::new(MemorySession {
            worker,
            token: credential.expose().to_string(),
            platform: self.clone(),
            connected,
        }))
    }
}

struct MemorySession {
    worker: usize,
    token: String,
    platform: MemoryPlatform,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl PlatformSession for MemorySession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn lookup(
        &self,
        _container: &ContainerId,
        content: &ContentId,
    ) -> Result<Message, LookupError> {
        if !self.is_connected() {
            return Err(LookupError::Disconnected);
        }

        let mut state = self.platform.state.lock();
        state.lookups.push(LookupRecord {
            worker: self.worker,
            content: content.to_string(),
        });

        if let Some(scripted) = state
            .scripts
            .get_mut(&self.token)
            .and_then(VecDeque::pop_front)
        {
            return Err(match scripted {
                Scripted::RateLimited(secs) => LookupError::RateLimited {
                    retry_after_secs: secs,
                },
                Scripted::Transient(reason) => LookupError::Transport(reason),
            });
        }

        if let Some(&secs) = state.throttled.get(&self.token) {
            return Err(LookupError::RateLimited {
                retry_after_secs: secs,
            });
        }

        state
            .messages
            .get(content.as_str())
            .cloned()
            .ok_or(LookupError::NotFound)
    }

    async fn open_download(
        &self,
        media: &MediaHandle,
        chunk_size: usize,
    ) -> Result<ByteStream, PlatformError> {
        if !self.is_connected() {
            return Err(PlatformError::Disconnected);
        }

        let data = self
            .platform
            .state
            .lock()
            .media
            .get(media.as_str())
            .cloned()
            .ok_or_else(|| PlatformError::Download(format!("unknown media {media}")))?;

        let chunk_size = chunk_size.max(1);
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
            .collect();

        let guard = DownloadGuard::acquire(self.platform.live_downloads.clone());
        let stream = stream::iter(chunks).map(move |chunk| {
            let _held = &guard;
            Ok::<_, PlatformError>(chunk)
        });

        Ok(Box::pin(stream))
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Counts an open download until the stream holding it is dropped
struct DownloadGuard(Arc<AtomicUsize>);

impl DownloadGuard {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(token: &str) -> Credential {
        Credential::new(token).unwrap()
    }

    fn container() -> ContainerId {
        "-100".parse().unwrap()
    }

    #[tokio::test]
    async fn test_scripts_run_before_catalog() {
        let platform = MemoryPlatform::new();
        platform.insert_track("7", Some("a.mp3"), Some("audio/mpeg"), vec![1u8, 2, 3]);
        platform.script("t1", Scripted::RateLimited(12));

        let session = platform.connect(0, &credential("t1")).await.unwrap();
        let content: ContentId = "7".parse().unwrap();

        assert!(matches!(
            session.lookup(&container(), &content).await,
            Err(LookupError::RateLimited { retry_after_secs: 12 })
        ));
        assert!(session.lookup(&container(), &content).await.is_ok());
        assert_eq!(platform.lookups().len(), 2);
    }

    #[tokio::test]
    async fn test_refused_credential() {
        let platform = MemoryPlatform::new();
        platform.refuse("bad");
        assert!(matches!(
            platform.connect(0, &credential("bad")).await,
            Err(PlatformError::AuthRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_download_chunks_and_guard() {
        let platform = MemoryPlatform::new();
        platform.insert_track("9", None, None, vec![0u8; 10]);
        let session = platform.connect(0, &credential("t")).await.unwrap();
        let handle: MediaHandle = "media-9".parse().unwrap();

        let stream = session.open_download(&handle, 4).await.unwrap();
        assert_eq!(platform.live_downloads(), 1);

        let sizes: Vec<usize> = stream
            .map(|chunk| chunk.unwrap().len())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(platform.live_downloads(), 0);
    }

    #[tokio::test]
    async fn test_dropped_connection() {
        let platform = MemoryPlatform::new();
        let session = platform.connect(3, &credential("t")).await.unwrap();
        assert!(session.is_connected());

        platform.drop_connection(3);
        assert!(!session.is_connected());
        assert!(matches!(
            session
                .lookup(&container(), &"1".parse().unwrap())
                .await,
            Err(LookupError::Disconnected)
        ));
    }
}
