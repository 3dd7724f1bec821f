//! Worker pool with health-aware round-robin selection
//!
//! The pool owns every [`Worker`] for the lifetime of the process. The
//! rotation cursor and each worker's health fields sit behind a single
//! lock; selection only does cursor arithmetic and flag checks under it,
//! and all network I/O happens on the returned [`WorkerLease`] after the
//! lock is released.
//!
//! The cursor advances by one for every candidate examined, healthy or
//! not, so a run of throttled workers cannot starve the ones behind it.

mod worker;

pub use worker::{ConnectError, ConnectionState, Worker, WorkerStatus};

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Credential;
use crate::platform::{
    ByteStream, ContainerId, ContentId, LookupError, MediaHandle, Message, PlatformConnector,
    PlatformError, PlatformSession,
};

/// No worker is eligible for selection right now
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("all {total} workers are cooling down or disconnected")]
pub struct PoolExhausted {
    pub total: usize,
}

/// A selected worker's session, usable without holding the pool lock
#[derive(Clone)]
pub struct WorkerLease {
    index: usize,
    session: Arc<dyn PlatformSession>,
}

impl WorkerLease {
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn lookup(
        &self,
        container: &ContainerId,
        content: &ContentId,
    ) -> Result<Message, LookupError> {
        self.session.lookup(container, content).await
    }

    pub async fn open_download(
        &self,
        media: &MediaHandle,
        chunk_size: usize,
    ) -> Result<ByteStream, PlatformError> {
        self.session.open_download(media, chunk_size).await
    }
}

impl fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLease")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of one worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub index: usize,
    pub status: WorkerStatus,
    pub cooldown_remaining_secs: Option<u64>,
}

struct PoolInner {
    workers: Vec<Worker>,
    next: usize,
}

pub struct Pool {
    inner: Mutex<PoolInner>,
    len: usize,
}

impl Pool {
    /// Wrap already constructed workers; configuration order is kept
    pub fn new(workers: Vec<Worker>) -> Self {
        let len = workers.len();
        Self {
            inner: Mutex::new(PoolInner { workers, next: 0 }),
            len,
        }
    }

    /// Create one worker per credential and connect them one by one.
    ///
    /// A worker that fails to connect is logged and kept in the pool as
    /// `Disconnected`; it never becomes eligible for selection.
    pub async fn start_all(connector: &dyn PlatformConnector, credentials: &[Credential]) -> Self {
        info!(workers = credentials.len(), "Connecting worker pool");

        let mut workers = Vec::with_capacity(credentials.len());
        for (index, credential) in credentials.iter().enumerate() {
            let mut worker = Worker::new(index, credential.clone());
            if let Err(e) = worker.connect(connector).await {
                warn!(worker = index, error = %e, "Worker failed to connect");
            }
            workers.push(worker);
        }

        let pool = Self::new(workers);
        let ready = pool.ready_count();
        if ready == 0 {
            warn!("No worker connected; all requests will be rejected as unavailable");
        } else {
            info!(ready, total = pool.len(), "Worker pool running");
        }
        pool
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current rotation cursor
    pub fn cursor(&self) -> usize {
        self.inner.lock().next
    }

    /// Pick the next available worker in rotation order
    pub fn select_healthy(&self) -> Result<WorkerLease, PoolExhausted> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let total = inner.workers.len();

        for _ in 0..total {
            let index = inner.next;
            inner.next = (index + 1) % total;

            let worker = &mut inner.workers[index];
            worker.detect_connection_loss();

            if worker.is_available(now) {
                if let Some(session) = worker.session() {
                    debug!(worker = index, "Selected worker");
                    return Ok(WorkerLease {
                        index,
                        session: session.clone(),
                    });
                }
            }
        }

        Err(PoolExhausted { total })
    }

    /// Put `worker` on cooldown for `duration` from now
    pub fn trigger_cooldown(&self, worker: usize, duration: Duration) {
        let now = Instant::now();
        if let Some(w) = self.inner.lock().workers.get_mut(worker) {
            w.trigger_cooldown(now, duration);
        }
    }

    pub fn ready_count(&self) -> usize {
        self.inner.lock().workers.iter().filter(|w| w.is_ready()).count()
    }

    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .workers
            .iter()
            .filter(|w| w.is_available(now))
            .count()
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let now = Instant::now();
        self.inner
            .lock()
            .workers
            .iter()
            .map(|w| WorkerSnapshot {
                index: w.index(),
                status: w.status(now),
                cooldown_remaining_secs: w
                    .cooldown_remaining(now)
                    .map(|d| d.as_secs_f64().ceil() as u64),
            })
            .collect()
    }

    /// Disconnect every worker. Sessions are closed after the lock is released.
    pub async fn shutdown(&self) {
        let sessions: Vec<(usize, Arc<dyn PlatformSession>)> = {
            let mut inner = self.inner.lock();
            inner
                .workers
                .iter_mut()
                .filter_map(|w| w.take_session().map(|s| (w.index(), s)))
                .collect()
        };

        for (index, session) in sessions {
            session.disconnect().await;
            debug!(worker = index, "Worker disconnected");
        }
        info!("Worker pool shut down");
    }
}
