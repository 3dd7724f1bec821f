//! A single authenticated connection and its health bookkeeping

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::Credential;
use crate::platform::{PlatformConnector, PlatformError, PlatformSession};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("worker {0} already attempted to connect")]
    AlreadyAttempted(usize),

    #[error("worker {worker} failed to connect: {source}")]
    Platform {
        worker: usize,
        #[source]
        source: PlatformError,
    },
}

/// Connection lifecycle. Cooling is not a state of its own: it is `Ready`
/// with a cooldown deadline in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

/// Externally visible worker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Ready,
    Cooling,
    Disconnected,
}

pub struct Worker {
    index: usize,
    credential: Credential,
    session: Option<Arc<dyn PlatformSession>>,
    state: ConnectionState,
    connect_attempted: bool,
    /// `None` means no cooldown was ever triggered
    cooldown_until: Option<Instant>,
}

impl Worker {
    pub fn new(index: usize, credential: Credential) -> Self {
        Self {
            index,
            credential,
            session: None,
            state: ConnectionState::Disconnected,
            connect_attempted: false,
            cooldown_until: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Establish the platform session. Only the first call does anything.
    ///
    /// On failure the worker stays `Disconnected` for good; nothing
    /// retries the connection later.
    pub async fn connect(&mut self, connector: &dyn PlatformConnector) -> Result<(), ConnectError> {
        if self.connect_attempted {
            return Err(ConnectError::AlreadyAttempted(self.index));
        }
        self.connect_attempted = true;
        self.state = ConnectionState::Connecting;

        match connector.connect(self.index, &self.credential).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Ready;
                info!(worker = self.index, "Worker connected");
                Ok(())
            }
            Err(source) => {
                self.state = ConnectionState::Disconnected;
                Err(ConnectError::Platform {
                    worker: self.index,
                    source,
                })
            }
        }
    }

    fn connection_alive(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected())
    }

    /// Ready, connection alive, and not cooling down at `now`
    pub fn is_available(&self, now: Instant) -> bool {
        self.is_ready()
            && self.connection_alive()
            && self.cooldown_until.is_none_or(|until| now >= until)
    }

    /// Exclude this worker until `now + duration`.
    ///
    /// The deadline only moves forward: a shorter cooldown never cuts an
    /// existing one short. Returns the effective deadline.
    pub fn trigger_cooldown(&mut self, now: Instant, duration: Duration) -> Instant {
        let requested = now + duration;
        let deadline = match self.cooldown_until {
            Some(current) if current >= requested => current,
            _ => requested,
        };
        self.cooldown_until = Some(deadline);

        warn!(
            worker = self.index,
            cooldown_secs = duration.as_secs(),
            "Worker rate limited, cooling down"
        );
        deadline
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn status(&self, now: Instant) -> WorkerStatus {
        if !self.is_ready() || !self.connection_alive() {
            WorkerStatus::Disconnected
        } else if self.cooldown_remaining(now).is_some() {
            WorkerStatus::Cooling
        } else {
            WorkerStatus::Ready
        }
    }

    pub(crate) fn session(&self) -> Option<&Arc<dyn PlatformSession>> {
        self.session.as_ref()
    }

    /// Move a ready worker whose session dropped to `Disconnected`.
    /// Returns true if a transition happened.
    pub(crate) fn detect_connection_loss(&mut self) -> bool {
        if self.is_ready() && !self.connection_alive() {
            self.state = ConnectionState::Disconnected;
            warn!(worker = self.index, "Worker connection lost");
            return true;
        }
        false
    }

    /// Transition to `Disconnected`, handing back the session so the
    /// caller can close it outside any lock.
    pub(crate) fn take_session(&mut self) -> Option<Arc<dyn PlatformSession>> {
        self.state = ConnectionState::Disconnected;
        self.session.take()
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("cooldown_until", &self.cooldown_until)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;

    fn worker(index: usize, token: &str) -> Worker {
        Worker::new(index, Credential::new(token).unwrap())
    }

    #[tokio::test]
    async fn test_connect_success() {
        let platform = MemoryPlatform::new();
        let mut w = worker(0, "t0");
        assert_eq!(w.state(), ConnectionState::Disconnected);
        assert!(!w.is_available(Instant::now()));

        w.connect(&platform).await.unwrap();
        assert_eq!(w.state(), ConnectionState::Ready);
        assert!(w.is_available(Instant::now()));
    }

    #[tokio::test]
    async fn test_connect_failure_excludes_worker() {
        let platform = MemoryPlatform::new();
        platform.refuse("bad");
        let mut w = worker(1, "bad");

        assert!(matches!(
            w.connect(&platform).await,
            Err(ConnectError::Platform { worker: 1, .. })
        ));
        assert_eq!(w.state(), ConnectionState::Disconnected);
        assert!(!w.is_available(Instant::now()));
        assert_eq!(w.status(Instant::now()), WorkerStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_only_once() {
        let platform = MemoryPlatform::new();
        let mut w = worker(0, "t0");
        w.connect(&platform).await.unwrap();
        assert!(matches!(
            w.connect(&platform).await,
            Err(ConnectError::AlreadyAttempted(0))
        ));
        assert!(w.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires_with_time() {
        let platform = MemoryPlatform::new();
        let mut w = worker(0, "t0");
        w.connect(&platform).await.unwrap();

        w.trigger_cooldown(Instant::now(), Duration::from_secs(30));
        assert!(!w.is_available(Instant::now()));
        assert_eq!(w.status(Instant::now()), WorkerStatus::Cooling);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!w.is_available(Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(w.is_available(Instant::now()));
        assert_eq!(w.cooldown_remaining(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_never_shortens() {
        let mut w = worker(0, "t0");
        let now = Instant::now();

        let long = w.trigger_cooldown(now, Duration::from_secs(60));
        let after_short = w.trigger_cooldown(now, Duration::from_secs(5));
        assert_eq!(after_short, long);
        assert_eq!(w.cooldown_until(), Some(now + Duration::from_secs(60)));

        let extended = w.trigger_cooldown(now, Duration::from_secs(90));
        assert_eq!(extended, now + Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_connection_loss_transition() {
        let platform = MemoryPlatform::new();
        let mut w = worker(4, "t4");
        w.connect(&platform).await.unwrap();

        assert!(!w.detect_connection_loss());
        platform.drop_connection(4);
        assert!(!w.is_available(Instant::now()));
        assert!(w.detect_connection_loss());
        assert_eq!(w.state(), ConnectionState::Disconnected);
        assert!(!w.detect_connection_loss());
    }
}
