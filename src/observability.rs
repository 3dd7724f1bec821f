//! Logging setup and in-process counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "tunebox=info,tower_http=info";

/// Install the global `fmt` subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Ignore a second installation (tests, embedding)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters for fetch outcomes and stream lifecycles
#[derive(Debug, Default)]
pub struct Metrics {
    fetch_found: AtomicU64,
    fetch_not_found: AtomicU64,
    fetch_unavailable: AtomicU64,
    rate_limits: AtomicU64,
    transient_errors: AtomicU64,
    streams_completed: AtomicU64,
    streams_abandoned: AtomicU64,
    bytes_relayed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_found(&self) {
        self.fetch_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_not_found(&self) {
        self.fetch_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_unavailable(&self) {
        self.fetch_unavailable.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "fetch_unavailable", "Metric incremented");
    }

    pub fn rate_limited(&self) {
        self.rate_limits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "rate_limits", "Metric incremented");
    }

    pub fn transient_error(&self) {
        self.transient_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_finished(&self, completed: bool, bytes: u64) {
        if completed {
            self.streams_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.streams_abandoned.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_relayed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_found: self.fetch_found.load(Ordering::Relaxed),
            fetch_not_found: self.fetch_not_found.load(Ordering::Relaxed),
            fetch_unavailable: self.fetch_unavailable.load(Ordering::Relaxed),
            rate_limits: self.rate_limits.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_abandoned: self.streams_abandoned.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub fetch_found: u64,
    pub fetch_not_found: u64,
    pub fetch_unavailable: u64,
    pub rate_limits: u64,
    pub transient_errors: u64,
    pub streams_completed: u64,
    pub streams_abandoned: u64,
    pub bytes_relayed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.fetch_found();
        metrics.rate_limited();
        metrics.rate_limited();
        metrics.stream_finished(true, 100);
        metrics.stream_finished(false, 20);

        let snap = metrics.snapshot();
        assert_eq!(snap.fetch_found, 1);
        assert_eq!(snap.rate_limits, 2);
        assert_eq!(snap.streams_completed, 1);
        assert_eq!(snap.streams_abandoned, 1);
        assert_eq!(snap.bytes_relayed, 120);
    }
}
