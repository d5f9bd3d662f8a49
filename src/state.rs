//! Shared status state for the sidecar.
//!
//! `StatusCell` holds the most recently scraped [`Status`]. The refresher is
//! its only writer; handlers and the status logger read it concurrently.
//! Writers swap a whole `Arc<Status>`, so readers never see a partial update.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::fpm::Status;

/// A point-in-time view of the cell and its refresh bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub status: Arc<Status>,
    pub last_updated: Option<Instant>,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
    pub scrapes_ok: u64,
    pub scrapes_failed: u64,
}

/// Single-writer, many-reader holder for the latest status.
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: RwLock<Snapshot>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current status (zero value until the first successful scrape).
    pub async fn current(&self) -> Arc<Status> {
        self.inner.read().await.status.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    /// Replaces the status after a successful scrape.
    pub async fn store(&self, status: Status) {
        let mut inner = self.inner.write().await;
        inner.status = Arc::new(status);
        inner.last_updated = Some(Instant::now());
        inner.last_error = None;
        inner.consecutive_failures = 0;
        inner.scrapes_ok += 1;
    }

    /// Records a failed scrape; the stored status is left as it was.
    pub async fn record_failure(&self, error: &str) {
        let mut inner = self.inner.write().await;
        inner.last_error = Some(error.to_string());
        inner.consecutive_failures += 1;
        inner.scrapes_failed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_value_is_zero() {
        let cell = StatusCell::new();
        assert_eq!(*cell.current().await, Status::default());

        let snapshot = cell.snapshot().await;
        assert!(snapshot.last_updated.is_none());
        assert_eq!(snapshot.scrapes_ok, 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_status() {
        let cell = StatusCell::new();
        cell.store(Status {
            idle_processes: 2,
            ..Default::default()
        })
        .await;
        let before = cell.current().await;

        cell.record_failure("connection refused").await;
        cell.record_failure("connection refused").await;

        let snapshot = cell.snapshot().await;
        assert_eq!(snapshot.status, before);
        assert_eq!(snapshot.consecutive_failures, 2);
        assert_eq!(snapshot.scrapes_failed, 2);
        assert_eq!(snapshot.last_error.as_deref(), Some("connection refused"));

        cell.store(Status::default()).await;
        let snapshot = cell.snapshot().await;
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.scrapes_ok, 2);
    }

    #[tokio::test]
    async fn test_readers_keep_old_arc() {
        let cell = StatusCell::new();
        let old = cell.current().await;

        cell.store(Status {
            total_processes: 9,
            ..Default::default()
        })
        .await;

        assert_eq!(old.total_processes, 0);
        assert_eq!(cell.current().await.total_processes, 9);
    }
}
