//! Tracking for detached (fire-and-forget) shared tier writes.
//!
//! A detached write has no delivery guarantee if the process exits before
//! it lands. [`DetachedWrites::flush`] lets shutdown code wait for every
//! write spawned so far.
//!
//! Writes run as independent runtime tasks. Dropping the tracker, or a
//! `flush` future that has not finished, never aborts them.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use folio_core::{CacheError, CacheTier, FolioResult};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

/// Outcome of draining detached writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Writes that reached the shared tier since the last flush.
    pub completed: u64,
    /// Writes that returned an error since the last flush.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// In-flight detached writes and their outcome counters.
#[derive(Debug, Default)]
pub struct DetachedWrites {
    tracker: TaskTracker,
    counters: Arc<Counters>,
    /// Serializes flushes so one cannot reopen the tracker under another.
    flushing: tokio::sync::Mutex<()>,
}

impl DetachedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `write` on the current tokio runtime.
    ///
    /// Fails only when called outside a runtime.
    pub fn spawn<F>(&self, key: String, write: F) -> FolioResult<()>
    where
        F: Future<Output = FolioResult<()>> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|e| CacheError::TierUnavailable {
            tier: CacheTier::L2,
            reason: format!("detached write for {key} needs a tokio runtime: {e}"),
        })?;

        let counters = Arc::clone(&self.counters);
        self.tracker.spawn_on(
            async move {
                match write.await {
                    Ok(()) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(key = %key, error = %e, "Detached L2 write failed");
                    }
                }
            },
            &handle,
        );
        Ok(())
    }

    /// Number of writes still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every write spawned so far, including ones spawned while
    /// waiting, and return the counters accumulated since the last flush.
    ///
    /// Cancel-safe: abandoning the returned future leaves the writes
    /// running, and their outcomes are reported by the next flush.
    pub async fn flush(&self) -> FlushReport {
        let _guard = self.flushing.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        let report = FlushReport {
            completed: self.counters.completed.swap(0, Ordering::Relaxed),
            failed: self.counters.failed.swap(0, Ordering::Relaxed),
        };
        tracing::debug!(
            completed = report.completed,
            failed = report.failed,
            "Flushed detached L2 writes"
        );
        report
    }
}
