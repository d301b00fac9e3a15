use std::sync::{Arc, Mutex};

use futures::future::join_all;
use lockwatch_core::{KeyValueGateway, LockKey, WatchdogConfig};

use crate::events::{EventSink, WatchdogEvent};
use crate::heartbeat::HeartbeatRegistry;
use crate::tracker::StalenessTracker;

/// Summary of one check cycle, for diagnostics and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Heartbeat increments attempted (one per locally registered key).
    pub heartbeats_sent: usize,
    /// Heartbeat increments that failed.
    pub heartbeat_failures: usize,
    /// Whether the staleness scan was skipped (heartbeat-only mode or a
    /// failed snapshot read).
    pub scan_skipped: bool,
    /// Keys in the counter snapshot.
    pub snapshot_size: usize,
    /// Keys declared stale this cycle.
    pub stale_candidates: usize,
    /// Stale keys fully reclaimed.
    pub reclaimed: usize,
    /// Stale keys whose reclamation failed part-way.
    pub failed_reclaims: usize,
}

/// One round of the watchdog: heartbeat, snapshot, scan, reclaim.
///
/// A cycle never fails as a whole. Store errors are logged and isolated to
/// the operation they hit: a failed increment loses one heartbeat, a failed
/// snapshot read loses one scan, a failed deletion step leaves the key to be
/// re-detected next cycle.
pub struct CheckCycle {
    gateway: Arc<dyn KeyValueGateway>,
    config: WatchdogConfig,
    registry: Arc<HeartbeatRegistry>,
    tracker: Arc<Mutex<StalenessTracker>>,
    events: Arc<EventSink>,
}

impl CheckCycle {
    /// Create a cycle over shared watchdog state.
    pub fn new(
        gateway: Arc<dyn KeyValueGateway>,
        config: WatchdogConfig,
        registry: Arc<HeartbeatRegistry>,
        tracker: Arc<Mutex<StalenessTracker>>,
        events: Arc<EventSink>,
    ) -> Self {
        Self {
            gateway,
            config,
            registry,
            tracker,
            events,
        }
    }

    /// Run one full cycle and report what happened.
    ///
    /// Phases: increment counters for locally owned keys (concurrently),
    /// read the global counter snapshot, feed it through the staleness
    /// tracker, then run a deletion job for every stale candidate
    /// (concurrently). Resolves only after every sub-operation has settled.
    pub async fn run(&self) -> CycleReport {
        let report = self.execute().await;

        if self.config.debug {
            let streaks = self.tracker.lock().unwrap().streaks();
            tracing::debug!(report = ?report, streaks = ?streaks, "Check cycle finished");
        }

        report
    }

    async fn execute(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let hash_key = self.config.redlock_hash_key.as_str();

        // Heartbeat phase: fan out one increment per locally owned key.
        let keys = self.registry.keys();
        report.heartbeats_sent = keys.len();
        let increments = keys.iter().map(|key| async move {
            let result = self
                .gateway
                .hash_increment_by(hash_key, key.as_str(), 1)
                .await;
            (key, result)
        });
        for (key, result) in join_all(increments).await {
            if let Err(e) = result {
                report.heartbeat_failures += 1;
                tracing::warn!(key = %key, error = %e, "Heartbeat increment failed");
            }
        }

        if self.config.only_heartbeat {
            report.scan_skipped = true;
            return report;
        }

        // Snapshot phase: a failed read costs this scan, nothing more.
        let snapshot = match self.gateway.hash_get_all(hash_key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read lock counters, skipping staleness scan");
                report.scan_skipped = true;
                return report;
            }
        };
        report.snapshot_size = snapshot.len();

        let stale = self.tracker.lock().unwrap().observe(&snapshot);
        report.stale_candidates = stale.len();
        if stale.is_empty() {
            return report;
        }
        tracing::info!(count = stale.len(), "Detected stale locks");

        let jobs = stale.iter().map(|key| self.reclaim(key));
        for reclaimed in join_all(jobs).await {
            if reclaimed {
                report.reclaimed += 1;
            } else {
                report.failed_reclaims += 1;
            }
        }

        report
    }

    /// Delete a stale lock and its bookkeeping entries.
    ///
    /// Order matters: resource key, then counter entry, then metadata
    /// entry. A failure at any step stops the job; the key stays above
    /// threshold and is re-attempted next cycle. The `RemoveStaled` event
    /// fires only after all three deletions succeeded.
    async fn reclaim(&self, key: &LockKey) -> bool {
        if let Err(e) = self.gateway.delete(key.as_str()).await {
            tracing::warn!(key = %key, error = %e, "Failed to delete stale lock resource");
            return false;
        }
        if let Err(e) = self
            .gateway
            .hash_delete(&self.config.redlock_hash_key, key.as_str())
            .await
        {
            tracing::warn!(key = %key, error = %e, "Failed to delete stale lock counter");
            return false;
        }
        if let Err(e) = self
            .gateway
            .hash_delete(&self.config.redlock_info_key, key.as_str())
            .await
        {
            tracing::warn!(key = %key, error = %e, "Failed to delete stale lock metadata");
            return false;
        }

        self.tracker.lock().unwrap().clear_streak(key);
        self.events.emit(WatchdogEvent::RemoveStaled, key);
        tracing::info!(key = %key, "Reclaimed stale lock");
        true
    }
}
