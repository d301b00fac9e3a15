use std::sync::{Arc, Mutex};

use lockwatch_core::{KeyValueGateway, LockKey, LockMetadata, Result, WatchdogConfig};

use crate::cycle::CheckCycle;
use crate::events::{EventSink, WatchdogEvent};
use crate::heartbeat::HeartbeatRegistry;
use crate::scheduler::SchedulerLoop;
use crate::tracker::StalenessTracker;

/// Caller-owned watchdog handle.
///
/// Owns the store gateway, configuration, heartbeat registry, staleness
/// tracker, event sink, and scheduler. Several handles may coexist, each
/// with its own state, sharing or not sharing a gateway.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use lockwatch::{Watchdog, WatchdogEvent};
/// use lockwatch_core::WatchdogConfig;
///
/// let watchdog = Watchdog::new(gateway, WatchdogConfig::default())?;
/// watchdog.listen(WatchdogEvent::RemoveStaled, |key| {
///     println!("reclaimed zombie lock {}", key);
/// });
/// watchdog.add_heartbeat("lock:report").await?;
/// watchdog.start();
/// // ... hold the lock, heartbeats flow automatically ...
/// watchdog.stop().await;
/// ```
pub struct Watchdog {
    config: WatchdogConfig,
    gateway: Arc<dyn KeyValueGateway>,
    registry: Arc<HeartbeatRegistry>,
    tracker: Arc<Mutex<StalenessTracker>>,
    events: Arc<EventSink>,
    cycle: Arc<CheckCycle>,
    scheduler: SchedulerLoop,
}

impl Watchdog {
    /// Create a watchdog over a store gateway.
    ///
    /// Fails with [`WatchdogError::Config`] when the configuration is
    /// invalid, leaving nothing initialized.
    ///
    /// [`WatchdogError::Config`]: lockwatch_core::WatchdogError::Config
    pub fn new(gateway: Arc<dyn KeyValueGateway>, config: WatchdogConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(HeartbeatRegistry::new());
        let tracker = Arc::new(Mutex::new(StalenessTracker::new(config.max_stale_retries)));
        let events = Arc::new(EventSink::new());
        let cycle = Arc::new(CheckCycle::new(
            Arc::clone(&gateway),
            config.clone(),
            Arc::clone(&registry),
            Arc::clone(&tracker),
            Arc::clone(&events),
        ));

        Ok(Self {
            config,
            gateway,
            registry,
            tracker,
            events,
            cycle,
            scheduler: SchedulerLoop::new(),
        })
    }

    /// Register local ownership of a lock and reset its shared counter.
    pub async fn add_heartbeat(&self, key: impl Into<LockKey>) -> Result<()> {
        self.register_heartbeat(key.into(), None).await
    }

    /// Like [`add_heartbeat`], additionally writing the lock's metadata to
    /// the companion info hash.
    ///
    /// The metadata write is best-effort: a failure is logged and never
    /// fails the registration.
    ///
    /// [`add_heartbeat`]: Watchdog::add_heartbeat
    pub async fn add_heartbeat_with_metadata(
        &self,
        key: impl Into<LockKey>,
        metadata: &LockMetadata,
    ) -> Result<()> {
        self.register_heartbeat(key.into(), Some(metadata)).await
    }

    async fn register_heartbeat(
        &self,
        key: LockKey,
        metadata: Option<&LockMetadata>,
    ) -> Result<()> {
        // Local ownership sticks even if the store write below fails: the
        // next cycle's increment recreates the counter on its own.
        self.registry.insert(key.clone());

        self.gateway
            .hash_set(&self.config.redlock_hash_key, key.as_str(), "0")
            .await?;

        if let Some(metadata) = metadata {
            match metadata.to_json() {
                Ok(payload) => {
                    if let Err(e) = self
                        .gateway
                        .hash_set(&self.config.redlock_info_key, key.as_str(), &payload)
                        .await
                    {
                        tracing::warn!(key = %key, error = %e, "Failed to write lock metadata");
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to encode lock metadata");
                }
            }
        }

        tracing::debug!(key = %key, "Registered heartbeat");
        Ok(())
    }

    /// Unregister local ownership of a lock and delete its shared entries.
    ///
    /// The metadata deletion is best-effort; a failure is logged and never
    /// propagated.
    pub async fn remove_heartbeat(&self, key: impl Into<LockKey>) -> Result<()> {
        let key = key.into();
        self.registry.remove(&key);

        self.gateway
            .hash_delete(&self.config.redlock_hash_key, key.as_str())
            .await?;

        if let Err(e) = self
            .gateway
            .hash_delete(&self.config.redlock_info_key, key.as_str())
            .await
        {
            tracing::warn!(key = %key, error = %e, "Failed to delete lock metadata");
        }

        tracing::debug!(key = %key, "Unregistered heartbeat");
        Ok(())
    }

    /// Register a handler for a watchdog event, replacing any previous one.
    pub fn listen<F>(&self, event: WatchdogEvent, handler: F)
    where
        F: Fn(&LockKey) + Send + Sync + 'static,
    {
        self.events.listen(event, handler);
    }

    /// Start the periodic check loop.
    ///
    /// The first cycle runs immediately. Returns `false` if already
    /// running.
    pub fn start(&self) -> bool {
        let cycle = Arc::clone(&self.cycle);
        let started = self.scheduler.start(self.config.delay(), move || {
            let cycle = Arc::clone(&cycle);
            async move {
                cycle.run().await;
            }
        });

        if started {
            tracing::info!(
                delay_ms = self.config.delay_ms,
                max_stale_retries = self.config.max_stale_retries,
                only_heartbeat = self.config.only_heartbeat,
                "Watchdog started"
            );
        }
        started
    }

    /// Stop the check loop, waiting for any in-flight cycle to finish.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        tracing::info!("Watchdog stopped");
    }

    /// Stop the loop and reset all local state back to defaults.
    ///
    /// Clears the heartbeat registry, the staleness tracker, and any event
    /// handlers; the handle stays usable afterwards. Chaining `stop` and
    /// `release` never fails, even with a cycle in flight.
    pub async fn release(&self) {
        self.scheduler.stop().await;
        self.registry.clear();
        self.tracker.lock().unwrap().clear();
        self.events.clear();
        tracing::info!("Watchdog released");
    }

    /// Whether the check loop is currently running.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Number of locally registered heartbeats.
    pub fn heartbeat_count(&self) -> usize {
        self.registry.len()
    }

    /// The configuration this handle was built with.
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lockwatch_core::testing::{MemoryGateway, OpKind};
    use lockwatch_core::WatchdogError;

    use super::*;

    fn fast_config() -> WatchdogConfig {
        WatchdogConfig {
            delay_ms: 100,
            max_stale_retries: 2,
            ..Default::default()
        }
    }

    fn watchdog_over(gateway: &Arc<MemoryGateway>, config: WatchdogConfig) -> Watchdog {
        Watchdog::new(Arc::clone(gateway) as Arc<dyn KeyValueGateway>, config).unwrap()
    }

    fn capture_reclaimed(watchdog: &Watchdog) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        watchdog.listen(WatchdogEvent::RemoveStaled, move |key| {
            captured.lock().unwrap().push(key.to_string());
        });
        seen
    }

    #[test]
    fn test_threshold_below_two_fails_construction() {
        let gateway = Arc::new(MemoryGateway::new()) as Arc<dyn KeyValueGateway>;
        let config = WatchdogConfig {
            max_stale_retries: 1,
            ..Default::default()
        };

        let result = Watchdog::new(gateway, config);
        assert!(matches!(result, Err(WatchdogError::Config(_))));
    }

    #[tokio::test]
    async fn test_zombie_lock_reclaimed_while_running() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        let seen = capture_reclaimed(&watchdog);

        gateway.seed_key("lock:a", "owner-token");
        gateway.seed_hash_field("redlock_list", "lock:a", "0");
        gateway.seed_hash_field("redlock_info", "lock:a", r#"{"host":"dead","pid":9}"#);

        assert!(watchdog.start());
        // Cycles at ~0ms and ~100ms push the streak to the threshold.
        tokio::time::sleep(Duration::from_millis(450)).await;
        watchdog.stop().await;

        assert!(gateway.key("lock:a").is_none());
        assert!(gateway.hash_field("redlock_list", "lock:a").is_none());
        assert!(gateway.hash_field("redlock_info", "lock:a").is_none());
        assert_eq!(*seen.lock().unwrap(), vec!["lock:a"]);
    }

    #[tokio::test]
    async fn test_heartbeated_lock_survives() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        let seen = capture_reclaimed(&watchdog);

        gateway.seed_key("lock:a", "owner-token");
        watchdog.add_heartbeat("lock:a").await.unwrap();

        assert!(watchdog.start());
        tokio::time::sleep(Duration::from_millis(550)).await;
        watchdog.stop().await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(gateway.key("lock:a").is_some());
        let counter: i64 = gateway
            .hash_field("redlock_list", "lock:a")
            .unwrap()
            .parse()
            .unwrap();
        assert!(counter >= 4, "counter only reached {}", counter);
    }

    #[tokio::test]
    async fn test_stop_then_release_never_fails() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());

        assert!(watchdog.start());
        watchdog.stop().await;
        watchdog.release().await;

        assert!(!watchdog.is_running());
    }

    #[tokio::test]
    async fn test_release_resets_state_and_handle_is_reusable() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());

        watchdog.add_heartbeat("lock:a").await.unwrap();
        capture_reclaimed(&watchdog);
        assert_eq!(watchdog.heartbeat_count(), 1);

        watchdog.release().await;

        assert_eq!(watchdog.heartbeat_count(), 0);
        assert!(!watchdog.events.has_handler(WatchdogEvent::RemoveStaled));

        watchdog.add_heartbeat("lock:b").await.unwrap();
        assert!(watchdog.start());
        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_returns_false() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());

        assert!(watchdog.start());
        assert!(!watchdog.start());
        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_add_heartbeat_resets_existing_counter() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        gateway.seed_hash_field("redlock_list", "lock:a", "7");

        watchdog.add_heartbeat("lock:a").await.unwrap();

        assert_eq!(
            gateway.hash_field("redlock_list", "lock:a").as_deref(),
            Some("0")
        );
        assert_eq!(watchdog.heartbeat_count(), 1);
    }

    #[tokio::test]
    async fn test_add_heartbeat_with_metadata_writes_info() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        let metadata = LockMetadata::for_current_process();

        watchdog
            .add_heartbeat_with_metadata("lock:a", &metadata)
            .await
            .unwrap();

        let stored = gateway.hash_field("redlock_info", "lock:a").unwrap();
        let parsed = LockMetadata::from_json(&stored).unwrap();
        assert_eq!(parsed.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_metadata_write_failure_does_not_fail_registration() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        gateway.fail_next_on(OpKind::HashSet, "redlock_info");

        let metadata = LockMetadata::for_current_process();
        watchdog
            .add_heartbeat_with_metadata("lock:a", &metadata)
            .await
            .unwrap();

        assert_eq!(watchdog.heartbeat_count(), 1);
        assert_eq!(
            gateway.hash_field("redlock_list", "lock:a").as_deref(),
            Some("0")
        );
        assert!(gateway.hash_field("redlock_info", "lock:a").is_none());
    }

    #[tokio::test]
    async fn test_counter_reset_failure_propagates_but_registers_locally() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        gateway.fail_next_on(OpKind::HashSet, "redlock_list");

        let result = watchdog.add_heartbeat("lock:a").await;

        assert!(result.is_err());
        // The local registration sticks; the next cycle recreates the
        // counter through its increment.
        assert_eq!(watchdog.heartbeat_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_heartbeat_deletes_entries() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        let metadata = LockMetadata::for_current_process();
        watchdog
            .add_heartbeat_with_metadata("lock:a", &metadata)
            .await
            .unwrap();

        watchdog.remove_heartbeat("lock:a").await.unwrap();

        assert_eq!(watchdog.heartbeat_count(), 0);
        assert!(gateway.hash_field("redlock_list", "lock:a").is_none());
        assert!(gateway.hash_field("redlock_info", "lock:a").is_none());

        // Removing again is a no-op, not an error.
        watchdog.remove_heartbeat("lock:a").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_heartbeat_metadata_failure_not_propagated() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        let metadata = LockMetadata::for_current_process();
        watchdog
            .add_heartbeat_with_metadata("lock:a", &metadata)
            .await
            .unwrap();

        gateway.fail_next_on(OpKind::HashDelete, "redlock_info");
        watchdog.remove_heartbeat("lock:a").await.unwrap();

        assert!(gateway.hash_field("redlock_list", "lock:a").is_none());
        assert!(gateway.hash_field("redlock_info", "lock:a").is_some());
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_the_loop() {
        let gateway = Arc::new(MemoryGateway::new());
        let watchdog = watchdog_over(&gateway, fast_config());
        watchdog.listen(WatchdogEvent::RemoveStaled, |_| {
            panic!("listener blew up");
        });

        gateway.seed_key("lock:a", "owner-token");
        gateway.seed_hash_field("redlock_list", "lock:a", "0");

        assert!(watchdog.start());
        tokio::time::sleep(Duration::from_millis(450)).await;

        // The deletions had already been applied when the handler panicked,
        // and the loop itself survived it.
        assert!(watchdog.is_running());
        assert!(gateway.key("lock:a").is_none());
        assert!(gateway.hash_field("redlock_list", "lock:a").is_none());

        watchdog.stop().await;
        assert!(!watchdog.is_running());
    }

    #[tokio::test]
    async fn test_multiple_handles_coexist() {
        let gateway = Arc::new(MemoryGateway::new());
        let first = watchdog_over(&gateway, fast_config());
        let second = watchdog_over(&gateway, fast_config());

        assert!(first.start());
        assert!(second.start());
        assert!(first.is_running());
        assert!(second.is_running());

        first.stop().await;
        second.stop().await;
    }
}
