use std::collections::HashMap;

use lockwatch_core::LockKey;

/// Per-key staleness state machine.
///
/// Compares successive snapshots of the shared counter map and keeps a
/// "stale streak" per key: the number of consecutive observations in which
/// the key's counter did not advance. A key whose streak reaches the
/// configured threshold is reported as a reclamation candidate.
///
/// All state is process-local and safe to lose: a restarted tracker simply
/// counts from zero again, delaying reclamation by at most one threshold
/// period.
pub struct StalenessTracker {
    threshold: u32,
    streaks: HashMap<LockKey, u32>,
    last_observed: HashMap<LockKey, String>,
}

impl StalenessTracker {
    /// Create a tracker reporting keys whose streak reaches `threshold`.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            streaks: HashMap::new(),
            last_observed: HashMap::new(),
        }
    }

    /// Feed one counter-map snapshot through the state machine.
    ///
    /// For every key in the snapshot the counter is compared against the
    /// last observed value (`"0"` for a key never seen before): a changed
    /// counter resets the streak, an unchanged one increments it. Keys at or
    /// above the threshold are returned as stale candidates. Tracked keys
    /// missing from the snapshot were removed by some process and are
    /// dropped. The snapshot then becomes the comparison base for the next
    /// observation.
    pub fn observe(&mut self, snapshot: &HashMap<String, String>) -> Vec<LockKey> {
        let mut stale = Vec::new();

        for (field, curr) in snapshot {
            let key = LockKey::from(field.as_str());
            let prev = self
                .last_observed
                .get(&key)
                .map(String::as_str)
                .unwrap_or("0");

            if counters_differ(&key, prev, curr) {
                self.streaks.insert(key, 0);
            } else {
                let streak = self.streaks.entry(key.clone()).or_insert(0);
                *streak += 1;
                if *streak >= self.threshold {
                    stale.push(key);
                }
            }
        }

        // Keys deleted externally are no longer ours to count.
        self.streaks
            .retain(|key, _| snapshot.contains_key(key.as_str()));

        self.last_observed = snapshot
            .iter()
            .map(|(field, value)| (LockKey::from(field.as_str()), value.clone()))
            .collect();

        stale
    }

    /// Forget the streak for a key, typically after reclaiming it.
    pub fn clear_streak(&mut self, key: &LockKey) {
        self.streaks.remove(key);
    }

    /// Current streak for a key, if tracked.
    pub fn streak(&self, key: &LockKey) -> Option<u32> {
        self.streaks.get(key).copied()
    }

    /// Snapshot of all current streaks.
    pub fn streaks(&self) -> HashMap<LockKey, u32> {
        self.streaks.clone()
    }

    /// Drop all tracked state.
    pub fn clear(&mut self) {
        self.streaks.clear();
        self.last_observed.clear();
    }
}

/// Numeric counter comparison. `"7"` equals `"007"`.
///
/// A value that fails to parse on either side reads as changed: a malformed
/// counter must never build a streak toward reclamation.
fn counters_differ(key: &LockKey, prev: &str, curr: &str) -> bool {
    match (prev.parse::<i64>(), curr.parse::<i64>()) {
        (Ok(prev), Ok(curr)) => prev != curr,
        _ => {
            tracing::warn!(
                key = %key,
                prev = %prev,
                curr = %curr,
                "Counter is not numeric, treating as changed"
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fresh_zero_counter_builds_streak() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        // A never-seen key compares against "0", so a seeded "0" counts
        // as unchanged from the first observation.
        let stale = tracker.observe(&snapshot(&[("lock:a", "0")]));
        assert!(stale.is_empty());
        assert_eq!(tracker.streak(&key), Some(1));

        let stale = tracker.observe(&snapshot(&[("lock:a", "0")]));
        assert_eq!(stale, vec![key.clone()]);
        assert_eq!(tracker.streak(&key), Some(2));
    }

    #[test]
    fn test_changed_counter_resets_streak() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        tracker.observe(&snapshot(&[("lock:a", "0")]));
        assert_eq!(tracker.streak(&key), Some(1));

        let stale = tracker.observe(&snapshot(&[("lock:a", "1")]));
        assert!(stale.is_empty());
        assert_eq!(tracker.streak(&key), Some(0));

        tracker.observe(&snapshot(&[("lock:a", "1")]));
        assert_eq!(tracker.streak(&key), Some(1));
    }

    #[test]
    fn test_seeded_nonzero_counter_needs_extra_cycle() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        // First sight of "5" differs from the implicit "0".
        let stale = tracker.observe(&snapshot(&[("lock:a", "5")]));
        assert!(stale.is_empty());
        assert_eq!(tracker.streak(&key), Some(0));

        assert!(tracker.observe(&snapshot(&[("lock:a", "5")])).is_empty());
        assert_eq!(
            tracker.observe(&snapshot(&[("lock:a", "5")])),
            vec![key.clone()]
        );
    }

    #[test]
    fn test_comparison_is_numeric_not_lexical() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        tracker.observe(&snapshot(&[("lock:a", "7")]));
        tracker.observe(&snapshot(&[("lock:a", "007")]));

        // "7" and "007" are the same counter value.
        assert_eq!(tracker.streak(&key), Some(1));
    }

    #[test]
    fn test_malformed_counter_never_goes_stale() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        for _ in 0..5 {
            let stale = tracker.observe(&snapshot(&[("lock:a", "not-a-number")]));
            assert!(stale.is_empty());
        }
        assert_eq!(tracker.streak(&key), Some(0));
    }

    #[test]
    fn test_vanished_key_is_dropped() {
        let mut tracker = StalenessTracker::new(3);
        let key = LockKey::from("lock:a");

        tracker.observe(&snapshot(&[("lock:a", "0")]));
        tracker.observe(&snapshot(&[("lock:a", "0")]));
        assert_eq!(tracker.streak(&key), Some(2));

        let stale = tracker.observe(&snapshot(&[]));
        assert!(stale.is_empty());
        assert_eq!(tracker.streak(&key), None);

        // Re-appearing later starts the count over.
        tracker.observe(&snapshot(&[("lock:a", "0")]));
        assert_eq!(tracker.streak(&key), Some(1));
    }

    #[test]
    fn test_streak_above_threshold_keeps_reporting() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        tracker.observe(&snapshot(&[("lock:a", "0")]));

        // A key that survives a failed reclamation must be reported again
        // on every subsequent observation.
        for expected in 2..=4 {
            let stale = tracker.observe(&snapshot(&[("lock:a", "0")]));
            assert_eq!(stale, vec![key.clone()]);
            assert_eq!(tracker.streak(&key), Some(expected));
        }
    }

    #[test]
    fn test_clear_streak_restarts_counting() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        tracker.observe(&snapshot(&[("lock:a", "0")]));
        tracker.observe(&snapshot(&[("lock:a", "0")]));
        tracker.clear_streak(&key);
        assert_eq!(tracker.streak(&key), None);

        let stale = tracker.observe(&snapshot(&[("lock:a", "0")]));
        assert!(stale.is_empty());
        assert_eq!(tracker.streak(&key), Some(1));
    }

    #[test]
    fn test_keys_tracked_independently() {
        let mut tracker = StalenessTracker::new(2);
        let dead = LockKey::from("lock:dead");
        let live = LockKey::from("lock:live");

        tracker.observe(&snapshot(&[("lock:dead", "0"), ("lock:live", "1")]));
        tracker.observe(&snapshot(&[("lock:dead", "0"), ("lock:live", "2")]));
        let stale = tracker.observe(&snapshot(&[("lock:dead", "0"), ("lock:live", "3")]));

        assert!(stale.contains(&dead));
        assert!(!stale.contains(&live));
        assert_eq!(tracker.streak(&live), Some(0));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut tracker = StalenessTracker::new(2);
        let key = LockKey::from("lock:a");

        tracker.observe(&snapshot(&[("lock:a", "9")]));
        tracker.observe(&snapshot(&[("lock:a", "9")]));
        tracker.clear();

        assert_eq!(tracker.streak(&key), None);
        // After a clear the counter compares against "0" again.
        tracker.observe(&snapshot(&[("lock:a", "9")]));
        assert_eq!(tracker.streak(&key), Some(0));
    }
}
