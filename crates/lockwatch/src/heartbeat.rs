use std::collections::HashSet;
use std::sync::RwLock;

use lockwatch_core::LockKey;

/// Local registry of lock keys this process owns and must keep alive.
///
/// Purely in-process state: membership here drives the heartbeat phase of
/// each check cycle, nothing more. A key present in the shared counter map
/// but absent here may be owned by another process and is left alone.
pub struct HeartbeatRegistry {
    keys: RwLock<HashSet<LockKey>>,
}

impl HeartbeatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashSet::new()),
        }
    }

    /// Register local ownership of a key.
    ///
    /// Returns `false` if the key was already registered.
    pub fn insert(&self, key: LockKey) -> bool {
        self.keys.write().unwrap().insert(key)
    }

    /// Unregister local ownership of a key.
    ///
    /// Returns `false` if the key was not registered.
    pub fn remove(&self, key: &LockKey) -> bool {
        self.keys.write().unwrap().remove(key)
    }

    /// Check whether a key is registered.
    pub fn contains(&self, key: &LockKey) -> bool {
        self.keys.read().unwrap().contains(key)
    }

    /// Get a snapshot of all registered keys.
    pub fn keys(&self) -> Vec<LockKey> {
        self.keys.read().unwrap().iter().cloned().collect()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.read().unwrap().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.read().unwrap().is_empty()
    }

    /// Clear all registrations.
    pub fn clear(&self) {
        self.keys.write().unwrap().clear();
    }
}

impl Default for HeartbeatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
