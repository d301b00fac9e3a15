//! In-memory key-value gateway for testing.
//!
//! Provides a [`KeyValueGateway`] implementation backed by plain hash maps
//! that records applied operations and supports one-shot failure injection.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use crate::error::{Result, WatchdogError};
use crate::gateway::KeyValueGateway;

/// Kind of store operation, for recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// `hash_set`
    HashSet,
    /// `hash_increment_by`
    HashIncrementBy,
    /// `hash_get_all`
    HashGetAll,
    /// `hash_delete`
    HashDelete,
    /// `delete`
    Delete,
}

/// Record of a successfully applied store operation.
#[derive(Debug, Clone)]
pub struct RecordedOp {
    /// Operation kind.
    pub kind: OpKind,
    /// The hash name, or the key for top-level operations.
    pub target: String,
    /// The field inside the hash, where the operation has one.
    pub field: Option<String>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    kind: OpKind,
    field: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    keys: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    ops: Vec<RecordedOp>,
    failures: Vec<FailureRule>,
}

/// In-memory key-value gateway for testing.
///
/// Records every applied operation for later verification and can be primed
/// to fail specific operations once.
///
/// # Example
///
/// ```ignore
/// let gateway = MemoryGateway::new();
/// gateway.seed_key("lock:report", "owner-token");
/// gateway.fail_next(OpKind::HashGetAll);
///
/// let err = gateway.hash_get_all("redlock_list").await.unwrap_err();
/// assert!(matches!(err, WatchdogError::Store(_)));
/// ```
pub struct MemoryGateway {
    state: RwLock<MemoryState>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Seed a top-level key without recording an operation.
    pub fn seed_key(&self, key: &str, value: &str) {
        self.state
            .write()
            .unwrap()
            .keys
            .insert(key.to_string(), value.to_string());
    }

    /// Seed a hash field without recording an operation.
    pub fn seed_hash_field(&self, hash: &str, field: &str, value: &str) {
        self.state
            .write()
            .unwrap()
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    /// Read a top-level key.
    pub fn key(&self, key: &str) -> Option<String> {
        self.state.read().unwrap().keys.get(key).cloned()
    }

    /// Read a whole hash. A missing hash reads as empty.
    pub fn hash(&self, hash: &str) -> HashMap<String, String> {
        self.state
            .read()
            .unwrap()
            .hashes
            .get(hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Read a single hash field.
    pub fn hash_field(&self, hash: &str, field: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .hashes
            .get(hash)
            .and_then(|h| h.get(field))
            .cloned()
    }

    /// Get all applied operations, in application order.
    pub fn operations(&self) -> Vec<RecordedOp> {
        self.state.read().unwrap().ops.clone()
    }

    /// Get applied operations of a specific kind.
    pub fn operations_of(&self, kind: OpKind) -> Vec<RecordedOp> {
        self.state
            .read()
            .unwrap()
            .ops
            .iter()
            .filter(|op| op.kind == kind)
            .cloned()
            .collect()
    }

    /// Assert that a specific number of operations of a kind were applied.
    pub fn assert_op_count(&self, kind: OpKind, expected: usize) {
        let ops = self.state.read().unwrap();
        let count = ops.ops.iter().filter(|op| op.kind == kind).count();
        assert_eq!(
            count, expected,
            "Expected {} applied {:?} operations, but found {}",
            expected, kind, count
        );
    }

    /// Clear all recorded operations.
    pub fn clear_operations(&self) {
        self.state.write().unwrap().ops.clear();
    }

    /// Make the next operation of the given kind fail, whatever it targets.
    pub fn fail_next(&self, kind: OpKind) {
        self.state
            .write()
            .unwrap()
            .failures
            .push(FailureRule { kind, field: None });
    }

    /// Make the next operation of the given kind fail when it touches
    /// `name`: either the hash or key it targets, or the field inside the
    /// hash.
    pub fn fail_next_on(&self, kind: OpKind, name: &str) {
        self.state.write().unwrap().failures.push(FailureRule {
            kind,
            field: Some(name.to_string()),
        });
    }

    /// Consume the first failure rule matching this operation, if any.
    fn take_failure(&self, kind: OpKind, target: &str, field: Option<&str>) -> bool {
        let mut state = self.state.write().unwrap();
        let position = state.failures.iter().position(|rule| {
            rule.kind == kind
                && rule
                    .field
                    .as_deref()
                    .map_or(true, |f| f == target || Some(f) == field)
        });
        match position {
            Some(index) => {
                state.failures.remove(index);
                true
            }
            None => false,
        }
    }

    fn record(&self, kind: OpKind, target: &str, field: Option<&str>) {
        self.state.write().unwrap().ops.push(RecordedOp {
            kind,
            target: target.to_string(),
            field: field.map(str::to_string),
        });
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueGateway for MemoryGateway {
    fn hash_set(
        &self,
        hash: &str,
        field: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let hash = hash.to_string();
        let field = field.to_string();
        let value = value.to_string();
        Box::pin(async move {
            if self.take_failure(OpKind::HashSet, &hash, Some(&field)) {
                return Err(WatchdogError::Store(format!(
                    "injected failure: hash_set {}/{}",
                    hash, field
                )));
            }
            self.state
                .write()
                .unwrap()
                .hashes
                .entry(hash.clone())
                .or_default()
                .insert(field.clone(), value);
            self.record(OpKind::HashSet, &hash, Some(&field));
            Ok(())
        })
    }

    fn hash_increment_by(
        &self,
        hash: &str,
        field: &str,
        delta: i64,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        let hash = hash.to_string();
        let field = field.to_string();
        Box::pin(async move {
            if self.take_failure(OpKind::HashIncrementBy, &hash, Some(&field)) {
                return Err(WatchdogError::Store(format!(
                    "injected failure: hash_increment_by {}/{}",
                    hash, field
                )));
            }
            let mut state = self.state.write().unwrap();
            let entry = state
                .hashes
                .entry(hash.clone())
                .or_default()
                .entry(field.clone())
                .or_insert_with(|| "0".to_string());
            let current: i64 = entry.parse().map_err(|_| {
                WatchdogError::Store(format!(
                    "hash value at {}/{} is not an integer",
                    hash, field
                ))
            })?;
            let next = current + delta;
            *entry = next.to_string();
            drop(state);
            self.record(OpKind::HashIncrementBy, &hash, Some(&field));
            Ok(next)
        })
    }

    fn hash_get_all(
        &self,
        hash: &str,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, String>>> + Send + '_>> {
        let hash = hash.to_string();
        Box::pin(async move {
            if self.take_failure(OpKind::HashGetAll, &hash, None) {
                return Err(WatchdogError::Store(format!(
                    "injected failure: hash_get_all {}",
                    hash
                )));
            }
            let snapshot = self
                .state
                .read()
                .unwrap()
                .hashes
                .get(&hash)
                .cloned()
                .unwrap_or_default();
            self.record(OpKind::HashGetAll, &hash, None);
            Ok(snapshot)
        })
    }

    fn hash_delete(
        &self,
        hash: &str,
        field: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let hash = hash.to_string();
        let field = field.to_string();
        Box::pin(async move {
            if self.take_failure(OpKind::HashDelete, &hash, Some(&field)) {
                return Err(WatchdogError::Store(format!(
                    "injected failure: hash_delete {}/{}",
                    hash, field
                )));
            }
            let mut state = self.state.write().unwrap();
            if let Some(fields) = state.hashes.get_mut(&hash) {
                fields.remove(&field);
                if fields.is_empty() {
                    state.hashes.remove(&hash);
                }
            }
            drop(state);
            self.record(OpKind::HashDelete, &hash, Some(&field));
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            if self.take_failure(OpKind::Delete, &key, None) {
                return Err(WatchdogError::Store(format!(
                    "injected failure: delete {}",
                    key
                )));
            }
            self.state.write().unwrap().keys.remove(&key);
            self.record(OpKind::Delete, &key, None);
            Ok(())
        })
    }
}
