use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Trait for the shared key-value store the watchdog operates against.
///
/// This trait covers the handful of hash and key operations the watchdog
/// needs, so the core logic never depends on a concrete store client.
/// Implementations are expected to map their own failure type into
/// [`WatchdogError::Store`](crate::error::WatchdogError::Store).
pub trait KeyValueGateway: Send + Sync {
    /// Set a field inside a hash to the given value.
    ///
    /// # Arguments
    /// * `hash` - The hash key
    /// * `field` - The field inside the hash
    /// * `value` - The value to store
    fn hash_set(
        &self,
        hash: &str,
        field: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Atomically add `delta` to an integer field inside a hash.
    ///
    /// A missing field counts as 0 before the addition.
    ///
    /// # Returns
    /// The field's value after the increment
    fn hash_increment_by(
        &self,
        hash: &str,
        field: &str,
        delta: i64,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;

    /// Read every field of a hash.
    ///
    /// A missing hash reads as an empty map.
    fn hash_get_all(
        &self,
        hash: &str,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, String>>> + Send + '_>>;

    /// Remove a single field from a hash.
    ///
    /// Removing an absent field is not an error.
    fn hash_delete(
        &self,
        hash: &str,
        field: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Delete a top-level key.
    ///
    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
