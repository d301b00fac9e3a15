use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque identifier of a distributed lock.
///
/// Shares the namespace of the lock's resource key: the same string
/// addresses the lock resource, its counter field, and its metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(String);

impl LockKey {
    /// Create a key from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for LockKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for LockKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of the process that registered a heartbeat for a lock.
///
/// Written JSON-encoded to the companion info hash at registration time and
/// deleted together with the counter entry. Purely diagnostic: reclamation
/// never depends on it being present or readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Hostname of the registering process.
    pub host: String,
    /// Process id of the registering process.
    pub pid: u32,
    /// When the heartbeat was registered.
    pub registered_at: DateTime<Utc>,
}

impl LockMetadata {
    /// Capture a descriptor for the current process.
    pub fn for_current_process() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            host,
            pid: std::process::id(),
            registered_at: Utc::now(),
        }
    }

    /// Serialize to the JSON form stored in the info hash.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from the JSON form stored in the info hash.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
