//! Store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metadata for a stored blob, persisted next to it as `<key>.meta.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Filled in from the store directory when the entry is loaded
    #[serde(skip)]
    pub blob_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Taken from the blob's modification time, which reads bump
    #[serde(skip)]
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry relative to `now`, clamped at zero
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the entry has outlived `ttl` at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > ttl
    }
}

/// Statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}
