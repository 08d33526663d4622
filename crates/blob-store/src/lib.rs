//! Disk-backed blob store with TTL expiration and oldest-first eviction
//!
//! Blobs and their metadata live side by side in a single directory. Every
//! write goes through a temporary file that is renamed into place, so readers
//! never observe a truncated blob. Expired entries read as misses until the
//! next [`EvictionPolicy::sweep`] removes them from disk.

mod error;
mod eviction;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use eviction::{EvictionPolicy, SweepReport, DEFAULT_SIZE_BUDGET, DEFAULT_TTL};
pub use store::{cache_key, ContentStore};
pub use types::{CacheEntry, StoreStats};
