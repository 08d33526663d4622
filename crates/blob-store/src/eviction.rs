//! Age and size based eviction

use crate::error::Result;
use crate::store::ContentStore;
use crate::types::CacheEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 7 days
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// 500 MiB
pub const DEFAULT_SIZE_BUDGET: u64 = 500 * 1024 * 1024;

/// Bounds both staleness and disk usage of a [`ContentStore`]
///
/// A sweep first removes every entry older than `ttl`, then, if the store is
/// still over `size_budget`, removes entries oldest `created_at` first (ties
/// broken by key) until it fits. Budget is only ever enforced after the fact;
/// writes are never rejected for size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub ttl: Duration,
    pub size_budget: u64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            size_budget: DEFAULT_SIZE_BUDGET,
        }
    }
}

/// Outcome of a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
    pub freed_bytes: u64,
    pub remaining_entries: usize,
    pub remaining_bytes: u64,
}

impl EvictionPolicy {
    pub fn new(ttl: Duration, size_budget: u64) -> Self {
        Self { ttl, size_budget }
    }

    /// Sweep the whole store
    pub async fn sweep(&self, store: &ContentStore) -> Result<SweepReport> {
        self.sweep_at(store, None, Utc::now()).await
    }

    /// Sweep after `admitted_key` was written
    ///
    /// The freshly admitted entry survives the size pass even when it alone
    /// exceeds the budget; the next plain [`sweep`](Self::sweep) removes it.
    pub async fn sweep_after_put(
        &self,
        store: &ContentStore,
        admitted_key: &str,
    ) -> Result<SweepReport> {
        self.sweep_at(store, Some(admitted_key), Utc::now()).await
    }

    async fn sweep_at(
        &self,
        store: &ContentStore,
        admitted_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut live = Vec::new();

        for entry in store.enumerate().await? {
            if entry.is_expired(self.ttl, now) && remove(store, &entry).await {
                debug!(key = %entry.key, "Removed expired entry");
                report.expired += 1;
                report.freed_bytes += entry.size_bytes;
                continue;
            }
            live.push(entry);
        }

        let mut total: u64 = live.iter().map(|e| e.size_bytes).sum();
        for entry in live {
            let protected = admitted_key == Some(entry.key.as_str());
            if total > self.size_budget && !protected && remove(store, &entry).await {
                debug!(key = %entry.key, size = entry.size_bytes, "Evicted oldest entry");
                total -= entry.size_bytes;
                report.evicted += 1;
                report.freed_bytes += entry.size_bytes;
            } else {
                report.remaining_entries += 1;
            }
        }
        report.remaining_bytes = total;

        if report.expired > 0 || report.evicted > 0 {
            info!(
                expired = report.expired,
                evicted = report.evicted,
                freed_bytes = report.freed_bytes,
                remaining_bytes = report.remaining_bytes,
                "Swept content store"
            );
        }

        Ok(report)
    }
}

async fn remove(store: &ContentStore, entry: &CacheEntry) -> bool {
    match store.remove_entry(entry).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!(key = %entry.key, error = %e, "Failed to remove entry");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    const LONG_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    async fn open_store(dir: &std::path::Path) -> ContentStore {
        ContentStore::open(dir, LONG_TTL).await.unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = EvictionPolicy::default();
        assert_eq!(policy.ttl, Duration::from_secs(604_800));
        assert_eq!(policy.size_budget, 500 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_budget_keeps_newest() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let policy = EvictionPolicy::new(LONG_TTL, 100);

        let now = Utc::now();
        store
            .put_at("a", &[0u8; 60], now - ChronoDuration::seconds(1))
            .await
            .unwrap();
        store.put_at("b", &[1u8; 60], now).await.unwrap();

        let report = policy.sweep(&store).await.unwrap();

        assert_eq!(report.evicted, 1);
        assert_eq!(report.freed_bytes, 60);
        assert!(store.get("a").await.is_none());
        assert!(store.get("b").await.is_some());
        assert_eq!(store.total_size().await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_evicts_strictly_oldest_first() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path()).await;
        // Three 40-byte entries, budget fits two
        let policy = EvictionPolicy::new(LONG_TTL, 80);

        let now = Utc::now();
        store
            .put_at("t2", &[2u8; 40], now - ChronoDuration::seconds(20))
            .await
            .unwrap();
        store
            .put_at("t3", &[3u8; 40], now - ChronoDuration::seconds(10))
            .await
            .unwrap();
        store
            .put_at("t1", &[1u8; 40], now - ChronoDuration::seconds(30))
            .await
            .unwrap();

        let report = policy.sweep(&store).await.unwrap();

        assert_eq!(report.evicted, 1);
        assert!(!store.peek("t1").await);
        assert!(store.peek("t2").await);
        assert!(store.peek("t3").await);
    }

    #[tokio::test]
    async fn test_ties_broken_by_key() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let policy = EvictionPolicy::new(LONG_TTL, 10);

        let at = Utc::now() - ChronoDuration::seconds(5);
        store.put_at("zeta", &[0u8; 10], at).await.unwrap();
        store.put_at("alpha", &[0u8; 10], at).await.unwrap();

        policy.sweep(&store).await.unwrap();

        assert!(!store.peek("alpha").await);
        assert!(store.peek("zeta").await);
    }

    #[tokio::test]
    async fn test_expired_entries_removed_from_disk() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(dir.path(), Duration::from_secs(60))
            .await
            .unwrap();
        let policy = EvictionPolicy::new(Duration::from_secs(60), u64::MAX);

        let now = Utc::now();
        store
            .put_at("stale", b"old", now - ChronoDuration::seconds(120))
            .await
            .unwrap();
        store.put_at("fresh", b"new", now).await.unwrap();

        assert_eq!(store.enumerate().await.unwrap().count(), 2);

        let report = policy.sweep(&store).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(report.remaining_entries, 1);
        assert!(!dir.path().join("stale.blob").exists());
        assert!(!dir.path().join("stale.meta.json").exists());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_refetched_entry_survives_stale_snapshot() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(dir.path(), Duration::from_secs(60))
            .await
            .unwrap();

        store
            .put_at("thumb", b"old", Utc::now() - ChronoDuration::seconds(120))
            .await
            .unwrap();
        let snapshot: Vec<_> = store.enumerate().await.unwrap().collect();
        assert!(snapshot[0].is_expired(Duration::from_secs(60), Utc::now()));

        // a transfer re-fetches the key between enumeration and removal
        store.put("thumb", b"new").await.unwrap();

        assert!(!remove(&store, &snapshot[0]).await);
        assert_eq!(&store.get("thumb").await.unwrap()[..], b"new");

        let current: Vec<_> = store.enumerate().await.unwrap().collect();
        assert!(remove(&store, &current[0]).await);
        assert!(store.get("thumb").await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_entry_admitted_then_evicted_on_next_sweep() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let policy = EvictionPolicy::new(LONG_TTL, 100);

        store
            .put_at("small", &[0u8; 50], Utc::now() - ChronoDuration::seconds(5))
            .await
            .unwrap();
        store.put("huge", &[0u8; 150]).await.unwrap();

        let report = policy.sweep_after_put(&store, "huge").await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(store.peek("huge").await);
        assert!(!store.peek("small").await);
        assert_eq!(report.remaining_bytes, 150);

        let report = policy.sweep(&store).await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(!store.peek("huge").await);
        assert_eq!(store.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_under_budget_after_many_puts() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let policy = EvictionPolicy::new(LONG_TTL, 256);

        let base = Utc::now() - ChronoDuration::seconds(100);
        for i in 0..20i64 {
            let size = 10 + (i as usize * 7) % 50;
            store
                .put_at(
                    &format!("k{i:02}"),
                    &vec![0u8; size],
                    base + ChronoDuration::seconds(i),
                )
                .await
                .unwrap();
        }

        let report = policy.sweep(&store).await.unwrap();

        let total = store.total_size().await.unwrap();
        assert!(total <= 256);
        assert_eq!(report.remaining_bytes, total);
        // The newest entry always survives a budget this size
        assert!(store.peek("k19").await);
    }
}
