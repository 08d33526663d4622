//! File-based blob storage with atomic publish-by-rename

use crate::error::{Result, StoreError};
use crate::types::{CacheEntry, StoreStats};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const BLOB_SUFFIX: &str = ".blob";
const META_SUFFIX: &str = ".meta.json";
const TMP_DIR: &str = ".tmp";
const MAX_KEY_LEN: usize = 128;

/// Derive a stable store key from a source identifier (URL or path)
pub fn cache_key(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// A blob store keyed by [`cache_key`], one blob and one metadata file per entry
///
/// An entry is visible only once both files exist. Blobs are published before
/// their metadata and removed after it, so a reader that races a writer sees
/// either the previous entry, a miss, or the complete new entry.
pub struct ContentStore {
    dir: PathBuf,
    tmp_dir: PathBuf,
    ttl: Duration,
    tmp_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentStore {
    /// Open (creating if needed) a store rooted at `dir`
    ///
    /// Leftovers from interrupted writes are removed: temporary files, and
    /// blobs whose metadata was never published.
    pub async fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        let tmp_dir = dir.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir).await?;

        let mut removed = 0usize;
        let mut tmp_entries = fs::read_dir(&tmp_dir).await?;
        while let Some(entry) = tmp_entries.next_entry().await? {
            if fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| n.strip_suffix(BLOB_SUFFIX)) else {
                continue;
            };
            let meta = dir.join(format!("{key}{META_SUFFIX}"));
            if !fs::try_exists(&meta).await.unwrap_or(true)
                && fs::remove_file(entry.path()).await.is_ok()
            {
                removed += 1;
            }
        }

        info!(
            cache_dir = ?dir,
            ttl_secs = ttl.as_secs(),
            removed_leftovers = removed,
            "Content store opened"
        );

        Ok(Self {
            dir,
            tmp_dir,
            ttl,
            tmp_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a fresh blob, or `None` if absent, expired or unreadable
    ///
    /// Read failures are retried once and then reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if validate_key(key).is_err() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let now = Utc::now();
        let read = match self.read_fresh(key, now).await {
            Ok(read) => read,
            Err(first) => {
                debug!(key, error = %first, "Retrying blob read");
                match self.read_fresh(key, now).await {
                    Ok(read) => read,
                    Err(e) => {
                        warn!(key, error = %e, "Blob read failed, treating as miss");
                        None
                    }
                }
            }
        };

        let Some((entry, data)) = read else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        self.touch(entry.blob_path).await;
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key, size = data.len(), "Store hit");
        Some(Bytes::from(data))
    }

    /// Whether `key` is cached and fresh; does not count as an access
    pub async fn peek(&self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        matches!(
            self.load_entry(key).await,
            Ok(Some(entry)) if !entry.is_expired(self.ttl, Utc::now())
        )
    }

    /// Metadata for `key` regardless of expiry
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        validate_key(key)?;
        self.load_entry(key).await
    }

    /// Write (or overwrite) the blob for `key`
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<CacheEntry> {
        self.put_at(key, data, Utc::now()).await
    }

    pub(crate) async fn put_at(
        &self,
        key: &str,
        data: &[u8],
        created_at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        validate_key(key)?;

        let entry = CacheEntry {
            key: key.to_string(),
            blob_path: self.blob_path(key),
            size_bytes: data.len() as u64,
            created_at,
            last_accessed_at: created_at,
        };
        let meta = serde_json::to_vec(&entry)?;

        self.publish(&entry.blob_path, data).await?;
        if let Err(e) = self.publish(&self.meta_path(key), &meta).await {
            // Without metadata the blob is unreachable; a previous entry's
            // metadata may still point at it, so drop both
            let _ = fs::remove_file(self.meta_path(key)).await;
            let _ = fs::remove_file(&entry.blob_path).await;
            return Err(e);
        }

        debug!(key, size = entry.size_bytes, "Stored blob");
        Ok(entry)
    }

    /// Remove `key`; returns whether anything was removed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.remove_files(key).await
    }

    /// Remove `entry` if it is still the stored version of its key
    ///
    /// Returns `false`, leaving the files alone, when a later put replaced the
    /// entry after it was enumerated.
    pub(crate) async fn remove_entry(&self, entry: &CacheEntry) -> Result<bool> {
        if let Ok(Some(current)) = self.load_entry(&entry.key).await {
            if current.created_at != entry.created_at {
                debug!(key = %entry.key, "Entry replaced since enumeration, keeping it");
                return Ok(false);
            }
        }
        self.remove_files(&entry.key).await?;
        Ok(true)
    }

    /// All entries currently on disk, oldest `created_at` first, ties by key
    ///
    /// Each call re-reads the directory.
    pub async fn enumerate(&self) -> Result<std::vec::IntoIter<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let name = dirent.file_name();
            let Some(key) = name.to_str().and_then(|n| n.strip_suffix(META_SUFFIX)) else {
                continue;
            };
            match self.load_entry(key).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "Skipping unreadable entry"),
            }
        }

        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(entries.into_iter())
    }

    pub async fn total_size(&self) -> Result<u64> {
        Ok(self.enumerate().await?.map(|e| e.size_bytes).sum())
    }

    pub async fn stats(&self) -> StoreStats {
        let (entries, total_size) = match self.enumerate().await {
            Ok(entries) => entries.fold((0, 0), |(n, size), e| (n + 1, size + e.size_bytes)),
            Err(e) => {
                warn!(error = %e, "Failed to enumerate store for stats");
                (0, 0)
            }
        };
        StoreStats {
            entries,
            total_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{BLOB_SUFFIX}"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{META_SUFFIX}"))
    }

    /// Load metadata for `key`; `None` unless both metadata and blob exist
    async fn load_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let raw = match fs::read(self.meta_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut entry: CacheEntry = serde_json::from_slice(&raw)?;
        if entry.key != key {
            return Err(StoreError::Metadata(format!(
                "metadata for {} names key {}",
                key, entry.key
            )));
        }

        entry.blob_path = self.blob_path(key);
        let blob_meta = match fs::metadata(&entry.blob_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        entry.last_accessed_at = blob_meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(entry.created_at);

        Ok(Some(entry))
    }

    async fn read_fresh(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(CacheEntry, Vec<u8>)>> {
        let Some(entry) = self.load_entry(key).await? else {
            return Ok(None);
        };

        if entry.is_expired(self.ttl, now) {
            debug!(
                key,
                age_secs = entry.age(now).as_secs(),
                ttl_secs = self.ttl.as_secs(),
                "Store entry expired"
            );
            return Ok(None);
        }

        let data = match fs::read(&entry.blob_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Blob replaced underneath the metadata by a concurrent overwrite
        if data.len() as u64 != entry.size_bytes {
            debug!(key, "Blob size does not match metadata, treating as miss");
            return Ok(None);
        }

        Ok(Some((entry, data)))
    }

    /// Record an access by bumping the blob's mtime; best effort
    async fn touch(&self, blob_path: PathBuf) {
        let result = tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&blob_path)?
                .set_modified(SystemTime::now())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Failed to record blob access"),
            Err(e) => debug!(error = %e, "Access-time task failed"),
        }
    }

    async fn publish(&self, dest: &Path, data: &[u8]) -> Result<()> {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .tmp_dir
            .join(format!("{}-{}.tmp", std::process::id(), seq));

        let written: std::io::Result<()> = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, dest).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_files(&self, key: &str) -> Result<bool> {
        let had_meta = remove_if_exists(&self.meta_path(key)).await?;
        let had_blob = remove_if_exists(&self.blob_path(key)).await?;
        Ok(had_meta || had_blob)
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
