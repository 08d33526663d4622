//! Local filesystem capability
//!
//! User wallpapers are never deleted outright; removal always goes through
//! the desktop trash so it can be undone.

use crate::descriptor::LocalDescriptor;
use crate::error::Result;
use crate::scanner;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Immediate children of `path`, sorted by name
pub async fn list_entries(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

pub async fn read_bytes(path: &Path) -> Result<Bytes> {
    Ok(Bytes::from(tokio::fs::read(path).await?))
}

/// Write through a temp file in the same directory, then rename into place
pub async fn write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(
        ".{}.{}-{}.tmp",
        name,
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let written: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Real path of `path` if it lies inside `root`, `None` if it resolves
/// elsewhere
///
/// Symlinks and `..` are resolved first. Fails when either path cannot be
/// resolved, usually because it does not exist.
pub async fn confine(root: &Path, path: &Path) -> Result<Option<PathBuf>> {
    let root = tokio::fs::canonicalize(root).await?;
    let resolved = tokio::fs::canonicalize(path).await?;
    if resolved.starts_with(&root) {
        Ok(Some(resolved))
    } else {
        debug!(path = %path.display(), root = %root.display(), "Path outside root");
        Ok(None)
    }
}

/// Move `path` to the trash; `false` if there was nothing to move
pub async fn move_to_trash(path: &Path) -> Result<bool> {
    if !tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "Nothing to trash");
        return Ok(false);
    }

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || trash::delete(&target))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;

    info!(path = %path.display(), "Moved to trash");
    Ok(true)
}

/// Every supported file below `root`, newest first
pub async fn list_wallpapers(root: &Path) -> Result<Vec<LocalDescriptor>> {
    let root = root.to_path_buf();
    let mut wallpapers: Vec<LocalDescriptor> = tokio::task::spawn_blocking(move || {
        scanner::scan(&root).map(LocalDescriptor::from).collect()
    })
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))?;
    wallpapers.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(wallpapers)
}

/// Case-insensitive file name match, newest first; a blank query keeps everything
pub fn search_local(wallpapers: &[LocalDescriptor], query: &str) -> Vec<LocalDescriptor> {
    let query = query.trim().to_lowercase();
    let mut matches: Vec<LocalDescriptor> = wallpapers
        .iter()
        .filter(|w| query.is_empty() || w.file_name().to_lowercase().contains(&query))
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
    matches
}
