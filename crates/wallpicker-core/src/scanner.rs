//! Directory scanning
//!
//! [`scan`] is a plain lazy iterator over the image files below a root. It
//! follows symlinks but visits each real directory once, so link cycles end
//! the walk instead of recursing forever. [`DirectoryScanner`] runs walks on
//! the blocking pool, bounded by a worker semaphore, for async callers that
//! want a stream or a single page.

use crate::descriptor::LocalDescriptor;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;
use walkdir::WalkDir;

/// Image extensions the picker can display, lowercase
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
}

/// A file found by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl From<FileDescriptor> for LocalDescriptor {
    fn from(file: FileDescriptor) -> Self {
        LocalDescriptor {
            path: file.path,
            size: file.size,
            modified: file.modified,
            favorite: false,
        }
    }
}

/// Lazy walk over supported files below `root`
///
/// Each call starts a fresh walk of the current on-disk state, in file name
/// order within each directory, so offsets stay stable between walks.
/// Unreadable entries are skipped.
pub fn scan(root: impl AsRef<Path>) -> Scan {
    Scan {
        walker: WalkDir::new(root.as_ref())
            .follow_links(true)
            .sort_by_file_name()
            .into_iter(),
        visited: HashSet::new(),
    }
}

pub struct Scan {
    walker: walkdir::IntoIter,
    visited: HashSet<PathBuf>,
}

impl Iterator for Scan {
    type Item = FileDescriptor;

    fn next(&mut self) -> Option<FileDescriptor> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                match std::fs::canonicalize(entry.path()) {
                    Ok(real) => {
                        if !self.visited.insert(real) {
                            debug!(path = %entry.path().display(), "Directory already visited");
                            self.walker.skip_current_dir();
                        }
                    }
                    Err(e) => {
                        debug!(path = %entry.path().display(), error = %e, "Skipping directory");
                        self.walker.skip_current_dir();
                    }
                }
                continue;
            }

            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping file");
                    continue;
                }
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH));

            return Some(FileDescriptor {
                path: entry.into_path(),
                size: metadata.len(),
                modified,
            });
        }
    }
}

/// One window of a scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanPage {
    pub offset: usize,
    pub items: Vec<FileDescriptor>,
    /// Offset of the next page, if there is one
    pub next_offset: Option<usize>,
}

/// Runs scans on the blocking pool, at most `workers` at a time
#[derive(Clone)]
pub struct DirectoryScanner {
    workers: Arc<Semaphore>,
}

impl DirectoryScanner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Stream files as the walk finds them
    ///
    /// The walk pauses while the channel is full and stops once the receiver
    /// is dropped.
    pub fn stream(&self, root: PathBuf, buffer: usize) -> mpsc::Receiver<FileDescriptor> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let workers = self.workers.clone();

        tokio::spawn(async move {
            let Ok(permit) = workers.acquire_owned().await else {
                return;
            };
            let walk = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                for file in scan(&root) {
                    if tx.blocking_send(file).is_err() {
                        break;
                    }
                }
            });
            if let Err(e) = walk.await {
                debug!(error = %e, "Scan task ended abnormally");
            }
        });

        rx
    }

    /// Files `offset..offset + limit` of a fresh walk
    pub async fn page(&self, root: PathBuf, offset: usize, limit: usize) -> Result<ScanPage> {
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CoreError::Io(Box::new(std::io::Error::other(e.to_string()))))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut files = scan(&root).skip(offset);
            let items: Vec<FileDescriptor> = files.by_ref().take(limit).collect();
            let next_offset = files.next().map(|_| offset + items.len());
            ScanPage {
                offset,
                items,
                next_offset,
            }
        })
        .await
        .map_err(|e| CoreError::Io(Box::new(std::io::Error::other(e.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    fn names(files: &[FileDescriptor]) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("a.jpg")));
        assert!(is_supported(Path::new("a.JPEG")));
        assert!(is_supported(Path::new("dir/b.webp")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("jpg")));
    }

    #[test]
    fn test_scan_filters_and_recurses() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.png"), b"12345");
        touch(&dir.path().join("readme.md"), b"x");
        touch(&dir.path().join("nested/deeper/b.JPG"), b"1");
        touch(&dir.path().join("nested/c.gif"), b"1");

        let files: Vec<_> = scan(dir.path()).collect();
        assert_eq!(names(&files), vec!["a.png", "b.JPG", "c.gif"]);

        let a = files.iter().find(|f| f.path.ends_with("a.png")).unwrap();
        assert_eq!(a.size, 5);
    }

    #[test]
    fn test_scan_is_lazy_and_restartable() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            touch(&dir.path().join(format!("{i}.png")), b"x");
        }

        let mut first = scan(dir.path());
        assert!(first.next().is_some());

        touch(&dir.path().join("late.png"), b"x");
        assert_eq!(scan(dir.path()).count(), 6);
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        assert_eq!(scan(dir.path().join("missing")).count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("walls/a.png"), b"x");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("walls/loop")).unwrap();

        let files: Vec<_> = scan(dir.path()).collect();
        assert_eq!(names(&files), vec!["a.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_linked_twice_is_visited_once() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("real/a.png"), b"x");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        assert_eq!(scan(dir.path()).count(), 1);
    }

    #[tokio::test]
    async fn test_page() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            touch(&dir.path().join(format!("{i}.png")), b"x");
        }
        let scanner = DirectoryScanner::new(2);

        let first = scanner.page(dir.path().to_path_buf(), 0, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_offset, Some(2));

        let last = scanner.page(dir.path().to_path_buf(), 4, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.next_offset, None);

        let beyond = scanner.page(dir.path().to_path_buf(), 10, 2).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.next_offset, None);
    }

    #[tokio::test]
    async fn test_pages_follow_name_order() {
        let dir = tempdir().unwrap();
        for name in ["d.png", "a.png", "c.png", "b.png", "e.png"] {
            touch(&dir.path().join(name), b"x");
        }
        let scanner = DirectoryScanner::new(1);

        let mut listed = Vec::new();
        let mut offset = Some(0);
        while let Some(at) = offset {
            let page = scanner.page(dir.path().to_path_buf(), at, 2).await.unwrap();
            listed.extend(page.items);
            offset = page.next_offset;
        }

        let order: Vec<_> = listed
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, vec!["a.png", "b.png", "c.png", "d.png", "e.png"]);
    }

    #[tokio::test]
    async fn test_stream_yields_every_file() {
        let dir = tempdir().unwrap();
        for i in 0..20 {
            touch(&dir.path().join(format!("sub{}/{i}.jpg", i % 3)), b"x");
        }
        let scanner = DirectoryScanner::new(1);

        let mut rx = scanner.stream(dir.path().to_path_buf(), 4);
        let mut seen = 0;
        while let Some(file) = rx.recv().await {
            assert!(is_supported(&file.path));
            seen += 1;
        }
        assert_eq!(seen, 20);
    }

    #[tokio::test]
    async fn test_stream_stops_when_dropped() {
        let dir = tempdir().unwrap();
        for i in 0..50 {
            touch(&dir.path().join(format!("{i}.png")), b"x");
        }
        let scanner = DirectoryScanner::new(1);

        let mut rx = scanner.stream(dir.path().to_path_buf(), 1);
        assert!(rx.recv().await.is_some());
        drop(rx);

        // the single worker permit comes back once the walk notices
        let page = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            scanner.page(dir.path().to_path_buf(), 0, 1),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(page.items.len(), 1);
    }
}
