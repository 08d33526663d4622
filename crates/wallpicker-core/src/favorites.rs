//! Favorite wallpapers, persisted as a JSON array

use crate::descriptor::WallpaperDescriptor;
use crate::error::Result;
use crate::localfs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub wallpaper: WallpaperDescriptor,
    pub added_at: DateTime<Utc>,
}

impl Favorite {
    pub fn id(&self) -> String {
        self.wallpaper.id()
    }

    pub fn days_since_added(&self, now: DateTime<Utc>) -> i64 {
        (now - self.added_at).num_days()
    }
}

/// Favorites file plus an in-memory copy
///
/// Every change rewrites the whole file atomically while holding the lock,
/// so concurrent changes never interleave.
pub struct FavoritesStore {
    path: PathBuf,
    favorites: Mutex<Vec<Favorite>>,
}

impl FavoritesStore {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wallpicker").join("favorites.json"))
    }

    /// Load `path`, creating an empty favorites file if it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let favorites: Vec<Favorite> = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read(&path).await?;
            serde_json::from_slice(&raw)?
        } else {
            info!(path = %path.display(), "Creating empty favorites file");
            localfs::write_bytes(&path, b"[]").await?;
            Vec::new()
        };
        debug!(count = favorites.len(), "Loaded favorites");

        Ok(Self {
            path,
            favorites: Mutex::new(favorites),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a wallpaper; `false` if it was already a favorite
    pub async fn add(&self, wallpaper: &WallpaperDescriptor) -> Result<bool> {
        let mut favorites = self.favorites.lock().await;
        let id = wallpaper.id();
        if favorites.iter().any(|f| f.id() == id) {
            debug!(id = %id, "Already a favorite");
            return Ok(false);
        }

        let mut wallpaper = wallpaper.clone();
        wallpaper.set_favorite(true);
        let mut updated = favorites.clone();
        updated.push(Favorite {
            wallpaper,
            added_at: Utc::now(),
        });
        self.persist(&updated).await?;
        *favorites = updated;

        info!(id = %id, "Added favorite");
        Ok(true)
    }

    /// Remove by id; `false` if it was not a favorite
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut favorites = self.favorites.lock().await;
        let updated: Vec<Favorite> = favorites.iter().filter(|f| f.id() != id).cloned().collect();
        if updated.len() == favorites.len() {
            debug!(id, "Not a favorite");
            return Ok(false);
        }

        self.persist(&updated).await?;
        *favorites = updated;

        info!(id, "Removed favorite");
        Ok(true)
    }

    pub async fn is_favorite(&self, id: &str) -> bool {
        self.favorites.lock().await.iter().any(|f| f.id() == id)
    }

    /// All favorites in the order they were added
    pub async fn list(&self) -> Vec<Favorite> {
        self.favorites.lock().await.clone()
    }

    /// Favorites whose descriptor matches `query`
    pub async fn search(&self, query: &str) -> Vec<Favorite> {
        self.favorites
            .lock()
            .await
            .iter()
            .filter(|f| f.wallpaper.matches_query(query))
            .cloned()
            .collect()
    }

    /// Set the favorite flag on each descriptor from this store
    pub async fn mark(&self, wallpapers: &mut [WallpaperDescriptor]) {
        let favorites = self.favorites.lock().await;
        for wallpaper in wallpapers.iter_mut() {
            let id = wallpaper.id();
            wallpaper.set_favorite(favorites.iter().any(|f| f.id() == id));
        }
    }

    async fn persist(&self, favorites: &[Favorite]) -> Result<()> {
        let json = serde_json::to_vec_pretty(favorites)?;
        localfs::write_bytes(&self.path, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{LocalDescriptor, RemoteDescriptor};
    use tempfile::tempdir;

    fn remote(id: &str, category: &str) -> WallpaperDescriptor {
        WallpaperDescriptor::Remote(RemoteDescriptor {
            id: id.to_string(),
            page_url: format!("https://wallhaven.cc/w/{id}"),
            full_url: format!("https://w.wallhaven.cc/full/xx/wallhaven-{id}.jpg"),
            thumbnail_url: format!("https://th.wallhaven.cc/lg/xx/{id}.jpg"),
            resolution: None,
            category: category.to_string(),
            purity: "sfw".to_string(),
            colors: Vec::new(),
            file_size: 100,
            file_type: None,
            favorite: false,
        })
    }

    #[tokio::test]
    async fn test_open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallpicker").join("favorites.json");
        let store = FavoritesStore::open(&path).await.unwrap();
        assert!(store.list().await.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FavoritesStore::open(dir.path().join("favorites.json"))
            .await
            .unwrap();

        assert!(store.add(&remote("abc", "general")).await.unwrap());
        assert!(!store.add(&remote("abc", "general")).await.unwrap());
        assert_eq!(store.list().await.len(), 1);
        assert!(store.is_favorite("abc").await);
        assert!(store.list().await[0].wallpaper.is_favorite());
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let dir = tempdir().unwrap();
        let store = FavoritesStore::open(dir.path().join("favorites.json"))
            .await
            .unwrap();
        store.add(&remote("abc", "general")).await.unwrap();

        assert!(!store.remove("zzz").await.unwrap());
        assert!(store.remove("abc").await.unwrap());
        assert!(!store.is_favorite("abc").await);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        {
            let store = FavoritesStore::open(&path).await.unwrap();
            store.add(&remote("abc", "anime")).await.unwrap();
            store
                .add(&WallpaperDescriptor::Local(LocalDescriptor {
                    path: PathBuf::from("/walls/lake.png"),
                    size: 3,
                    modified: Utc::now(),
                    favorite: false,
                }))
                .await
                .unwrap();
        }

        let reopened = FavoritesStore::open(&path).await.unwrap();
        let favorites = reopened.list().await;
        assert_eq!(favorites.len(), 2);
        assert_eq!(favorites[0].id(), "abc");
        assert_eq!(favorites[1].id(), "/walls/lake.png");
        assert_eq!(favorites[0].days_since_added(Utc::now()), 0);
    }

    #[tokio::test]
    async fn test_search_and_mark() {
        let dir = tempdir().unwrap();
        let store = FavoritesStore::open(dir.path().join("favorites.json"))
            .await
            .unwrap();
        store.add(&remote("abc", "anime")).await.unwrap();
        store.add(&remote("def", "general")).await.unwrap();

        let found = store.search("ANIME").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "abc");
        assert_eq!(store.search("").await.len(), 2);

        let mut page = vec![remote("abc", "anime"), remote("xyz", "people")];
        store.mark(&mut page).await;
        assert!(page[0].is_favorite());
        assert!(!page[1].is_favorite());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        std::fs::write(&path, b"{oops").unwrap();
        assert!(FavoritesStore::open(&path).await.is_err());
    }
}
