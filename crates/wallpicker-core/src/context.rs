//! Process-wide core state
//!
//! [`CoreContext`] owns the content store, fetch pipeline, scanner and
//! favorites for one process. It is created once at startup with
//! [`CoreContext::init`] and torn down with [`CoreContext::shutdown`]; nothing
//! in the core is a global.

use crate::config::CoreConfig;
use crate::descriptor::{LocalDescriptor, Locator, RemoteDescriptor, WallpaperDescriptor};
use crate::error::{FetchError, Result};
use crate::favorites::{Favorite, FavoritesStore};
use crate::localfs;
use crate::pipeline::{FetchOutcome, FetchPipeline, PipelineSettings, PipelineStats};
use crate::scanner::{self, DirectoryScanner, FileDescriptor, Scan, ScanPage};
use crate::source::{RemoteSource, SearchPage};
use blob_store::{ContentStore, SweepReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wallhaven_client::{SearchQuery, WallhavenClient};

pub struct CoreContext {
    config: CoreConfig,
    pipeline: FetchPipeline,
    scanner: DirectoryScanner,
    favorites: FavoritesStore,
}

impl CoreContext {
    /// Open the store, build the pipeline and run a startup sweep
    pub async fn init(config: CoreConfig, remote: Arc<dyn RemoteSource>) -> Result<Self> {
        config.validate()?;

        let store = ContentStore::open(&config.cache_dir, config.ttl()).await?;
        let pipeline = FetchPipeline::new(
            Arc::new(store),
            remote,
            PipelineSettings::from_config(&config),
        );

        match pipeline.evict_now().await {
            Ok(report) => info!(
                entries = report.remaining_entries,
                bytes = report.remaining_bytes,
                "Startup sweep complete"
            ),
            Err(e) => warn!(error = %e, "Startup sweep failed"),
        }

        let favorites = FavoritesStore::open(&config.favorites_file).await?;

        info!(
            cache_dir = %config.cache_dir.display(),
            local_dir = %config.local_wallpapers_dir.display(),
            "Core context initialised"
        );

        Ok(Self {
            scanner: DirectoryScanner::new(config.scan_workers),
            config,
            pipeline,
            favorites,
        })
    }

    /// [`init`](Self::init) against the Wallhaven API
    pub async fn init_with_wallhaven(config: CoreConfig) -> Result<Self> {
        let client = WallhavenClient::new(config.wallhaven_api_key.clone());
        Self::init(config, Arc::new(client)).await
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &FetchPipeline {
        &self.pipeline
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    pub async fn fetch(
        &self,
        source: &Locator,
        timeout: Option<Duration>,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        self.pipeline.fetch_locator(source, timeout).await
    }

    pub async fn fetch_thumbnail(
        &self,
        wallpaper: &WallpaperDescriptor,
        timeout: Option<Duration>,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        self.fetch(&wallpaper.thumbnail_locator(), timeout).await
    }

    pub async fn peek(&self, source: &Locator) -> bool {
        self.pipeline.peek_locator(source).await
    }

    pub async fn evict_now(&self) -> Result<SweepReport> {
        self.pipeline.evict_now().await
    }

    /// Lazy walk of `root`
    pub fn scan_directory(&self, root: impl AsRef<Path>) -> Scan {
        scanner::scan(root)
    }

    pub async fn scan_page(&self, root: PathBuf, offset: usize, limit: usize) -> Result<ScanPage> {
        self.scanner.page(root, offset, limit).await
    }

    /// Walk `root` on the scanner pool, yielding files as they are found
    pub fn stream_directory(
        &self,
        root: PathBuf,
        buffer: usize,
    ) -> mpsc::Receiver<FileDescriptor> {
        self.scanner.stream(root, buffer)
    }

    /// Real path of `path` if it lies inside the wallpapers directory
    ///
    /// `None` when it resolves elsewhere; an error when it does not exist.
    pub async fn confine_local(&self, path: &Path) -> Result<Option<PathBuf>> {
        localfs::confine(&self.config.local_wallpapers_dir, path).await
    }

    /// The configured wallpapers directory, newest first, favorites marked
    pub async fn local_wallpapers(&self) -> Result<Vec<WallpaperDescriptor>> {
        let mut wallpapers: Vec<WallpaperDescriptor> =
            localfs::list_wallpapers(&self.config.local_wallpapers_dir)
                .await?
                .into_iter()
                .map(WallpaperDescriptor::Local)
                .collect();
        self.favorites.mark(&mut wallpapers).await;
        Ok(wallpapers)
    }

    /// Local wallpapers whose file name contains `query`, newest first
    pub async fn search_local(&self, query: &str) -> Result<Vec<LocalDescriptor>> {
        let mut wallpapers: Vec<LocalDescriptor> =
            localfs::list_wallpapers(&self.config.local_wallpapers_dir).await?;
        for wallpaper in wallpapers.iter_mut() {
            wallpaper.favorite = self
                .favorites
                .is_favorite(&wallpaper.path.display().to_string())
                .await;
        }
        Ok(localfs::search_local(&wallpapers, query))
    }

    pub async fn search_favorites(&self, query: &str) -> Vec<Favorite> {
        self.favorites.search(query).await
    }

    /// Remote search with favorites marked
    pub async fn search(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<SearchPage, FetchError> {
        let mut page = self.pipeline.remote().search(query).await?;
        for wallpaper in page.wallpapers.iter_mut() {
            wallpaper.favorite = self.favorites.is_favorite(&wallpaper.id).await;
        }
        Ok(page)
    }

    pub async fn search_preset(
        &self,
        name: &str,
        page: u32,
    ) -> std::result::Result<SearchPage, FetchError> {
        let query = SearchQuery::preset(name, page)?;
        self.search(&query).await
    }

    /// Save a remote wallpaper into the wallpapers directory as `<id>.<ext>`
    ///
    /// A file already there under that name is reused rather than fetched
    /// again.
    pub async fn download_wallpaper(&self, wallpaper: &RemoteDescriptor) -> Result<PathBuf> {
        let dest = self
            .config
            .local_wallpapers_dir
            .join(wallpaper.download_file_name());
        if tokio::fs::try_exists(&dest).await? {
            debug!(id = %wallpaper.id, dest = %dest.display(), "Wallpaper already downloaded");
            return Ok(dest);
        }

        let size = self.pipeline.download(&wallpaper.full_url, &dest).await?;
        info!(id = %wallpaper.id, dest = %dest.display(), size, "Downloaded wallpaper");
        Ok(dest)
    }

    /// Move a local wallpaper to the trash and drop its cached thumbnail
    pub async fn trash_local(&self, path: &Path) -> Result<bool> {
        // thumbnails may be cached under the real path as well
        let real = tokio::fs::canonicalize(path).await.ok();
        let moved = localfs::move_to_trash(path).await?;
        if moved {
            let store = self.pipeline.store();
            store
                .delete(&Locator::Local(path.to_path_buf()).cache_key())
                .await?;
            if let Some(real) = real.filter(|real| real != path) {
                store.delete(&Locator::Local(real).cache_key()).await?;
            }
            self.favorites.remove(&path.display().to_string()).await?;
        }
        Ok(moved)
    }

    pub async fn stats(&self) -> PipelineStats {
        self.pipeline.stats().await
    }

    /// Fail pending fetches and stop background work
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        info!("Core context shut down");
    }
}
