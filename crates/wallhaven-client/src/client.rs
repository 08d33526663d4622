//! Wallhaven HTTP client

use crate::error::{Result, WallhavenError};
use crate::types::{SearchQuery, SearchResponse};
use bytes::Bytes;
use futures::StreamExt;
use moka::future::Cache;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://wallhaven.cc/api/v1";
const DEFAULT_USER_AGENT: &str = "wallpicker/1.0";
const SEARCH_CACHE_TTL_SECS: u64 = 300;

/// Client for the Wallhaven API
///
/// The client itself does not throttle; callers share one rate limiter across
/// every request they send to wallhaven.cc.
pub struct WallhavenClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    search_cache: Cache<String, SearchResponse>,
}

impl WallhavenClient {
    /// Create a client against the public API (30 second timeout)
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Create a client against a custom API root
    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Self {
        Self::with_timeout(base_url, api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        let search_cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(Duration::from_secs(SEARCH_CACHE_TTL_SECS))
            .build();

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            search_cache,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, url = %url, "Wallhaven request failed");
            return Err(WallhavenError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Search wallpapers
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let url = format!("{}/search?{}", self.base_url, query.to_query_string());

        let cacheable = query.is_cacheable();
        if cacheable {
            if let Some(cached) = self.search_cache.get(&url).await {
                debug!(url = %url, "Search cache hit");
                return Ok(cached);
            }
        }

        debug!(url = %url, "Searching wallpapers");
        let body = self.send(&url).await?.bytes().await?;
        let page: SearchResponse = serde_json::from_slice(&body)?;

        debug!(results = page.data.len(), "Search completed");
        if cacheable {
            self.search_cache.insert(url, page.clone()).await;
        }
        Ok(page)
    }

    /// Search using one of the curated [`PRESETS`](crate::PRESETS)
    pub async fn search_preset(&self, name: &str, page: u32) -> Result<SearchResponse> {
        let query = SearchQuery::preset(name, page)?;
        self.search(&query).await
    }

    /// Fetch a thumbnail (or any image) into memory
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        debug!(url = %url, "Fetching image bytes");
        let data = self.send(url).await?.bytes().await?;
        debug!(url = %url, size = data.len(), "Fetched image bytes");
        Ok(data)
    }

    /// Stream a full-size image to `dest`, publishing it only once complete
    ///
    /// `progress` receives `(downloaded, total)` after every chunk; `total` is
    /// `None` when the server sends no content length. Returns the byte count.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        mut progress: impl FnMut(u64, Option<u64>),
    ) -> Result<u64> {
        let response = self.send(url).await?;
        let total = response.content_length();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = partial_path(dest);

        let written: Result<u64> = async {
            let mut file = tokio::fs::File::create(&part).await?;
            let mut downloaded = 0u64;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                progress(downloaded, total);
            }
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&part, dest).await?;
            Ok(downloaded)
        }
        .await;

        match written {
            Ok(downloaded) => {
                debug!(url = %url, dest = ?dest, size = downloaded, "Downloaded wallpaper");
                Ok(downloaded)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!(".{}.part", name))
}
