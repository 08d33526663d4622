//! Remote source capability
//!
//! The pipeline only needs two things from the image-search service: a list of
//! descriptors for a query and the bytes behind a URL. Errors come back already
//! classified so the retry loop can tell transient from permanent.

use crate::descriptor::RemoteDescriptor;
use crate::error::FetchError;
use crate::localfs;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use tracing::{debug, trace};
use wallhaven_client::{SearchQuery, WallhavenClient};

/// One page of remote search results
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SearchPage {
    pub wallpapers: Vec<RemoteDescriptor>,
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
    /// Seed for paging through a random ordering
    pub seed: Option<String>,
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, FetchError>;

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError>;

    /// Save the bytes behind `url` to `dest`, publishing the file only once
    /// complete; returns the byte count
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let data = self.fetch_bytes(url).await?;
        localfs::write_bytes(dest, &data)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        Ok(data.len() as u64)
    }
}

#[async_trait]
impl RemoteSource for WallhavenClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, FetchError> {
        let response = WallhavenClient::search(self, query).await?;
        let meta = response.meta.unwrap_or_default();
        debug!(
            q = %query.q,
            page = query.page,
            results = response.data.len(),
            "Remote search"
        );

        Ok(SearchPage {
            wallpapers: response
                .data
                .into_iter()
                .map(RemoteDescriptor::from)
                .collect(),
            current_page: meta.current_page.max(query.page),
            last_page: meta.last_page,
            total: meta.total,
            seed: meta.seed,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        Ok(WallhavenClient::fetch_bytes(self, url).await?)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let written = WallhavenClient::download(self, url, dest, |done, total| {
            trace!(url, done, total, "Download progress");
        })
        .await?;
        Ok(written)
    }
}
