//! Rust client for the [Wallhaven](https://wallhaven.cc/help/api) wallpaper API
//!
//! Covers wallpaper search (with the curated presets used by the picker),
//! plain byte fetches for thumbnails, and streaming downloads of full-size
//! images straight to disk. Non-random search pages are cached in memory for a
//! few minutes with moka.
//!
//! # Example
//!
//! ```no_run
//! use wallhaven_client::{SearchQuery, WallhavenClient};
//!
//! # async fn example() -> Result<(), wallhaven_client::WallhavenError> {
//! let client = WallhavenClient::new(None);
//!
//! let page = client.search(&SearchQuery::new("mountain lake")).await?;
//! for wallpaper in &page.data {
//!     let thumb = client.fetch_bytes(&wallpaper.thumbs.small).await?;
//!     println!("{} ({} bytes)", wallpaper.id, thumb.len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::WallhavenClient;
pub use error::{Result, WallhavenError};
pub use types::{
    preset_names, ApiWallpaper, Preset, SearchMeta, SearchQuery, SearchResponse, Thumbs, PRESETS,
};
