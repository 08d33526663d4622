//! Core of the wallpaper picker: thumbnail caching, fetching and local scanning
//!
//! - [`FetchPipeline`] serves blobs from the on-disk [`blob_store::ContentStore`]
//!   and fetches misses from a [`RemoteSource`] or the local filesystem, one
//!   transfer per key however many callers ask, under a concurrency limit, a
//!   45-per-minute rate limit and bounded retries.
//! - [`scanner`] walks wallpaper directories lazily.
//! - [`CoreContext`] ties the pieces together for one process and
//!   [`CoreRuntime`] runs it on a dedicated thread, handing results back over a
//!   queue.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wallpicker_core::{CoreConfig, CoreContext, Locator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = CoreContext::init_with_wallhaven(CoreConfig::default().with_env()).await?;
//!
//! let thumb = Locator::Remote("https://th.wallhaven.cc/small/94/94x38z.jpg".to_string());
//! let outcome = context.fetch(&thumb, Some(Duration::from_secs(10))).await?;
//! println!("{} bytes ({:?})", outcome.blob.len(), outcome.cache);
//!
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod favorites;
pub mod inflight;
pub mod localfs;
pub mod pipeline;
pub mod retry;
pub mod runtime;
pub mod scanner;
pub mod source;
pub mod throttle;

pub use config::{CoreConfig, Preferences};
pub use context::CoreContext;
pub use descriptor::{LocalDescriptor, Locator, RemoteDescriptor, Resolution, WallpaperDescriptor};
pub use error::{CoreError, FetchError, Result};
pub use favorites::{Favorite, FavoritesStore};
pub use inflight::InFlightRegistry;
pub use pipeline::{CacheStatus, FetchOutcome, FetchPipeline, PipelineSettings, PipelineStats};
pub use retry::RetryPolicy;
pub use runtime::{Completion, CoreRuntime, Request, Response, Ticket};
pub use scanner::{scan, DirectoryScanner, FileDescriptor, ScanPage, SUPPORTED_EXTENSIONS};
pub use source::{RemoteSource, SearchPage};
pub use throttle::RateLimiter;

pub use blob_store::{SweepReport, StoreStats};
pub use wallhaven_client::SearchQuery;
