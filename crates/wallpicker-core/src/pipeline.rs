//! Fetch pipeline
//!
//! `fetch(key, source)` returns the blob for `key`, from the content store
//! when it is cached and fresh, otherwise by fetching `source` and writing
//! the result through to the store. Concurrent fetches of one key share a
//! single transfer (see [`InFlightRegistry`]). Remote transfers pass the rate
//! limiter, then take a concurrency slot, and each attempt is bounded by a
//! timeout; transient failures are retried with backoff.

use crate::config::CoreConfig;
use crate::descriptor::Locator;
use crate::error::{CoreError, FetchError};
use crate::inflight::{InFlightRegistry, Registration, TransferFuture};
use crate::retry::RetryPolicy;
use crate::source::RemoteSource;
use crate::throttle::RateLimiter;
use blob_store::{ContentStore, EvictionPolicy, StoreStats, SweepReport};
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Per-attempt bound for full-size downloads, which dwarf thumbnails
const DOWNLOAD_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// How a fetch was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from the content store
    Hit,
    /// This call started the transfer
    Miss,
    /// Attached to a transfer another caller started
    Joined,
}

impl CacheStatus {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheStatus::Hit)
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub blob: Bytes,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub store: StoreStats,
    pub in_flight: usize,
    /// Transfers started (one per miss, however many attempts it took)
    pub transfers: u64,
    /// Individual remote attempts
    pub attempts: u64,
    pub sweeps: u64,
    /// Remote requests counted against the rate limit right now
    pub rate_window_used: usize,
    pub rate_limit: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub rate_limit_per_minute: u32,
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
    pub eviction: EvictionPolicy,
    pub sweep_every_n_puts: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&CoreConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            concurrency: config.fetch_concurrency,
            rate_limit_per_minute: config.rate_limit_per_minute,
            retry: config.retry_policy(),
            attempt_timeout: config.attempt_timeout(),
            eviction: config.eviction_policy(),
            sweep_every_n_puts: config.sweep_every_n_puts,
        }
    }
}

/// Runs eviction sweeps after puts
///
/// A sweep is requested after every `every_n_puts` puts. At most one sweep
/// runs at a time and at most one more waits behind it; further requests fold
/// into the waiting one, which protects the most recently admitted key.
pub struct SweepScheduler {
    policy: EvictionPolicy,
    every_n_puts: u64,
    puts: AtomicU64,
    running: tokio::sync::Mutex<()>,
    queued: AtomicBool,
    latest_admitted: Mutex<Option<String>>,
    requested: AtomicU64,
    settled: AtomicU64,
    completed: AtomicU64,
}

impl SweepScheduler {
    pub fn new(policy: EvictionPolicy, every_n_puts: u64) -> Self {
        Self {
            policy,
            every_n_puts: every_n_puts.max(1),
            puts: AtomicU64::new(0),
            running: tokio::sync::Mutex::new(()),
            queued: AtomicBool::new(false),
            latest_admitted: Mutex::new(None),
            requested: AtomicU64::new(0),
            settled: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Record a put and start a background sweep if one is due
    pub fn after_put(
        self: &Arc<Self>,
        store: Arc<ContentStore>,
        admitted_key: &str,
        tracker: &TaskTracker,
    ) {
        *self.latest_admitted.lock() = Some(admitted_key.to_string());
        let puts = self.puts.fetch_add(1, Ordering::Relaxed) + 1;
        if puts % self.every_n_puts != 0 {
            return;
        }

        self.requested.fetch_add(1, Ordering::SeqCst);
        let scheduler = Arc::clone(self);
        tracker.spawn(async move {
            scheduler.run_queued(&store).await;
            scheduler.settled.fetch_add(1, Ordering::SeqCst);
        });
    }

    async fn run_queued(&self, store: &ContentStore) {
        if self.queued.swap(true, Ordering::SeqCst) {
            debug!("Sweep already queued");
            return;
        }
        let _running = self.running.lock().await;
        self.queued.store(false, Ordering::SeqCst);

        let admitted = self.latest_admitted.lock().clone();
        let result = match admitted.as_deref() {
            Some(key) => self.policy.sweep_after_put(store, key).await,
            None => self.policy.sweep(store).await,
        };
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = result {
            warn!(error = %e, "Background sweep failed");
        }
    }

    /// Full sweep now, waiting for any running sweep first
    pub async fn sweep_now(&self, store: &ContentStore) -> blob_store::Result<SweepReport> {
        let _running = self.running.lock().await;
        let report = self.policy.sweep(store).await;
        self.completed.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Sweeps run so far, background and explicit
    pub fn sweeps(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Wait until every requested background sweep has finished or folded
    pub async fn settle(&self) {
        while self.settled.load(Ordering::SeqCst) < self.requested.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct PipelineInner {
    store: Arc<ContentStore>,
    remote: Arc<dyn RemoteSource>,
    limiter: RateLimiter,
    slots: Semaphore,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    registry: Arc<InFlightRegistry>,
    sweeper: Arc<SweepScheduler>,
    background: TaskTracker,
    shutdown: CancellationToken,
    transfers: AtomicU64,
    attempts: AtomicU64,
}

/// Cheap to clone; clones share one pipeline
#[derive(Clone)]
pub struct FetchPipeline {
    inner: Arc<PipelineInner>,
}

impl FetchPipeline {
    pub fn new(
        store: Arc<ContentStore>,
        remote: Arc<dyn RemoteSource>,
        settings: PipelineSettings,
    ) -> Self {
        info!(
            concurrency = settings.concurrency,
            rate_limit_per_minute = settings.rate_limit_per_minute,
            attempts = settings.retry.max_attempts,
            "Fetch pipeline ready"
        );
        Self {
            inner: Arc::new(PipelineInner {
                store,
                remote,
                limiter: RateLimiter::per_minute(settings.rate_limit_per_minute),
                slots: Semaphore::new(settings.concurrency.max(1)),
                retry: settings.retry,
                attempt_timeout: settings.attempt_timeout,
                registry: Arc::new(InFlightRegistry::new()),
                sweeper: Arc::new(SweepScheduler::new(
                    settings.eviction,
                    settings.sweep_every_n_puts,
                )),
                background: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                transfers: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.inner.store
    }

    pub fn remote(&self) -> &Arc<dyn RemoteSource> {
        &self.inner.remote
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.inner.registry
    }

    pub fn sweeper(&self) -> &SweepScheduler {
        &self.inner.sweeper
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fetch `source`, cached under its derived key
    pub async fn fetch_locator(
        &self,
        source: &Locator,
        timeout: Option<Duration>,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch(&source.cache_key(), source, timeout).await
    }

    /// Blob for `key`, fetching `source` on a miss
    ///
    /// `timeout` bounds only this caller's wait, including time spent queued
    /// behind the rate limiter. Giving up does not cancel a transfer that
    /// other callers are still waiting on.
    pub async fn fetch(
        &self,
        key: &str,
        source: &Locator,
        timeout: Option<Duration>,
    ) -> Result<FetchOutcome, FetchError> {
        if self.is_shut_down() {
            return Err(FetchError::Shutdown);
        }

        if let Some(blob) = self.inner.store.get(key).await {
            return Ok(FetchOutcome {
                blob,
                cache: CacheStatus::Hit,
            });
        }

        let (transfer, joined) = self.inner.registry.join_or_start(key, |registration| {
            self.start_transfer(key.to_string(), source.clone(), registration)
        });
        if joined {
            debug!(key, "Joined in-flight fetch");
        }

        let blob = match timeout {
            Some(limit) => tokio::time::timeout(limit, transfer)
                .await
                .map_err(|_| FetchError::Timeout(limit))??,
            None => transfer.await?,
        };

        Ok(FetchOutcome {
            blob,
            cache: if joined {
                CacheStatus::Joined
            } else {
                CacheStatus::Miss
            },
        })
    }

    /// Cached and fresh, without fetching or counting an access
    pub async fn peek(&self, key: &str) -> bool {
        self.inner.store.peek(key).await
    }

    pub async fn peek_locator(&self, source: &Locator) -> bool {
        self.peek(&source.cache_key()).await
    }

    /// Stream a full-size remote image to `dest`, outside the content store
    ///
    /// Shares the rate limit, concurrency slots and retry policy with fetches.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        if self.is_shut_down() {
            return Err(FetchError::Shutdown);
        }
        let inner = &self.inner;
        tokio::select! {
            _ = inner.shutdown.cancelled() => Err(FetchError::Shutdown),
            result = inner.throttled(url, DOWNLOAD_ATTEMPT_TIMEOUT, || {
                inner.remote.download(url, dest)
            }) => result,
        }
    }

    /// Full expiry and size sweep right now
    pub async fn evict_now(&self) -> Result<SweepReport, CoreError> {
        Ok(self.inner.sweeper.sweep_now(&self.inner.store).await?)
    }

    pub async fn stats(&self) -> PipelineStats {
        PipelineStats {
            store: self.inner.store.stats().await,
            in_flight: self.inner.registry.len(),
            transfers: self.inner.transfers.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            sweeps: self.inner.sweeper.sweeps(),
            rate_window_used: self.inner.limiter.in_window().await,
            rate_limit: self.inner.limiter.max_requests(),
        }
    }

    /// Stop accepting fetches and fail pending ones with [`FetchError::Shutdown`]
    ///
    /// Waits for background sweeps to finish.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!(
            in_flight = self.inner.registry.len(),
            "Shutting down fetch pipeline"
        );
        self.inner.shutdown.cancel();
        self.inner.slots.close();
        self.inner.registry.clear();
        self.inner.background.close();
        self.inner.background.wait().await;
    }

    fn start_transfer(
        &self,
        key: String,
        source: Locator,
        registration: Registration,
    ) -> TransferFuture {
        let inner = Arc::clone(&self.inner);
        async move {
            let _registration = registration;
            tokio::select! {
                _ = inner.shutdown.cancelled() => Err(FetchError::Shutdown),
                result = inner.transfer(&key, &source) => result,
            }
        }
        .boxed()
    }
}

impl PipelineInner {
    async fn transfer(&self, key: &str, source: &Locator) -> Result<Bytes, FetchError> {
        // a transfer that finished just before ours was registered
        if self.store.peek(key).await {
            if let Some(blob) = self.store.get(key).await {
                return Ok(blob);
            }
        }

        self.transfers.fetch_add(1, Ordering::Relaxed);
        let blob = match source {
            Locator::Remote(url) => self.fetch_remote(url).await?,
            Locator::Local(path) => self.read_local(path).await?,
        };

        self.store.put(key, &blob).await.map_err(|e| {
            warn!(key, error = %e, "Failed to store fetched blob");
            FetchError::from(e)
        })?;
        debug!(key, size = blob.len(), source = %source, "Stored fetched blob");

        self.sweeper
            .after_put(Arc::clone(&self.store), key, &self.background);
        Ok(blob)
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes, FetchError> {
        self.throttled(url, self.attempt_timeout, || self.remote.fetch_bytes(url)).await
    }

    /// Run `call` under the rate limiter and a concurrency slot, bounding each
    /// attempt by `attempt_timeout` and retrying transient failures
    async fn throttled<T, F, Fut>(
        &self,
        url: &str,
        attempt_timeout: Duration,
        call: F,
    ) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.retry
            .run(url, |attempt| {
                let call = &call;
                async move {
                    self.limiter.acquire().await;
                    let _slot = self
                        .slots
                        .acquire()
                        .await
                        .map_err(|_| FetchError::Shutdown)?;

                    self.attempts.fetch_add(1, Ordering::Relaxed);
                    debug!(url, attempt, "Remote request");

                    match tokio::time::timeout(attempt_timeout, call()).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::transient(format!(
                            "attempt timed out after {}ms",
                            attempt_timeout.as_millis()
                        ))),
                    }
                }
            })
            .await
    }

    /// Local sources skip the rate limiter but still take a slot; one retry
    async fn read_local(&self, path: &Path) -> Result<Bytes, FetchError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| FetchError::Shutdown)?;

        let read = match tokio::fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(e),
            Err(first) => {
                debug!(path = %path.display(), error = %first, "Retrying local read");
                tokio::fs::read(path).await
            }
        };

        match read {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::permanent(
                format!("Local file not found: {}", path.display()),
            )),
            Err(e) => Err(FetchError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
