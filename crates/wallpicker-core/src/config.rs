//! Configuration
//!
//! Two layers: the user's persisted [`Preferences`] (a small JSON file shared
//! with the desktop app) and the process-wide [`CoreConfig`], built once at
//! startup from preferences plus environment overrides and never mutated
//! afterwards.

use crate::error::{CoreError, Result};
use crate::favorites::FavoritesStore;
use crate::localfs;
use crate::retry::RetryPolicy;
use blob_store::{EvictionPolicy, DEFAULT_SIZE_BUDGET};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// User preferences persisted at `~/.config/wallpicker/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preferences {
    pub local_wallpapers_dir: Option<PathBuf>,
    pub wallhaven_api_key: Option<String>,
    pub notifications_enabled: bool,
    pub upscaler_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            local_wallpapers_dir: None,
            wallhaven_api_key: None,
            notifications_enabled: true,
            upscaler_enabled: false,
        }
    }
}

impl Preferences {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wallpicker").join("config.json"))
    }

    /// Lenient conversion: missing or wrongly typed fields keep their defaults
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        Self {
            local_wallpapers_dir: value
                .get("local_wallpapers_dir")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            wallhaven_api_key: value
                .get("wallhaven_api_key")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            notifications_enabled: value
                .get("notifications_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.notifications_enabled),
            upscaler_enabled: value
                .get("upscaler_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.upscaler_enabled),
        }
    }

    /// Load from `path`, writing a default file first if there is none
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            let defaults = Self::default();
            defaults.save(path).await?;
            info!(path = %path.display(), "Created default preferences");
            return Ok(defaults);
        }

        let raw = tokio::fs::read(path).await?;
        let value: Value = serde_json::from_slice(&raw)?;
        Ok(Self::from_value(&value))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        localfs::write_bytes(path, &json).await
    }

    /// A configured wallpapers directory must exist and be a directory
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.local_wallpapers_dir {
            if !dir.exists() {
                return Err(CoreError::Config(format!(
                    "Directory does not exist: {}",
                    dir.display()
                )));
            }
            if !dir.is_dir() {
                return Err(CoreError::Config(format!(
                    "Path is not a directory: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// The configured wallpapers directory, or the user's Pictures folder
    pub fn pictures_dir(&self) -> PathBuf {
        self.local_wallpapers_dir.clone().unwrap_or_else(|| {
            dirs::picture_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Pictures")))
                .unwrap_or_else(|| PathBuf::from("Pictures"))
        })
    }
}

/// Settings for the cache, fetch pipeline and scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub cache_dir: PathBuf,
    pub cache_size_budget_bytes: u64,
    pub cache_ttl_seconds: u64,
    pub fetch_concurrency: usize,
    /// Zero disables the rate limit
    pub rate_limit_per_minute: u32,
    pub fetch_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub scan_workers: usize,
    pub sweep_every_n_puts: u64,
    pub local_wallpapers_dir: PathBuf,
    pub favorites_file: PathBuf,
    pub wallhaven_api_key: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("wallpicker")
                .join("thumbnails"),
            cache_size_budget_bytes: DEFAULT_SIZE_BUDGET,
            cache_ttl_seconds: 7 * 24 * 60 * 60,
            fetch_concurrency: 8,
            rate_limit_per_minute: 45,
            fetch_attempts: 3,
            attempt_timeout_secs: 30,
            scan_workers: 4,
            sweep_every_n_puts: 1,
            local_wallpapers_dir: Preferences::default().pictures_dir(),
            favorites_file: FavoritesStore::default_path()
                .unwrap_or_else(|| PathBuf::from("favorites.json")),
            wallhaven_api_key: None,
        }
    }
}

impl CoreConfig {
    pub fn from_preferences(preferences: &Preferences) -> Self {
        Self {
            local_wallpapers_dir: preferences.pictures_dir(),
            wallhaven_api_key: preferences.wallhaven_api_key.clone(),
            ..Self::default()
        }
    }

    /// Apply `WALLPICKER_*` and `WALLHAVEN_API_KEY` overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup; unparsable values are ignored
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("WALLPICKER_CACHE_DIR").filter(|s| !s.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("WALLPICKER_CACHE_MAX_BYTES").and_then(|s| s.parse().ok()) {
            self.cache_size_budget_bytes = v;
        }
        if let Some(v) = lookup("WALLPICKER_CACHE_TTL_SECS").and_then(|s| s.parse().ok()) {
            self.cache_ttl_seconds = v;
        }
        if let Some(v) = lookup("WALLPICKER_FETCH_CONCURRENCY").and_then(|s| s.parse().ok()) {
            self.fetch_concurrency = v;
        }
        if let Some(v) = lookup("WALLPICKER_RATE_LIMIT_PER_MINUTE").and_then(|s| s.parse().ok()) {
            self.rate_limit_per_minute = v;
        }
        if let Some(key) = lookup("WALLHAVEN_API_KEY").filter(|s| !s.is_empty()) {
            self.wallhaven_api_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_concurrency == 0 {
            return Err(CoreError::Config(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.scan_workers == 0 {
            return Err(CoreError::Config(
                "scan_workers must be at least 1".to_string(),
            ));
        }
        if self.sweep_every_n_puts == 0 {
            return Err(CoreError::Config(
                "sweep_every_n_puts must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(CoreError::Config(
                "attempt_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.ttl(), self.cache_size_budget_bytes)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_attempts(self.fetch_attempts)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}
