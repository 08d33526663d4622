//! Wallpaper descriptors
//!
//! A wallpaper is either a search result from the remote API or a file in the
//! local wallpapers directory. Both expose the same small interface so the
//! pipeline and favorites never branch on optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use wallhaven_client::ApiWallpaper;

/// Pixel dimensions, written `WxH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Invalid resolution: {}", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid resolution width: {}", s))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid resolution height: {}", s))?;
        Ok(Self { width, height })
    }
}

impl Serialize for Resolution {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Where the bytes for a thumbnail or full image come from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum Locator {
    Remote(String),
    Local(PathBuf),
}

impl Locator {
    /// Stable identifier used to derive the cache key
    pub fn source_id(&self) -> String {
        match self {
            Locator::Remote(url) => url.clone(),
            Locator::Local(path) => format!("file://{}", path.display()),
        }
    }

    pub fn cache_key(&self) -> String {
        blob_store::cache_key(&self.source_id())
    }

    /// Parse a caller-supplied source: `http(s)://` URLs are remote,
    /// `file://` URLs and bare paths are local
    pub fn parse(source: &str) -> Option<Self> {
        if let Ok(parsed) = url::Url::parse(source) {
            return match parsed.scheme() {
                "http" | "https" => Some(Locator::Remote(source.to_string())),
                "file" => parsed.to_file_path().ok().map(Locator::Local),
                _ => None,
            };
        }
        let path = Path::new(source);
        if path.is_absolute() {
            Some(Locator::Local(path.to_path_buf()))
        } else {
            None
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Remote(url) => write!(f, "{}", url),
            Locator::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A wallpaper returned by a remote search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub id: String,
    pub page_url: String,
    pub full_url: String,
    pub thumbnail_url: String,
    pub resolution: Option<Resolution>,
    pub category: String,
    pub purity: String,
    pub colors: Vec<String>,
    pub file_size: u64,
    pub file_type: Option<String>,
    #[serde(default)]
    pub favorite: bool,
}

impl RemoteDescriptor {
    /// `<id>.<ext>`, the extension taken from the full-size URL
    pub fn download_file_name(&self) -> String {
        let id: String = self
            .id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let id = if id.is_empty() { "wallpaper".to_string() } else { id };

        let ext = self
            .full_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("jpg");

        format!("{}.{}", id, ext.to_ascii_lowercase())
    }
}

impl From<ApiWallpaper> for RemoteDescriptor {
    fn from(wallpaper: ApiWallpaper) -> Self {
        // small thumbs are cropped; large keeps the aspect ratio
        let thumbnail_url = [
            &wallpaper.thumbs.large,
            &wallpaper.thumbs.small,
            &wallpaper.thumbs.original,
        ]
        .into_iter()
        .find(|u| !u.is_empty())
        .cloned()
        .unwrap_or_else(|| wallpaper.path.clone());

        Self {
            resolution: wallpaper.resolution.parse().ok(),
            id: wallpaper.id,
            page_url: wallpaper.url,
            full_url: wallpaper.path,
            thumbnail_url,
            category: wallpaper.category,
            purity: wallpaper.purity,
            colors: wallpaper.colors,
            file_size: wallpaper.file_size,
            file_type: wallpaper.file_type,
            favorite: false,
        }
    }
}

/// A wallpaper file in the local directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDescriptor {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
}

impl LocalDescriptor {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum WallpaperDescriptor {
    Remote(RemoteDescriptor),
    Local(LocalDescriptor),
}

impl WallpaperDescriptor {
    /// Remote ids are the API's short ids; local ids are the absolute path
    pub fn id(&self) -> String {
        match self {
            WallpaperDescriptor::Remote(r) => r.id.clone(),
            WallpaperDescriptor::Local(l) => l.path.display().to_string(),
        }
    }

    /// Local files are their own thumbnail source
    pub fn thumbnail_locator(&self) -> Locator {
        match self {
            WallpaperDescriptor::Remote(r) => Locator::Remote(r.thumbnail_url.clone()),
            WallpaperDescriptor::Local(l) => Locator::Local(l.path.clone()),
        }
    }

    pub fn full_locator(&self) -> Locator {
        match self {
            WallpaperDescriptor::Remote(r) => Locator::Remote(r.full_url.clone()),
            WallpaperDescriptor::Local(l) => Locator::Local(l.path.clone()),
        }
    }

    pub fn is_favorite(&self) -> bool {
        match self {
            WallpaperDescriptor::Remote(r) => r.favorite,
            WallpaperDescriptor::Local(l) => l.favorite,
        }
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        match self {
            WallpaperDescriptor::Remote(r) => r.favorite = favorite,
            WallpaperDescriptor::Local(l) => l.favorite = favorite,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, WallpaperDescriptor::Local(_))
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            WallpaperDescriptor::Remote(r) => r.resolution,
            WallpaperDescriptor::Local(_) => None,
        }
    }

    /// Case-insensitive substring match; an empty query matches everything
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        match self {
            WallpaperDescriptor::Remote(r) => [&r.id, &r.category, &r.page_url, &r.full_url]
                .iter()
                .any(|field| field.to_lowercase().contains(&query)),
            WallpaperDescriptor::Local(l) => l.file_name().to_lowercase().contains(&query),
        }
    }
}

impl From<RemoteDescriptor> for WallpaperDescriptor {
    fn from(r: RemoteDescriptor) -> Self {
        WallpaperDescriptor::Remote(r)
    }
}

impl From<LocalDescriptor> for WallpaperDescriptor {
    fn from(l: LocalDescriptor) -> Self {
        WallpaperDescriptor::Local(l)
    }
}
