//! Request and response types for the Wallhaven API
//!
//! Response structs only carry the fields the picker reads; everything is
//! defaulted so a sparse or evolving payload still parses.

use crate::error::{Result, WallhavenError};
use serde::{Deserialize, Serialize};

/// Parameters for `GET /search`
///
/// `categories` and `purity` are the API's three-character bit strings
/// (general/anime/people and sfw/sketchy/nsfw).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub q: String,
    pub categories: String,
    pub purity: String,
    pub sorting: String,
    pub order: String,
    pub atleast: String,
    pub page: u32,
    /// Seed returned by a previous random search, to page through it stably
    pub seed: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            q: String::new(),
            categories: "111".to_string(),
            purity: "100".to_string(),
            sorting: "date_added".to_string(),
            order: "desc".to_string(),
            atleast: "1920x1080".to_string(),
            page: 1,
            seed: None,
        }
    }
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Build the query for a named preset; presets always sort randomly
    pub fn preset(name: &str, page: u32) -> Result<Self> {
        let preset = PRESETS
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| WallhavenError::UnknownPreset(name.to_string()))?;

        Ok(Self {
            q: preset.q.to_string(),
            categories: preset.categories.to_string(),
            purity: preset.purity.to_string(),
            sorting: "random".to_string(),
            ..Self::default()
        }
        .with_page(page))
    }

    /// Random ordering changes on every request, so its pages are never cached
    pub fn is_cacheable(&self) -> bool {
        self.sorting != "random" || self.seed.is_some()
    }

    /// Percent-encoded query string, without the leading `?`
    pub fn to_query_string(&self) -> String {
        let mut query = format!(
            "q={}&categories={}&purity={}&sorting={}&order={}&atleast={}&page={}",
            urlencoding::encode(&self.q),
            urlencoding::encode(&self.categories),
            urlencoding::encode(&self.purity),
            urlencoding::encode(&self.sorting),
            urlencoding::encode(&self.order),
            urlencoding::encode(&self.atleast),
            self.page
        );
        if let Some(seed) = &self.seed {
            query.push_str(&format!("&seed={}", urlencoding::encode(seed)));
        }
        query
    }
}

/// A curated search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub q: &'static str,
    pub categories: &'static str,
    pub purity: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "General Landscape",
        q: "landscape dark",
        categories: "100",
        purity: "100",
    },
    Preset {
        name: "Anime Scenery",
        q: "scenery dark",
        categories: "010",
        purity: "100",
    },
    Preset {
        name: "Nature",
        q: "nature",
        categories: "100",
        purity: "100",
    },
    Preset {
        name: "Architecture",
        q: "architecture",
        categories: "100",
        purity: "100",
    },
    Preset {
        name: "Cyberpunk",
        q: "cyberpunk",
        categories: "100",
        purity: "100",
    },
    Preset {
        name: "Space",
        q: "space",
        categories: "100",
        purity: "100",
    },
    Preset {
        name: "Forest",
        q: "forest",
        categories: "100",
        purity: "100",
    },
    Preset {
        name: "Mountain",
        q: "mountain",
        categories: "100",
        purity: "100",
    },
];

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

/// Response from `GET /search`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<ApiWallpaper>,
    #[serde(default)]
    pub meta: Option<SearchMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub last_page: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub seed: Option<String>,
}

/// A wallpaper as listed by the search endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiWallpaper {
    pub id: String,
    /// Page on wallhaven.cc
    #[serde(default)]
    pub url: String,
    /// Direct link to the full-size image
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub thumbs: Thumbs,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub purity: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thumbs {
    #[serde(default)]
    pub large: String,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub small: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_string() {
        let query = SearchQuery::new("dark forest").with_page(2);
        assert_eq!(
            query.to_query_string(),
            "q=dark%20forest&categories=111&purity=100&sorting=date_added&order=desc&atleast=1920x1080&page=2"
        );
    }

    #[test]
    fn test_page_is_at_least_one() {
        assert_eq!(SearchQuery::default().with_page(0).page, 1);
    }

    #[test]
    fn test_preset_query() {
        let query = SearchQuery::preset("Anime Scenery", 3).unwrap();
        assert_eq!(query.q, "scenery dark");
        assert_eq!(query.categories, "010");
        assert_eq!(query.sorting, "random");
        assert_eq!(query.page, 3);
        assert!(!query.is_cacheable());
    }

    #[test]
    fn test_unknown_preset() {
        let err = SearchQuery::preset("Underwater", 1).unwrap_err();
        assert!(matches!(err, WallhavenError::UnknownPreset(name) if name == "Underwater"));
    }

    #[test]
    fn test_seeded_random_query_is_cacheable() {
        let mut query = SearchQuery::preset("Space", 2).unwrap();
        query.seed = Some("abc123".to_string());
        assert!(query.is_cacheable());
        assert!(query.to_query_string().ends_with("&seed=abc123"));
    }

    #[test]
    fn test_preset_names() {
        let names = preset_names();
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], "General Landscape");
        assert!(names.contains(&"Mountain"));
    }

    #[test]
    fn test_search_response_deserialization() {
        let json = r##"{
            "data": [
                {
                    "id": "94x38z",
                    "url": "https://wallhaven.cc/w/94x38z",
                    "short_url": "https://whvn.cc/94x38z",
                    "views": 12,
                    "purity": "sfw",
                    "category": "anime",
                    "resolution": "6742x3534",
                    "file_size": 5070446,
                    "file_type": "image/jpeg",
                    "colors": ["#000000", "#abbcda"],
                    "path": "https://w.wallhaven.cc/full/94/wallhaven-94x38z.jpg",
                    "thumbs": {
                        "large": "https://th.wallhaven.cc/lg/94/94x38z.jpg",
                        "original": "https://th.wallhaven.cc/orig/94/94x38z.jpg",
                        "small": "https://th.wallhaven.cc/small/94/94x38z.jpg"
                    }
                }
            ],
            "meta": {"current_page": 1, "last_page": 10, "per_page": "24", "total": 240, "query": null, "seed": null}
        }"##;

        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 1);
        let wallpaper = &response.data[0];
        assert_eq!(wallpaper.id, "94x38z");
        assert_eq!(wallpaper.file_size, 5_070_446);
        assert_eq!(
            wallpaper.thumbs.small,
            "https://th.wallhaven.cc/small/94/94x38z.jpg"
        );
        let meta = response.meta.unwrap();
        assert_eq!(meta.last_page, 10);
        assert!(meta.seed.is_none());
    }
}
