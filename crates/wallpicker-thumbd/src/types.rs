//! Request and response types for the thumbnail service

use serde::{Deserialize, Serialize};
use wallpicker_core::PipelineStats;

/// Port used when `PORT` is unset or unparsable
pub const DEFAULT_PORT: u16 = 3010;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: PipelineStats,
}

/// `GET /thumb`
#[derive(Debug, Deserialize)]
pub struct ThumbQuery {
    /// `http(s)://` URL, `file://` URL or absolute path
    pub url: String,
    pub timeout_ms: Option<u64>,
}

/// `GET /local`
#[derive(Debug, Deserialize)]
pub struct LocalQuery {
    pub root: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

impl LocalQuery {
    pub const DEFAULT_LIMIT: usize = 48;
}

/// `GET /search`, either free text or a named preset
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub preset: Option<String>,
    pub page: Option<u32>,
}

/// Content type guessed from the file extension of a URL or path
pub fn content_type_for(location: &str) -> &'static str {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
