//! Error types for the Wallhaven client

use std::fmt;

/// Errors that can occur when talking to the Wallhaven API
#[derive(Debug)]
pub enum WallhavenError {
    /// Transport-level failure (connect, timeout, body read)
    Http(Box<reqwest::Error>),
    /// The server answered with a non-2xx status
    Status { status: u16, url: String },
    /// The response body was not the JSON we expected
    Json(String),
    /// Writing a download to disk failed
    Io(Box<std::io::Error>),
    UnknownPreset(String),
}

impl WallhavenError {
    /// HTTP status code, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for WallhavenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "Wallhaven HTTP error: {}", err),
            Self::Status { status, url } => {
                write!(f, "Wallhaven returned status {} for {}", status, url)
            }
            Self::Json(msg) => write!(f, "Wallhaven JSON parse error: {}", msg),
            Self::Io(err) => write!(f, "Download I/O error: {}", err),
            Self::UnknownPreset(name) => write!(f, "Unknown preset: {}", name),
        }
    }
}

impl std::error::Error for WallhavenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err.as_ref()),
            Self::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WallhavenError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Box::new(err))
    }
}

impl From<serde_json::Error> for WallhavenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<std::io::Error> for WallhavenError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Box::new(err))
    }
}

/// Result type for Wallhaven API operations
pub type Result<T> = std::result::Result<T, WallhavenError>;
