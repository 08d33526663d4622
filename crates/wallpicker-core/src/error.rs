//! Error types for the wallpaper core

use std::fmt;
use std::time::Duration;

/// Failure of a single `fetch`, shared by every waiter on the same key
///
/// Cloneable so one resolved result can be handed to all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Disk I/O failure reading a local source or writing the store
    Storage(String),
    /// Worth retrying: connection reset, timeout, 5xx, 429
    Transient {
        message: String,
        status: Option<u16>,
    },
    /// Not worth retrying: other 4xx, malformed payload
    Permanent {
        message: String,
        status: Option<u16>,
    },
    /// The caller's own deadline passed before the fetch resolved
    Timeout(Duration),
    /// The pipeline was shut down
    Shutdown,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            status: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            status: None,
        }
    }

    /// Classify an HTTP status: 429 and 5xx are transient, the rest permanent
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || (500..600).contains(&status) {
            Self::Transient {
                message,
                status: Some(status),
            }
        } else {
            Self::Permanent {
                message,
                status: Some(status),
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Transient { message, .. } => write!(f, "Temporary fetch failure: {}", message),
            Self::Permanent { message, .. } => write!(f, "Fetch failed: {}", message),
            Self::Timeout(after) => write!(f, "Fetch timed out after {}ms", after.as_millis()),
            Self::Shutdown => write!(f, "Fetch pipeline is shut down"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<blob_store::StoreError> for FetchError {
    fn from(err: blob_store::StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<wallhaven_client::WallhavenError> for FetchError {
    fn from(err: wallhaven_client::WallhavenError) -> Self {
        use wallhaven_client::WallhavenError;

        let message = err.to_string();
        match &err {
            WallhavenError::Status { status, .. } => Self::from_status(*status, message),
            WallhavenError::Http(inner) => match inner.status() {
                Some(status) => Self::from_status(status.as_u16(), message),
                None if inner.is_decode() || inner.is_builder() => Self::permanent(message),
                // connect, timeout, reset mid-body
                None => Self::transient(message),
            },
            WallhavenError::Json(_) | WallhavenError::UnknownPreset(_) => Self::permanent(message),
            WallhavenError::Io(_) => Self::Storage(message),
        }
    }
}

/// Errors from the non-fetch parts of the core: config, favorites, filesystem
#[derive(Debug)]
pub enum CoreError {
    Config(String),
    Io(Box<std::io::Error>),
    Json(String),
    Store(blob_store::StoreError),
    Fetch(FetchError),
    Trash(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Json(msg) => write!(f, "JSON error: {}", msg),
            Self::Store(err) => write!(f, "Store error: {}", err),
            Self::Fetch(err) => write!(f, "{}", err),
            Self::Trash(msg) => write!(f, "Failed to move to trash: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err.as_ref()),
            Self::Store(err) => Some(err),
            Self::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<blob_store::StoreError> for CoreError {
    fn from(err: blob_store::StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<FetchError> for CoreError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err)
    }
}

impl From<trash::Error> for CoreError {
    fn from(err: trash::Error) -> Self {
        Self::Trash(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use wallhaven_client::WallhavenError;

    #[test]
    fn test_status_classification() {
        assert!(FetchError::from_status(429, "slow down").is_transient());
        assert!(FetchError::from_status(503, "unavailable").is_transient());
        assert!(!FetchError::from_status(404, "missing").is_transient());
        assert!(!FetchError::from_status(401, "unauthorized").is_transient());
        assert!(!FetchError::from_status(403, "forbidden").is_transient());
        assert_eq!(FetchError::from_status(404, "missing").status(), Some(404));
    }

    #[test]
    fn test_wallhaven_error_classification() {
        let err: FetchError = WallhavenError::Status {
            status: 502,
            url: "https://th.wallhaven.cc/x.jpg".to_string(),
        }
        .into();
        assert!(err.is_transient());

        let err: FetchError = WallhavenError::Json("expected value".to_string()).into();
        assert!(matches!(err, FetchError::Permanent { .. }));

        let err: FetchError = WallhavenError::UnknownPreset("Nope".to_string()).into();
        assert!(matches!(err, FetchError::Permanent { .. }));
    }

    #[test]
    fn test_fetch_error_display() {
        assert_eq!(
            format!("{}", FetchError::Timeout(Duration::from_millis(1500))),
            "Fetch timed out after 1500ms"
        );
        assert_eq!(
            format!("{}", FetchError::Shutdown),
            "Fetch pipeline is shut down"
        );
        assert_eq!(
            format!("{}", FetchError::permanent("HTTP 404")),
            "Fetch failed: HTTP 404"
        );
    }

    #[test]
    fn test_core_error_display() {
        let err = CoreError::Config("Directory does not exist: /nope".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: Directory does not exist: /nope"
        );
    }

    #[test]
    fn test_store_error_becomes_storage_failure() {
        let err: FetchError = blob_store::StoreError::InvalidKey("a/b".to_string()).into();
        assert!(matches!(err, FetchError::Storage(_)));
        assert!(!err.is_transient());
    }
}
