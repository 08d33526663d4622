//! Error types for the thumbnail service

use std::fmt;

#[derive(Debug)]
pub enum ThumbdError {
    Core(wallpicker_core::CoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ThumbdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThumbdError::Core(err) => write!(f, "Core error: {}", err),
            ThumbdError::Io(err) => write!(f, "IO error: {}", err),
            ThumbdError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ThumbdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThumbdError::Core(err) => Some(err),
            ThumbdError::Io(err) => Some(err.as_ref()),
            ThumbdError::Config(_) => None,
        }
    }
}

impl From<wallpicker_core::CoreError> for ThumbdError {
    fn from(err: wallpicker_core::CoreError) -> Self {
        ThumbdError::Core(err)
    }
}

impl From<std::io::Error> for ThumbdError {
    fn from(err: std::io::Error) -> Self {
        ThumbdError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ThumbdError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ThumbdError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThumbdError>;
