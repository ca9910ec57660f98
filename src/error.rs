use std::fmt;

use crate::backend::BackendError;

/// Errors surfaced to the embedding application.
#[derive(Debug)]
pub enum AppError {
    Store(sqlite::Error),
    Backend(BackendError),
    Config(serde_json::Error),
    Logging(String),
    Io(std::io::Error),
    /// The search session task has stopped.
    SessionClosed,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Store(e) => write!(f, "Store error: {}", e),
            AppError::Backend(e) => write!(f, "Backend error: {}", e),
            AppError::Config(e) => write!(f, "Config error: {}", e),
            AppError::Logging(msg) => write!(f, "Logging error: {}", msg),
            AppError::Io(e) => write!(f, "I/O error: {}", e),
            AppError::SessionClosed => write!(f, "Search session closed"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlite::Error> for AppError {
    fn from(e: sqlite::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        AppError::Backend(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Config(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e)
    }
}

impl From<flexi_logger::FlexiLoggerError> for AppError {
    fn from(e: flexi_logger::FlexiLoggerError) -> Self {
        AppError::Logging(e.to_string())
    }
}

impl From<AppError> for String {
    fn from(e: AppError) -> Self {
        e.to_string()
    }
}
