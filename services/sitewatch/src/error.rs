//! Error types for the sitewatch watchdog

use std::path::PathBuf;

/// Errors that can surface from a health check run
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("unsupported config format for {0} (JSON is the only supported format)")]
    UnsupportedConfigFormat(PathBuf),

    #[error("invalid JSON in config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("site not found in config: {0}")]
    UnknownSite(String),

    #[error("fetch failed after {attempts} attempts: {message}")]
    FetchFailed { attempts: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for watchdog operations
pub type Result<T> = std::result::Result<T, WatchError>;
