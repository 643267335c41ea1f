//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The registry refused to admit another watcher for this path.
    #[error("too many watchers for {path}: {count} requests, {distinct} distinct paths")]
    AdmissionDenied {
        path: PathBuf,
        count: usize,
        distinct: usize,
    },

    /// Could not create or attach a notification subscription.
    #[error("cannot subscribe to {path}: {source}")]
    Subscribe {
        path: PathBuf,
        #[source]
        source: Box<WatcherError>,
    },

    /// The subscription's error stream closed underneath a running watcher.
    #[error("notification stream broken for: {0}")]
    StreamBroken(PathBuf),

    /// Invalid match pattern.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WatcherError {
    /// Wrap an error raised while establishing a subscription.
    pub fn subscribe(path: impl Into<PathBuf>, source: impl Into<WatcherError>) -> Self {
        Self::Subscribe {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }

    /// Whether this error means the watch tree can no longer be trusted.
    ///
    /// Only subscription failures qualify; everything else is local to the
    /// watcher that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Subscribe { .. })
    }
}
