//! Error types for sprite-pipeline
//!
//! Two layers of errors exist:
//! - [`Error`] is returned by phase entry points and is only produced for conditions that
//!   abort a whole phase (invalid configuration, unusable directories).
//! - [`FetchError`] and [`TransformError`] describe a single failed item. They are logged,
//!   counted in the phase report and never propagated out of a coordinator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sprite-pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sprite-pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.count")
        key: Option<String>,
    },

    /// A phase's destination directory could not be created
    #[error("failed to create destination directory {path}: {source}")]
    DestinationDir {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The transform phase's source directory could not be listed
    #[error("failed to read source directory {path}: {source}")]
    SourceDir {
        /// Directory that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failure of a single fetch task
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (connect, timeout, body read)
    #[error("transport error fetching {url}: {source}")]
    Transport {
        /// URL that was requested
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// URL that was requested
        url: String,
        /// HTTP status code returned
        status: u16,
    },

    /// Response body could not be written to disk
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Any other source-specific failure (used by alternative [`ImageSource`] implementations)
    ///
    /// [`ImageSource`]: crate::fetch::ImageSource
    #[error("{0}")]
    Other(String),
}

/// Failure of a single transform task
#[derive(Debug, Error)]
pub enum TransformError {
    /// Source file is missing, truncated, or not a supported image
    #[error("failed to decode {path}: {source}")]
    Decode {
        /// Source file
        path: PathBuf,
        /// Underlying image error
        #[source]
        source: image::ImageError,
    },

    /// Transformed image could not be encoded or saved
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Destination file
        path: PathBuf,
        /// Underlying image error
        #[source]
        source: image::ImageError,
    },

    /// Filesystem failure while reading or writing
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The blocking worker running the chain panicked
    #[error("transform worker panicked: {0}")]
    WorkerPanicked(String),
}
