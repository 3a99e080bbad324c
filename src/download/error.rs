//! Error taxonomy for the Downloader's streaming-transfer loop.

use std::path::PathBuf;

use thiserror::Error;

/// Errors a single file transfer can end in. Extends the HTTP Executor's
/// taxonomy (`crate::api::ApiError`) with the filesystem and integrity
/// failures a streaming write introduces.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS, etc.)
    /// that survived retries.
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The per-transfer timeout elapsed before the body finished streaming.
    #[error("timeout downloading {url}")]
    Timeout { url: String },

    /// A non-retryable or retry-exhausted HTTP status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// Filesystem error creating directories, opening the `.part` file, or
    /// renaming it into place.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transferred bytes' BLAKE3 digest did not match `file.hashes.BLAKE3`.
    #[error("hash mismatch (expected {expected}, got {actual})")]
    HashMismatch { expected: String, actual: String },

    /// Cooperative cancellation fired mid-transfer.
    #[error("download of {url} was cancelled")]
    Cancelled { url: String },
}

impl DownloadError {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
