//! Error types for the lazy file cache.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by [`LazyFile`](super::LazyFile) operations.
///
/// Sidecar problems never appear here: a missing or corrupt sidecar only
/// costs re-fetches and is recovered on the spot with a logged warning.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The contents file could not be opened or created
    #[error("failed to open cache file {path:?}: {source}")]
    Construction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading already-cached bytes back out of the contents file failed
    #[error("cache file read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing freshly fetched bytes into the contents file failed or
    /// short-wrote
    #[error("cache file write failed: {0}")]
    Write(#[source] io::Error),

    /// The upstream reader failed to seek or read
    #[error("upstream fetch failed: {0}")]
    Remote(anyhow::Error),
}
