//! Error types for the feed cache and the feed download.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the durable cache record.
///
/// `NotFound` is expected on first start. Everything else means the
/// process can no longer keep memory and disk in agreement.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no cache record at {}", .0.display())]
    NotFound(PathBuf),

    #[error("cache record at {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache record at {} is not valid base64: {source}", .path.display())]
    BadEncoding {
        path: PathBuf,
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to read cache record {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache record {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache record: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Transient failures while downloading or parsing the feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed server returned status {0}")]
    Status(u16),

    #[error("feed is not valid RSS: {0}")]
    Parse(#[from] rss::Error),
}
