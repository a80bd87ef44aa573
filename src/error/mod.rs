//! # Error Module
//!
//! Error types for the library sync engine.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, URLs, what went wrong
//! - **Isolate per-item failures** - a bad file or URL is reported through
//!   events and never aborts a whole scan or ingest
//! - Only resource-level problems (unreadable library, unwritable index)
//!   surface as `Err` from the top-level operations

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Download error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Listing error: {0}")]
    Listing(#[from] ListingError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur when opening or listing a library folder
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Library folder not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Library path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to read library {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur during image hashing
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to decode image {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Image is empty or corrupted: {path}")]
    EmptyImage { path: PathBuf },

    #[error("Failed to open image file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while loading or saving a content index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to write index table {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize index table {path}: {reason}")]
    Serialize { path: PathBuf, reason: String },

    #[error("Index table {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors from a single HTTP fetch. All of them are transient from the
/// point of view of the ingest pipeline and count against the retry budget.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Server answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Empty response body from {url}")]
    EmptyBody { url: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors that stop a remote listing from being resolved
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Failed to load listing root {url}: {source}")]
    RootPage {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Listing was cancelled")]
    Cancelled,

    #[error("Failed to start listing workers: {0}")]
    WorkerPool(String),
}

/// Resource-level ingest failures. Per-candidate failures never end up here.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Library {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start download workers: {0}")]
    WorkerPool(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_error_includes_path() {
        let error = LibraryError::NotFound {
            path: PathBuf::from("/libraries/cosplay"),
        };
        assert!(error.to_string().contains("/libraries/cosplay"));
    }

    #[test]
    fn hash_error_includes_path_and_reason() {
        let error = HashError::DecodeError {
            path: PathBuf::from("/libraries/broken.jpg"),
            reason: "invalid JPEG".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/libraries/broken.jpg"));
        assert!(message.contains("invalid JPEG"));
    }

    #[test]
    fn fetch_error_includes_url_and_status() {
        let error = FetchError::Status {
            url: "https://img.example.com/a.jpg".to_string(),
            status: 503,
        };
        let message = error.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("https://img.example.com/a.jpg"));
    }

    #[test]
    fn subsystem_errors_convert_into_sync_error() {
        let error: SyncError = ListingError::Cancelled.into();
        assert!(matches!(error, SyncError::Listing(ListingError::Cancelled)));
    }
}
