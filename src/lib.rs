//! # Image Library Sync
//!
//! Keeps folders of downloaded images free of visual duplicates.
//!
//! ## Core Guarantees
//! - **One copy per picture** - a library never keeps two files with the
//!   same perceptual signature once scanned or ingested
//! - **Survives outside edits** - files deleted or added by hand are
//!   reconciled on the next scan
//! - **Best effort batches** - one bad file or URL never aborts the others
//!
//! ## Architecture
//! - `core` - The hashing, index, scan and ingest engine
//! - `events` - Progress events and cancellation
//! - `error` - Error types
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{Result, SyncError};

/// Initialize tracing for the library
///
/// `RUST_LOG` wins over `default_level`. Called by the application entry
/// point; a second call is a no-op.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
