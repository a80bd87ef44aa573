//! # Core Module
//!
//! The UI-agnostic library sync engine.
//!
//! ## Modules
//! - `hasher` - Computes perceptual signatures
//! - `index` - Persistent signature index per library
//! - `library` - A library folder and its eligible files
//! - `reconcile` - Brings the index in line with the folder
//! - `fetch` - HTTP GET with per-host headers and cookies
//! - `listing` - Resolves paginated remote listings into candidates
//! - `ingest` - Downloads candidates with retry and dedup-on-ingest
//! - `pipeline` - Listing followed by ingest

pub mod fetch;
pub mod hasher;
pub mod index;
pub mod ingest;
pub mod library;
pub mod listing;
pub mod pipeline;
pub mod reconcile;

// Re-export commonly used types
pub use hasher::Signature;
pub use index::{Classification, ContentIndex};
pub use ingest::{IngestConfig, IngestPipeline, IngestResult};
pub use library::Library;
pub use listing::Candidate;
pub use reconcile::{ReconciliationScan, ScanOptions, ScanReport};
