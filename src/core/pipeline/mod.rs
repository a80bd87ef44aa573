//! # Pipeline Module
//!
//! Orchestrates one incremental sync of a library from a remote gallery.
//!
//! ## Stages
//! 1. **List** - resolve candidates newer than the watermark
//! 2. **Check** - stop here if cancellation was requested
//! 3. **Ingest** - download, deduplicate and admit the candidates
//!
//! The returned watermark is what the caller should persist for the next
//! run; this module never stores it.

mod executor;

pub use executor::{SyncOutcome, SyncPipeline, SyncPipelineBuilder};
