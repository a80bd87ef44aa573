//! # libsync CLI
//!
//! Command-line interface for image library sync.
//!
//! ## Usage
//! ```bash
//! libsync scan ~/Pictures/gallery --auto-delete
//! libsync ingest ~/Pictures/gallery --candidates new.json --output json
//! libsync index ~/Pictures/gallery
//! ```

mod cli;

use image_library_sync::Result;

fn main() -> Result<()> {
    cli::run()
}
