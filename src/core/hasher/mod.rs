//! # Hasher Module
//!
//! Computes the perceptual signature used for duplicate classification.
//!
//! ## How It Works
//! 1. Decode the bytes (`zune-jpeg` for JPEG, `image` for the rest)
//! 2. Convert to grayscale and downsample to a small fixed grid
//! 3. Threshold every cell against the grid mean
//! 4. Pack the bits into a [`Signature`]
//!
//! Hashers hold no mutable state; one value can be shared by every worker.
//!
//! ## Example
//! ```rust,ignore
//! use image_library_sync::core::hasher::{HasherConfig, HashAlgorithm};
//!
//! let hasher = HasherConfig::new().build();
//! let signature = hasher.hash_file(&path)?;
//! ```

mod average;
pub mod fast_decode;
mod traits;

pub use average::AverageHasher;
pub use fast_decode::FastDecoder;
pub use traits::{HashAlgorithm, ParseSignatureError, Signature};

/// Configuration builder for hashers
#[derive(Debug, Clone)]
pub struct HasherConfig {
    /// Grid side length; 8 gives a 64-bit signature
    hash_size: u32,
}

impl HasherConfig {
    pub fn new() -> Self {
        Self { hash_size: 8 }
    }

    /// Set the grid side length.
    ///
    /// Changing it makes every signature in an existing index incomparable,
    /// so libraries should keep the size they were indexed with.
    pub fn hash_size(mut self, size: u32) -> Self {
        self.hash_size = size;
        self
    }

    pub fn build(self) -> AverageHasher {
        AverageHasher::new(self.hash_size)
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_eight() {
        assert_eq!(HasherConfig::new().build().hash_size(), 8);
    }

    #[test]
    fn config_builder_sets_size() {
        assert_eq!(HasherConfig::new().hash_size(16).build().hash_size(), 16);
    }
}
