//! Average Hash (aHash) implementation.
//!
//! aHash works by:
//! 1. Converting the image to grayscale
//! 2. Resizing it to hash_size x hash_size
//! 3. Computing the mean brightness
//! 4. For each cell: 1 if brighter than the mean, else 0
//!
//! Bits are packed row-major, most significant bit first, so an 8x8 grid
//! renders as the 16-digit hex keys stored in `hash.json`.

use super::traits::{HashAlgorithm, Signature};
use image::imageops::{self, FilterType};
use image::DynamicImage;

/// Average Hash (aHash) implementation
#[derive(Debug, Clone)]
pub struct AverageHasher {
    /// Side length of the sampling grid
    hash_size: u32,
}

impl AverageHasher {
    pub fn new(hash_size: u32) -> Self {
        Self {
            hash_size: hash_size.max(1),
        }
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }
}

impl HashAlgorithm for AverageHasher {
    fn hash_image(&self, image: &DynamicImage) -> Signature {
        let gray = image.to_luma8();
        let grid = imageops::resize(&gray, self.hash_size, self.hash_size, FilterType::Lanczos3);

        let cells = (self.hash_size * self.hash_size) as f64;
        let mean = grid.pixels().map(|p| p[0] as f64).sum::<f64>() / cells;

        let mut bytes = Vec::with_capacity((self.hash_size * self.hash_size).div_ceil(8) as usize);
        let mut current: u8 = 0;
        let mut bit = 0;

        for pixel in grid.pixels() {
            if pixel[0] as f64 > mean {
                current |= 1 << (7 - bit);
            }
            bit += 1;
            if bit == 8 {
                bytes.push(current);
                current = 0;
                bit = 0;
            }
        }

        if bit > 0 {
            bytes.push(current);
        }

        Signature::from_bytes(bytes)
    }
}
