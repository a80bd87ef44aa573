//! Signature type and the hashing trait.

use super::fast_decode::FastDecoder;
use crate::error::HashError;
use image::DynamicImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-length perceptual fingerprint of image content.
///
/// Two images are the same iff their signatures are equal. There is no
/// distance threshold: re-encoded or resized copies are distinct content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex, two characters per byte.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn bit_count(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A persisted signature key that is not valid hex
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid signature {value:?}: expected an even number of hex digits")]
pub struct ParseSignatureError {
    pub value: String,
}

impl FromStr for Signature {
    type Err = ParseSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseSignatureError {
            value: s.to_string(),
        };

        if s.is_empty() || s.len() % 2 != 0 || !s.is_ascii() {
            return Err(invalid());
        }

        let bytes = (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| invalid()))
            .collect::<Result<Vec<u8>, _>>()?;

        Ok(Self { bytes })
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A stateless signature function.
///
/// Implementations must be pure: identical pixel content always yields the
/// same signature.
pub trait HashAlgorithm: Send + Sync {
    /// Compute a signature from an already-decoded image
    fn hash_image(&self, image: &DynamicImage) -> Signature;

    /// Decode raw bytes and compute their signature.
    ///
    /// `origin` names the file or URL the bytes came from, for error context.
    fn hash_bytes(&self, bytes: &[u8], origin: &Path) -> Result<Signature, HashError> {
        let image = FastDecoder::decode_bytes(bytes, origin)?;
        Ok(self.hash_image(&image))
    }

    /// Read, decode and hash a file
    fn hash_file(&self, path: &Path) -> Result<Signature, HashError> {
        let image = FastDecoder::decode(path)?;
        Ok(self.hash_image(&image))
    }
}
