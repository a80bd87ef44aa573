//! Fast image decoding with format-specific optimizations.
//!
//! Uses zune-jpeg for JPEG data (1.5-2x faster than image crate),
//! falls back to image crate for everything else.

use crate::error::HashError;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Luma, Rgb, Rgba};
use std::fs;
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Image container detected from the leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Jpeg,
    Other,
}

impl SniffedFormat {
    /// Detect the container from magic bytes rather than the file name,
    /// since downloaded files are named after their URL.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&JPEG_MAGIC) {
            Self::Jpeg
        } else {
            Self::Other
        }
    }
}

/// Fast image decoder that uses optimized decoders per format
pub struct FastDecoder;

impl FastDecoder {
    /// Read and decode an image file.
    pub fn decode(path: &Path) -> Result<DynamicImage, HashError> {
        let bytes = fs::read(path).map_err(|e| HashError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::decode_bytes(&bytes, path)
    }

    /// Decode in-memory image data. `origin` is only used for error context.
    pub fn decode_bytes(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
        if bytes.is_empty() {
            return Err(HashError::EmptyImage {
                path: origin.to_path_buf(),
            });
        }

        let image = match SniffedFormat::from_bytes(bytes) {
            SniffedFormat::Jpeg => Self::decode_jpeg(bytes, origin)
                .or_else(|_| Self::decode_fallback(bytes, origin))?,
            SniffedFormat::Other => Self::decode_fallback(bytes, origin)?,
        };

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(HashError::EmptyImage {
                path: origin.to_path_buf(),
            });
        }

        Ok(image)
    }

    /// Cheap validity probe: the header parses and reports dimensions.
    ///
    /// Used to decide whether an existing download can be kept as-is.
    pub fn is_valid_image(path: &Path) -> bool {
        ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .ok()
            .and_then(|reader| reader.into_dimensions().ok())
            .map(|(w, h)| w > 0 && h > 0)
            .unwrap_or(false)
    }

    fn decode_jpeg(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(bytes, options);

        let pixels = decoder.decode().map_err(|e| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: format!("zune-jpeg decode failed: {:?}", e),
        })?;

        let info = decoder.info().ok_or_else(|| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: "Failed to get image info".to_string(),
        })?;

        let width = info.width as u32;
        let height = info.height as u32;
        let buffer_error = |kind: &str| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: format!("Failed to create {} buffer", kind),
        };

        let image = match decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB) {
            ColorSpace::RGB => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("RGB"))?;
                DynamicImage::ImageRgb8(buffer)
            }
            ColorSpace::RGBA => {
                let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("RGBA"))?;
                DynamicImage::ImageRgba8(buffer)
            }
            ColorSpace::Luma => {
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("Luma"))?;
                DynamicImage::ImageLuma8(buffer)
            }
            _ => return Self::decode_fallback(bytes, origin),
        };

        Ok(image)
    }

    fn decode_fallback(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
        image::load_from_memory(bytes).map_err(|e| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
