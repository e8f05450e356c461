//! Scoped access to decoded leaf images.

use crate::error::ClassifyError;
use image::{RgbaImage, imageops::FilterType};
use std::fs;
use std::path::Path;

/// Longest side kept for analysis; larger uploads are downscaled.
pub const MAX_ANALYSIS_SIDE: u32 = 512;

/// Decoded RGBA pixels for one classification request.
///
/// The pixel buffer lives exactly as long as this value, so every exit path
/// out of the classifier releases it.
pub struct LeafImage {
    pixels: RgbaImage,
    source_len: usize,
}

impl LeafImage {
    /// Decode `bytes` into an analysis-sized RGBA buffer.
    pub fn acquire(bytes: &[u8]) -> Result<Self, ClassifyError> {
        if bytes.is_empty() {
            return Err(ClassifyError::NoImageProvided);
        }
        let img = image::load_from_memory(bytes)?;
        let pixels = if img.width() > MAX_ANALYSIS_SIDE || img.height() > MAX_ANALYSIS_SIDE {
            img.resize(MAX_ANALYSIS_SIDE, MAX_ANALYSIS_SIDE, FilterType::Triangle)
                .to_rgba8()
        } else {
            img.to_rgba8()
        };
        tracing::trace!(
            width = pixels.width(),
            height = pixels.height(),
            "acquired leaf image"
        );
        Ok(Self {
            pixels,
            source_len: bytes.len(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClassifyError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ClassifyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::acquire(&bytes)
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Size of the encoded input this image was decoded from.
    pub fn source_len(&self) -> usize {
        self.source_len
    }
}

impl Drop for LeafImage {
    fn drop(&mut self) {
        tracing::trace!(bytes = self.source_len, "released leaf image");
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::solid_png;
    use super::*;

    #[test]
    fn empty_input_is_no_image() {
        assert!(matches!(
            LeafImage::acquire(&[]),
            Err(ClassifyError::NoImageProvided)
        ));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        assert!(matches!(
            LeafImage::acquire(b"definitely not a png"),
            Err(ClassifyError::Decode(_))
        ));
    }

    #[test]
    fn large_images_are_downscaled() {
        let bytes = solid_png(1024, 256, [0, 255, 0]);
        let img = LeafImage::acquire(&bytes).unwrap();
        assert_eq!(img.dimensions(), (512, 128));
        assert_eq!(img.source_len(), bytes.len());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = LeafImage::open("/nonexistent/leaf.png").err().unwrap();
        assert!(matches!(err, ClassifyError::Read { .. }));
    }
}
