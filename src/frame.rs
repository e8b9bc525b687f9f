//! Decoded frames and JPEG output.
//!
//! - `Frame`: RGB24 pixels with dimensions and the local time it was captured.
//! - `Frame::write_jpeg`: encodes to a new file. Output files are write-once:
//!   the file is created with create-new semantics, so an existing file is never
//!   overwritten or modified.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default JPEG quality, matching the usual OpenCV `imwrite` default.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// A decoded RGB24 frame.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    /// Wrap RGB24 pixel data. The buffer length must be `width * height * 3`.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("frame has empty dimensions {}x{}", width, height));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: Local::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Encode the frame as JPEG into a new file at `path`.
    pub fn write_jpeg(&self, path: &Path, quality: u8) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("create image file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
            .write_image(
                &self.pixels,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            )
            .with_context(|| format!("encode jpeg {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("flush image file {}", path.display()))?;
        Ok(())
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow: {}x{}", width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gray(width: u32, height: u32) -> Result<Frame> {
        Frame::new(vec![128u8; (width * height * 3) as usize], width, height)
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4).is_err());
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert!(Frame::new(Vec::new(), 0, 4).is_err());
    }

    #[test]
    fn writes_decodable_jpeg() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gray.jpg");
        gray(32, 24)?.write_jpeg(&path, DEFAULT_JPEG_QUALITY)?;

        let decoded = image::open(&path)?;
        assert_eq!(decoded.dimensions(), (32, 24));
        Ok(())
    }

    #[test]
    fn never_overwrites_existing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("taken.jpg");
        std::fs::write(&path, b"existing")?;

        assert!(gray(8, 8)?.write_jpeg(&path, 90).is_err());
        assert_eq!(std::fs::read(&path)?, b"existing");
        Ok(())
    }
}
