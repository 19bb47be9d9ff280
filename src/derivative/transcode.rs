//! Image transcoder.
//!
//! Decodes a source image, optionally shrinks it to a target width, and
//! encodes it as WebP, JPEG or PNG.
//!
//! # Encoding
//!
//! - **WebP**: lossy at the requested quality (libwebp through the `webp` crate)
//! - **JPEG**: lossy at the requested quality, alpha is dropped
//! - **PNG**: lossless; quality only picks the compression effort
//!
//! Resizing fits the image inside the target width and never enlarges it.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};

use super::request::OutputFormat;
use crate::error::ImageError;

/// Transcoder for derivative generation.
///
/// Stateless and cheap to clone. All methods are CPU bound and expected to run
/// on a blocking thread.
#[derive(Debug, Clone, Default)]
pub struct Transcoder {}

impl Transcoder {
    /// Create a new transcoder.
    pub fn new() -> Self {
        Self {}
    }

    /// Decode `source`, resize to `width` if given, and encode as `format`.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Decode` for unreadable input and
    /// `ImageError::Encode` if the target encoder rejects the image.
    pub fn transcode(
        &self,
        source: &[u8],
        width: Option<u32>,
        quality: u8,
        format: OutputFormat,
    ) -> Result<Bytes, ImageError> {
        let img = self.decode(source)?;

        let img = match width {
            Some(max_width) => resize_to_width(img, max_width),
            None => img,
        };

        encode(&img, format, quality)
    }

    /// Decode image bytes, guessing the format from their content.
    pub fn decode(&self, source: &[u8]) -> Result<DynamicImage, ImageError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode {
                message: e.to_string(),
            })?;

        reader.decode().map_err(|e| ImageError::Decode {
            message: e.to_string(),
        })
    }

    /// Read image dimensions without decoding pixel data.
    #[cfg(test)]
    pub(crate) fn dimensions(&self, source: &[u8]) -> Result<(u32, u32), ImageError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode {
                message: e.to_string(),
            })?;

        reader.into_dimensions().map_err(|e| ImageError::Decode {
            message: e.to_string(),
        })
    }
}

// =============================================================================
// Resizing
// =============================================================================

/// Dimensions after fitting `(width, height)` inside `max_width`.
///
/// Aspect ratio is preserved and images narrower than `max_width` keep their
/// size.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }

    let scaled = (u64::from(height) * u64::from(max_width) + u64::from(width) / 2) / u64::from(width);
    (max_width, (scaled as u32).max(1))
}

/// Shrink `img` to fit `max_width`, never upscaling.
pub fn resize_to_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = target_dimensions(width, height, max_width);

    if (new_width, new_height) == (width, height) {
        img
    } else {
        img.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode `img` as `format` at `quality`.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Bytes, ImageError> {
    match format {
        OutputFormat::Webp => encode_webp(img, quality),
        OutputFormat::Jpeg => encode_jpeg(img, quality),
        OutputFormat::Png => encode_png(img, quality),
    }
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Bytes, ImageError> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());

    let memory = encoder
        .encode_simple(false, f32::from(quality))
        .map_err(|e| ImageError::Encode {
            format: "webp",
            message: format!("{:?}", e),
        })?;

    Ok(Bytes::copy_from_slice(&memory))
}

/// Baseline JPEG from the `image` encoder; no mozjpeg-style trellis tuning.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, ImageError> {
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);

    encoder
        .encode_image(&img.to_rgb8())
        .map_err(|e| ImageError::Encode {
            format: "jpeg",
            message: e.to_string(),
        })?;

    Ok(Bytes::from(output))
}

fn encode_png(img: &DynamicImage, quality: u8) -> Result<Bytes, ImageError> {
    let mut output = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        &mut output,
        png_compression(quality),
        PngFilter::Adaptive,
    );

    img.write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode {
            format: "png",
            message: e.to_string(),
        })?;

    Ok(Bytes::from(output))
}

/// Compression level on a 0-10 scale for a 1-100 quality.
#[inline]
pub fn png_compression_level(quality: u8) -> u8 {
    ((u16::from(quality) + 5) / 10) as u8
}

fn png_compression(quality: u8) -> CompressionType {
    match png_compression_level(quality) {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

// =============================================================================
// Tests
// =============================================================================
