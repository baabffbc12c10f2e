// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Codec helpers for the WebP conversion daemon.
//!
//! The functions here wrap the `image` crate and turn its errors into a small error type that
//! the daemon can classify.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat};

/// Extension (without the dot) that uploads must carry.
pub const WEBP_EXTENSION: &str = "webp";

pub const JPEG_EXTENSION: &str = "jpg";
pub const PNG_EXTENSION: &str = "png";

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const PNG_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Encode(String),
}

/// Case-insensitive check that `filename` ends in `.webp`.
pub fn has_webp_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(WEBP_EXTENSION))
}

pub fn decode_webp(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    image::load_from_memory_with_format(bytes, ImageFormat::WebP)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encodes `image` as baseline JPEG. JPEG has no alpha channel, so the image is flattened
/// to RGB8 first.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buffer)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut buffer))
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// Replaces the last extension of `filename` with `extension`.
///
/// `meme.webp` becomes `meme.jpg`, a name without extension just gets one appended.
pub fn output_name(filename: &str, extension: &str) -> String {
    let stem = match Path::new(filename).extension() {
        Some(ext) => &filename[..filename.len() - ext.len() - 1],
        None => filename,
    };
    format!("{stem}.{extension}")
}
