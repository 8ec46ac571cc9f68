// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image decoding and limit enforcement
//!
//! Byte-size limits are checked before any decoder runs. Pixel limits are
//! checked against the header and again on the decoded bitmap, so a small
//! payload that expands into a huge bitmap is still rejected.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

use crate::config::ResourceLimits;

/// Channels in every decoded image (RGB)
pub const CHANNELS: usize = 3;

/// Image acquisition failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageError {
    #[error("provide exactly one of image_url or image_base64")]
    AmbiguousSource,

    #[error("invalid base64 image data: {0}")]
    InvalidBase64(String),

    #[error("image data is empty")]
    EmptyData,

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("image size exceeds configured byte limit: {size} bytes (max: {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error(
        "image dimensions exceed configured limits: {width}x{height} (max: {max_width}x{max_height})"
    )]
    DimensionsTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("image exceeds decoder limits: {0}")]
    DecoderLimit(String),

    #[error("remote image request returned HTTP {0}")]
    RemoteStatus(u16),

    #[error("remote image request failed: {0}")]
    RemoteTransport(String),

    #[error("remote image request timed out")]
    RemoteTimeout,

    #[error("invalid Content-Length header: {0}")]
    InvalidContentLength(String),
}

/// Client-facing class of an [`ImageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageErrorKind {
    InvalidImage,
    TooLarge,
    RemoteFetch,
}

impl ImageError {
    pub fn kind(&self) -> ImageErrorKind {
        match self {
            ImageError::AmbiguousSource
            | ImageError::InvalidBase64(_)
            | ImageError::EmptyData
            | ImageError::UnsupportedFormat
            | ImageError::DecodeFailed(_)
            | ImageError::InvalidUrl(_) => ImageErrorKind::InvalidImage,
            ImageError::TooLarge { .. }
            | ImageError::DimensionsTooLarge { .. }
            | ImageError::DecoderLimit(_) => ImageErrorKind::TooLarge,
            ImageError::RemoteStatus(_)
            | ImageError::RemoteTransport(_)
            | ImageError::RemoteTimeout
            | ImageError::InvalidContentLength(_) => ImageErrorKind::RemoteFetch,
        }
    }
}

impl From<base64::DecodeError> for ImageError {
    fn from(e: base64::DecodeError) -> Self {
        ImageError::InvalidBase64(e.to_string())
    }
}

/// A decoded RGB bitmap owned by a single request
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbImage,
    format: ImageFormat,
    encoded_bytes: usize,
}

impl DecodedImage {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self {
            pixels,
            format: ImageFormat::Png,
            encoded_bytes: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> usize {
        CHANNELS
    }

    /// Format the payload was encoded in
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn encoded_bytes(&self) -> usize {
        self.encoded_bytes
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Drops a `data:<mime>;base64,` prefix if present.
pub fn strip_data_uri(value: &str) -> &str {
    if value.starts_with("data:") {
        if let Some((_, payload)) = value.split_once(',') {
            return payload;
        }
    }
    value
}

/// Strict standard-alphabet base64 decode of an inline payload.
pub fn decode_base64_payload(value: &str) -> Result<Vec<u8>, ImageError> {
    let payload = strip_data_uri(value).trim();
    if payload.is_empty() {
        return Err(ImageError::EmptyData);
    }
    Ok(STANDARD.decode(payload)?)
}

/// Rejects byte payloads above `max_image_bytes`.
pub fn check_byte_limit(size: usize, limits: &ResourceLimits) -> Result<(), ImageError> {
    if size > limits.max_image_bytes {
        return Err(ImageError::TooLarge {
            size,
            limit: limits.max_image_bytes,
        });
    }
    Ok(())
}

fn check_dimensions(width: u32, height: u32, limits: &ResourceLimits) -> Result<(), ImageError> {
    if width > limits.max_image_width || height > limits.max_image_height {
        return Err(ImageError::DimensionsTooLarge {
            width,
            height,
            max_width: limits.max_image_width,
            max_height: limits.max_image_height,
        });
    }
    Ok(())
}

/// Decodes raw bytes into an RGB bitmap within `limits`.
pub fn decode_image_bytes(
    bytes: &[u8],
    limits: &ResourceLimits,
) -> Result<DecodedImage, ImageError> {
    check_byte_limit(bytes.len(), limits)?;

    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let format = detect_format(bytes)?;

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(map_decode_error)?;
    check_dimensions(width, height, limits)?;

    let mut decoder_limits = Limits::default();
    decoder_limits.max_image_width = Some(limits.max_image_width);
    decoder_limits.max_image_height = Some(limits.max_image_height);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(decoder_limits);
    let image = reader.decode().map_err(map_decode_error)?;

    check_dimensions(image.width(), image.height(), limits)?;

    debug!(
        "Decoded {:?} image: {}x{}, {} bytes",
        format,
        image.width(),
        image.height(),
        bytes.len()
    );

    Ok(DecodedImage {
        pixels: image.to_rgb8(),
        format,
        encoded_bytes: bytes.len(),
    })
}

fn map_decode_error(e: image::ImageError) -> ImageError {
    match e {
        image::ImageError::Limits(limit) => ImageError::DecoderLimit(limit.to_string()),
        image::ImageError::Unsupported(_) => ImageError::UnsupportedFormat,
        other => ImageError::DecodeFailed(other.to_string()),
    }
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    if bytes.len() < 4 {
        return Err(ImageError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II (little-endian) or MM (big-endian)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(ImageError::UnsupportedFormat),
    }
}
