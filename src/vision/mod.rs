// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision input handling
//!
//! This module provides:
//! - Image acquisition from base64 payloads and remote URLs
//! - Size-limited decoding into RGB bitmaps
//! - Model-specific preprocessing into NCHW tensors

pub mod acquirer;
pub mod image_utils;
pub mod preprocessing;

pub use acquirer::{ImageAcquirer, ImageSource};
pub use image_utils::{
    decode_base64_payload, decode_image_bytes, detect_format, DecodedImage, ImageError,
    ImageErrorKind,
};
pub use preprocessing::{HubImageProcessor, PreprocessorConfig, SizeSpec};
