// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing driven by a Hugging Face `preprocessor_config.json`
//!
//! Steps, each toggled by the config:
//! 1. Resize (shortest edge, exact height/width, or square)
//! 2. Center crop to the crop size
//! 3. Rescale pixel values (usually 1/255)
//! 4. Normalize with per-channel mean/std
//! 5. Pack into an NCHW tensor `[batch, 3, H, W]`

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use serde::Deserialize;
use std::path::Path;

use super::image_utils::{DecodedImage, CHANNELS};
use crate::models::ImagePreprocessor;

/// `size` / `crop_size` as they appear in preprocessor configs
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Square(u32),
    Exact { height: u32, width: u32 },
    ShortestEdge { shortest_edge: u32 },
}

fn default_true() -> bool {
    true
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_mean() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_resample() -> u32 {
    3
}

/// Subset of the Hugging Face image-processor config used for vision encoders
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default = "default_true")]
    pub do_resize: bool,
    #[serde(default)]
    pub size: Option<SizeSpec>,
    /// PIL resampling code (0 nearest, 1 lanczos, 2 bilinear, 3 bicubic)
    #[serde(default = "default_resample")]
    pub resample: u32,
    #[serde(default)]
    pub do_center_crop: bool,
    #[serde(default)]
    pub crop_size: Option<SizeSpec>,
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_normalize: bool,
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_mean")]
    pub image_std: [f32; 3],
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: Some(SizeSpec::Exact {
                height: 224,
                width: 224,
            }),
            resample: default_resample(),
            do_center_crop: false,
            crop_size: None,
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: true,
            image_mean: default_mean(),
            image_std: default_mean(),
        }
    }
}

impl PreprocessorConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).context("Failed to parse preprocessor config")?;
        if config.image_std.iter().any(|s| *s == 0.0) {
            anyhow::bail!("image_std must not contain zeros");
        }
        Ok(config)
    }

    fn filter(&self) -> FilterType {
        match self.resample {
            0 => FilterType::Nearest,
            1 => FilterType::Lanczos3,
            2 => FilterType::Triangle,
            _ => FilterType::CatmullRom,
        }
    }
}

/// Preprocessor built from a [`PreprocessorConfig`]
#[derive(Debug, Clone)]
pub struct HubImageProcessor {
    config: PreprocessorConfig,
}

impl HubImageProcessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    /// Resize and crop one image to the model input geometry
    pub fn prepare(&self, image: &RgbImage) -> RgbImage {
        let resized = if self.config.do_resize {
            match self.config.size {
                Some(size) => resize(image, size, self.config.filter()),
                None => image.clone(),
            }
        } else {
            image.clone()
        };

        match self.crop_target() {
            Some((width, height)) => center_crop(&resized, width, height),
            None => resized,
        }
    }

    /// Crop size, if any. A shortest-edge resize without an explicit crop
    /// still crops to a square so the batch has a single geometry.
    fn crop_target(&self) -> Option<(u32, u32)> {
        let crop = if self.config.do_center_crop {
            self.config.crop_size.or(self.config.size)
        } else {
            match self.config.size {
                Some(SizeSpec::ShortestEdge { .. }) if self.config.do_resize => self.config.size,
                _ => None,
            }
        };

        crop.map(|spec| match spec {
            SizeSpec::Square(edge) | SizeSpec::ShortestEdge { shortest_edge: edge } => {
                (edge, edge)
            }
            SizeSpec::Exact { height, width } => (width, height),
        })
    }

    fn normalize(&self, value: u8, channel: usize) -> f32 {
        let mut v = value as f32;
        if self.config.do_rescale {
            v *= self.config.rescale_factor;
        }
        if self.config.do_normalize {
            v = (v - self.config.image_mean[channel]) / self.config.image_std[channel];
        }
        v
    }
}

impl ImagePreprocessor for HubImageProcessor {
    fn preprocess(&self, images: &[DecodedImage]) -> Result<Array4<f32>> {
        if images.is_empty() {
            anyhow::bail!("Cannot preprocess an empty batch");
        }

        let prepared: Vec<RgbImage> = images.iter().map(|img| self.prepare(img.pixels())).collect();

        let (width, height) = prepared[0].dimensions();
        if prepared.iter().any(|img| img.dimensions() != (width, height)) {
            anyhow::bail!("Preprocessed images do not share one geometry");
        }

        let mut tensor = Array4::<f32>::zeros((
            prepared.len(),
            CHANNELS,
            height as usize,
            width as usize,
        ));

        for (b, img) in prepared.iter().enumerate() {
            for (x, y, pixel) in img.enumerate_pixels() {
                for c in 0..CHANNELS {
                    tensor[[b, c, y as usize, x as usize]] = self.normalize(pixel[c], c);
                }
            }
        }

        Ok(tensor)
    }
}

fn resize(image: &RgbImage, size: SizeSpec, filter: FilterType) -> RgbImage {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = match size {
        SizeSpec::Square(edge) => (edge, edge),
        SizeSpec::Exact { height, width } => (width, height),
        SizeSpec::ShortestEdge { shortest_edge } => {
            let short = width.min(height).max(1) as f32;
            let scale = shortest_edge as f32 / short;
            (
                ((width as f32 * scale).round() as u32).max(1),
                ((height as f32 * scale).round() as u32).max(1),
            )
        }
    };

    if (new_w, new_h) == (width, height) {
        return image.clone();
    }
    imageops::resize(image, new_w, new_h, filter)
}

/// Center crop; pads with black when the image is smaller than the target.
fn center_crop(image: &RgbImage, target_w: u32, target_h: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width >= target_w && height >= target_h {
        let x = (width - target_w) / 2;
        let y = (height - target_h) / 2;
        return imageops::crop_imm(image, x, y, target_w, target_h).to_image();
    }

    let mut canvas = RgbImage::new(target_w, target_h);
    let offset_x = (target_w as i64 - width as i64) / 2;
    let offset_y = (target_h as i64 - height as i64) / 2;
    imageops::replace(&mut canvas, image, offset_x, offset_y);
    canvas
}
