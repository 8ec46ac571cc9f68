// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model capabilities consumed by the embedding pipeline
//!
//! A model is split into two capabilities: an [`ImagePreprocessor`] that
//! turns decoded bitmaps into a pixel tensor, and a [`VisionEncoder`] that
//! maps the tensor to per-token hidden states. A [`ModelSource`] builds both
//! for a given identifier and device.

use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array3, Array4};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::registry::ModelId;
use crate::config::Device;
use crate::vision::DecodedImage;

/// Converts a batch of images into an NCHW tensor `[batch, 3, H, W]`
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, images: &[DecodedImage]) -> Result<Array4<f32>>;
}

/// Forward pass returning hidden states `[batch, tokens, hidden]`
pub trait VisionEncoder: Send + Sync {
    fn forward(&self, pixel_values: Array4<f32>) -> Result<Array3<f32>>;
}

/// Errors raised while building an [`InferenceBundle`]
///
/// Cloneable so every waiter on a shared load receives the same failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelLoadError {
    #[error("model source credentials are not configured")]
    MissingCredentials,

    #[error("model source is unreachable: {0}")]
    Unreachable(String),

    #[error("model source rejected the credentials")]
    Unauthorized,

    #[error("model '{0}' was not found at the model source")]
    NotFound(String),

    #[error("model load failed: {0}")]
    Other(String),
}

/// A loaded model, shared by every request that targets it
pub struct InferenceBundle {
    pub model_id: ModelId,
    pub preprocessor: Arc<dyn ImagePreprocessor>,
    pub encoder: Arc<dyn VisionEncoder>,
    pub device: Device,
}

impl fmt::Debug for InferenceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceBundle")
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl InferenceBundle {
    /// Preprocesses and encodes one batch. Blocks the calling thread.
    pub fn hidden_states(&self, images: &[DecodedImage]) -> Result<Array3<f32>> {
        let pixel_values = self.preprocessor.preprocess(images)?;
        let hidden = self.encoder.forward(pixel_values)?;

        if hidden.shape()[0] != images.len() {
            anyhow::bail!(
                "Encoder returned {} rows for a batch of {}",
                hidden.shape()[0],
                images.len()
            );
        }
        Ok(hidden)
    }
}

/// Builds inference bundles on demand
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn load(&self, model_id: &ModelId, device: Device)
        -> Result<InferenceBundle, ModelLoadError>;
}
