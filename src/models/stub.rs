// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic in-process model source
//!
//! Produces hidden states of a fixed shape derived from the mean colour of
//! each image. Used in tests and benchmarks where no weights are available.

use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array3, Array4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::registry::ModelId;
use super::source::{ImagePreprocessor, InferenceBundle, ModelLoadError, ModelSource, VisionEncoder};
use crate::config::Device;
use crate::vision::image_utils::CHANNELS;
use crate::vision::DecodedImage;

/// Reduces each image to its per-channel mean, shape `[batch, 3, 1, 1]`
#[derive(Debug, Default)]
pub struct MeanColorPreprocessor;

impl ImagePreprocessor for MeanColorPreprocessor {
    fn preprocess(&self, images: &[DecodedImage]) -> Result<Array4<f32>> {
        let mut tensor = Array4::<f32>::zeros((images.len(), CHANNELS, 1, 1));

        for (b, image) in images.iter().enumerate() {
            let pixels = image.pixels();
            let count = (pixels.width() * pixels.height()).max(1) as f32;
            let mut sums = [0f32; CHANNELS];
            for pixel in pixels.pixels() {
                for (c, sum) in sums.iter_mut().enumerate() {
                    *sum += pixel[c] as f32 / 255.0;
                }
            }
            for (c, sum) in sums.iter().enumerate() {
                tensor[[b, c, 0, 0]] = sum / count;
            }
        }

        Ok(tensor)
    }
}

/// Fills `[batch, tokens, hidden]` from the pooled pixel values
#[derive(Debug)]
pub struct StubEncoder {
    hidden_size: usize,
    num_tokens: usize,
}

impl StubEncoder {
    pub fn new(hidden_size: usize, num_tokens: usize) -> Self {
        Self {
            hidden_size,
            num_tokens,
        }
    }
}

impl VisionEncoder for StubEncoder {
    fn forward(&self, pixel_values: Array4<f32>) -> Result<Array3<f32>> {
        let batch = pixel_values.shape()[0];
        let mut hidden = Array3::<f32>::zeros((batch, self.num_tokens, self.hidden_size));

        for b in 0..batch {
            for t in 0..self.num_tokens {
                for h in 0..self.hidden_size {
                    let channel = pixel_values[[b, h % CHANNELS, 0, 0]];
                    hidden[[b, t, h]] = (channel + 0.5) * (t + 1) as f32 + h as f32 * 0.01;
                }
            }
        }

        Ok(hidden)
    }
}

/// [`ModelSource`] that builds stub bundles and counts loads
#[derive(Debug)]
pub struct StubModelSource {
    hidden_size: usize,
    num_tokens: usize,
    load_delay: Duration,
    failure: Mutex<Option<ModelLoadError>>,
    loads: AtomicUsize,
}

impl StubModelSource {
    pub fn new(hidden_size: usize, num_tokens: usize) -> Self {
        Self {
            hidden_size,
            num_tokens,
            load_delay: Duration::ZERO,
            failure: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Sleeps this long inside every load, to widen concurrency windows
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Makes subsequent loads fail with `error` (or succeed again with `None`)
    pub fn set_failure(&self, error: Option<ModelLoadError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Number of load attempts so far, failed ones included
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[async_trait]
impl ModelSource for StubModelSource {
    async fn load(
        &self,
        model_id: &ModelId,
        device: Device,
    ) -> Result<InferenceBundle, ModelLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }

        let failure = self
            .failure
            .lock()
            .map_err(|_| ModelLoadError::Other("stub state poisoned".to_string()))?
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(InferenceBundle {
            model_id: model_id.clone(),
            preprocessor: Arc::new(MeanColorPreprocessor),
            encoder: Arc::new(StubEncoder::new(self.hidden_size, self.num_tokens)),
            device,
        })
    }
}
