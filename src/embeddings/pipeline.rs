// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request orchestration: validate, acquire, load, infer, pool
//!
//! A request is all-or-nothing. Validation runs before any I/O, images are
//! acquired in input order and the first failure aborts the request, and
//! the whole batch goes through the encoder in one call.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::EmbeddingError;
use super::pooling::pool_hidden_states;
use crate::config::ResourceLimits;
use crate::models::{ModelCache, ModelId};
use crate::vision::{DecodedImage, ImageAcquirer, ImageSource};

/// One request item before the exactly-one-source rule is applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInput {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
}

impl ImageInput {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            image_base64: None,
        }
    }

    pub fn base64(payload: impl Into<String>) -> Self {
        Self {
            image_url: None,
            image_base64: Some(payload.into()),
        }
    }
}

/// Pooled vectors for one input image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingVectorPair {
    pub cls: Vec<f32>,
    pub mean: Vec<f32>,
}

/// Result of one request, in input order
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    pub model: ModelId,
    pub embeddings: Vec<EmbeddingVectorPair>,
    pub embedding_dim: usize,
}

#[derive(Clone)]
pub struct EmbeddingPipeline {
    acquirer: ImageAcquirer,
    cache: ModelCache,
    limits: Arc<ResourceLimits>,
}

impl EmbeddingPipeline {
    pub fn new(acquirer: ImageAcquirer, cache: ModelCache) -> Self {
        let limits = Arc::clone(acquirer.limits());
        Self {
            acquirer,
            cache,
            limits,
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn limits(&self) -> &Arc<ResourceLimits> {
        &self.limits
    }

    pub async fn create_embeddings(
        &self,
        model: &str,
        inputs: &[ImageSource],
    ) -> Result<EmbeddingBatch, EmbeddingError> {
        let model_id = self.validate(model, inputs.len())?;
        self.run(model_id, inputs).await
    }

    /// Same as [`Self::create_embeddings`] for items that still carry both
    /// optional source fields. Items with both or neither set are rejected
    /// with their index before any image is acquired.
    pub async fn create_embeddings_from_fields(
        &self,
        model: &str,
        inputs: &[ImageInput],
    ) -> Result<EmbeddingBatch, EmbeddingError> {
        let model_id = self.validate(model, inputs.len())?;

        let sources = inputs
            .iter()
            .enumerate()
            .map(|(index, item)| {
                ImageSource::from_fields(item.image_url.as_deref(), item.image_base64.as_deref())
                    .map_err(|e| EmbeddingError::from_image(index, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.run(model_id, &sources).await
    }

    fn validate(&self, model: &str, count: usize) -> Result<ModelId, EmbeddingError> {
        if model.is_empty() {
            return Err(EmbeddingError::InvalidRequest(
                "model must not be empty".to_string(),
            ));
        }
        if count == 0 {
            return Err(EmbeddingError::InvalidRequest(
                "input must contain at least one image".to_string(),
            ));
        }
        if count > self.limits.max_batch_size {
            warn!(
                "Rejected batch of {} images (max {})",
                count, self.limits.max_batch_size
            );
            return Err(EmbeddingError::InvalidRequest(format!(
                "input contains {} images, max batch size is {}",
                count, self.limits.max_batch_size
            )));
        }

        Ok(self.cache.resolve(model)?)
    }

    async fn run(
        &self,
        model_id: ModelId,
        sources: &[ImageSource],
    ) -> Result<EmbeddingBatch, EmbeddingError> {
        let started = Instant::now();

        let mut images: Vec<DecodedImage> = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let image = self.acquirer.acquire(source).await.map_err(|e| {
                warn!("Input {} rejected: {}", index, e);
                EmbeddingError::from_image(index, e)
            })?;
            debug!(
                "Input {}: {}x{} {:?}, {} bytes",
                index,
                image.width(),
                image.height(),
                image.format(),
                image.encoded_bytes()
            );
            images.push(image);
        }

        let bundle = self.cache.get_or_load(&model_id).await?;

        // Images move into the blocking task and are dropped there.
        let hidden = tokio::task::spawn_blocking(move || bundle.hidden_states(&images))
            .await
            .map_err(|e| EmbeddingError::Inference(format!("inference task failed: {}", e)))?
            .map_err(|e| EmbeddingError::Inference(format!("{:#}", e)))?;

        let pooled = pool_hidden_states(&hidden).ok_or_else(|| {
            EmbeddingError::Inference(format!(
                "model returned {} tokens per image, at least 2 are required",
                hidden.shape()[1]
            ))
        })?;

        let embedding_dim = pooled.embedding_dim();
        let embeddings: Vec<EmbeddingVectorPair> = pooled
            .cls
            .rows()
            .into_iter()
            .zip(pooled.mean.rows())
            .map(|(cls, mean)| EmbeddingVectorPair {
                cls: cls.to_vec(),
                mean: mean.to_vec(),
            })
            .collect();

        info!(
            "Embedded {} images with {} ({}D) in {}ms",
            embeddings.len(),
            model_id,
            embedding_dim,
            started.elapsed().as_millis()
        );

        Ok(EmbeddingBatch {
            model: model_id,
            embeddings,
            embedding_dim,
        })
    }
}
