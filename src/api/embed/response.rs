// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Response body for POST /v1/embeddings

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingBatch;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingVectors {
    pub cls: Vec<f32>,
    pub mean: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingItem {
    pub object: String,
    pub index: usize,
    pub embeddings: EmbeddingVectors,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_images: usize,
    pub embedding_dim: usize,
}

/// ```json
/// {
///   "object": "list",
///   "model": "google/vit-base-patch16-224-in21k",
///   "data": [
///     {"object": "embedding", "index": 0, "embeddings": {"cls": [...], "mean": [...]}}
///   ],
///   "usage": {"input_images": 1, "embedding_dim": 768}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingItem>,
    pub model: String,
    pub usage: Usage,
}

impl From<EmbeddingBatch> for EmbeddingResponse {
    fn from(batch: EmbeddingBatch) -> Self {
        let input_images = batch.embeddings.len();
        let data = batch
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(index, pair)| EmbeddingItem {
                object: "embedding".to_string(),
                index,
                embeddings: EmbeddingVectors {
                    cls: pair.cls,
                    mean: pair.mean,
                },
            })
            .collect();

        Self {
            object: "list".to_string(),
            data,
            model: batch.model.to_string(),
            usage: Usage {
                input_images,
                embedding_dim: batch.embedding_dim,
            },
        }
    }
}
