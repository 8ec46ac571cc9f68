// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image embedding pipeline
//!
//! Produces two L2-normalized vectors per image from the encoder's hidden
//! states: the first token ("cls") and the mean of the remaining tokens.

pub mod error;
pub mod pipeline;
pub mod pooling;

pub use error::EmbeddingError;
pub use pipeline::{EmbeddingBatch, EmbeddingPipeline, EmbeddingVectorPair, ImageInput};
pub use pooling::{cls_pool, l2_normalize_rows, mean_pool, pool_hidden_states, PooledEmbeddings};
