// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod embeddings;
pub mod models;
pub mod version;
pub mod vision;

pub use config::{ConfigError, Device, DeviceConfig, ResourceLimits, ServiceConfig};
pub use embeddings::{EmbeddingBatch, EmbeddingError, EmbeddingPipeline, EmbeddingVectorPair};
pub use models::{InferenceBundle, ModelCache, ModelId, ModelRegistry, ModelSource};
pub use vision::{DecodedImage, ImageAcquirer, ImageSource};
