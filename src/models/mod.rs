// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model allow-list, loading and caching

pub mod cache;
pub mod hub;
pub mod registry;
pub mod source;
pub mod stub;

pub use cache::{CacheError, CacheStats, ModelCache};
pub use hub::{HubModelSource, OnnxVisionEncoder};
pub use registry::{ModelId, ModelRegistry, UnsupportedModel};
pub use source::{ImagePreprocessor, InferenceBundle, ModelLoadError, ModelSource, VisionEncoder};
pub use stub::{MeanColorPreprocessor, StubEncoder, StubModelSource};
