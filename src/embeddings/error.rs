// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Errors surfaced by the embedding pipeline

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::{CacheError, ModelLoadError, UnsupportedModel};
use crate::vision::{ImageError, ImageErrorKind};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    UnsupportedModel(#[from] UnsupportedModel),

    #[error("input {index}: invalid image: {source}")]
    InvalidImage { index: usize, source: ImageError },

    #[error("input {index}: image too large: {source}")]
    ImageTooLarge { index: usize, source: ImageError },

    #[error("input {index}: remote fetch failed: {source}")]
    RemoteFetch { index: usize, source: ImageError },

    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] ModelLoadError),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl EmbeddingError {
    /// Attaches the failing input index to an acquisition error.
    pub fn from_image(index: usize, source: ImageError) -> Self {
        match source.kind() {
            ImageErrorKind::InvalidImage => EmbeddingError::InvalidImage { index, source },
            ImageErrorKind::TooLarge => EmbeddingError::ImageTooLarge { index, source },
            ImageErrorKind::RemoteFetch => EmbeddingError::RemoteFetch { index, source },
        }
    }

    /// Index of the offending input, for per-item errors
    pub fn index(&self) -> Option<usize> {
        match self {
            EmbeddingError::InvalidImage { index, .. }
            | EmbeddingError::ImageTooLarge { index, .. }
            | EmbeddingError::RemoteFetch { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// True for errors caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EmbeddingError::Configuration(_)
                | EmbeddingError::ModelUnavailable(_)
                | EmbeddingError::Inference(_)
        )
    }
}

impl From<CacheError> for EmbeddingError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Unavailable(load) => EmbeddingError::ModelUnavailable(load),
            CacheError::Configuration(config) => EmbeddingError::Configuration(config),
        }
    }
}
