// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request body for POST /v1/embeddings

use crate::api::ApiError;
use crate::embeddings::ImageInput;
use serde::{Deserialize, Serialize};

/// One image in the request. Exactly one of `image_url` / `image_base64`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingInputItem {
    /// Input type, only "image" is accepted
    #[serde(rename = "type", default = "default_input_type")]
    pub input_type: String,

    /// Base64 image data or a data URI
    #[serde(default)]
    pub image_base64: Option<String>,

    /// HTTP(S) URL to an image
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_input_type() -> String {
    "image".to_string()
}

impl EmbeddingInputItem {
    fn has_url(&self) -> bool {
        self.image_url.as_deref().is_some_and(|s| !s.is_empty())
    }

    fn has_base64(&self) -> bool {
        self.image_base64.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl From<&EmbeddingInputItem> for ImageInput {
    fn from(item: &EmbeddingInputItem) -> Self {
        ImageInput {
            image_url: item.image_url.clone(),
            image_base64: item.image_base64.clone(),
        }
    }
}

/// Request body for POST /v1/embeddings
///
/// # Example
/// ```json
/// {
///   "model": "google/vit-base-patch16-224-in21k",
///   "input": [
///     {"image_url": "https://example.com/cat.png"},
///     {"type": "image", "image_base64": "data:image/png;base64,iVBOR..."}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<EmbeddingInputItem>,
}

impl EmbeddingRequest {
    /// Schema checks. Batch size and model membership are left to the pipeline.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.model.is_empty() {
            return Err(ApiError::ValidationError {
                field: "model".to_string(),
                message: "model is required".to_string(),
            });
        }

        for (index, item) in self.input.iter().enumerate() {
            if item.input_type != "image" {
                return Err(ApiError::ValidationError {
                    field: format!("input[{}].type", index),
                    message: format!("unsupported input type '{}'", item.input_type),
                });
            }
            if item.has_url() == item.has_base64() {
                return Err(ApiError::ValidationError {
                    field: format!("input[{}]", index),
                    message: "Provide exactly one of image_base64 or image_url".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn image_inputs(&self) -> Vec<ImageInput> {
        self.input.iter().map(ImageInput::from).collect()
    }
}
