// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::embeddings::EmbeddingError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    InvalidRequest(String),
    ValidationError {
        field: String,
        message: String,
    },
    UnsupportedModel {
        model: String,
        available_models: Vec<String>,
    },
    InvalidImage {
        index: usize,
        message: String,
    },
    ImageTooLarge {
        index: usize,
        message: String,
    },
    RemoteFetch {
        index: usize,
        message: String,
    },
    ServiceUnavailable(String),
    InternalError(String),
}

fn index_details(index: usize) -> HashMap<String, serde_json::Value> {
    let mut details = HashMap::new();
    details.insert("index".to_string(), serde_json::Value::Number(index.into()));
    details
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message, details) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), Some(details))
            }
            ApiError::UnsupportedModel {
                model,
                available_models,
            } => {
                let mut details = HashMap::new();
                details.insert(
                    "available_models".to_string(),
                    serde_json::Value::Array(
                        available_models
                            .iter()
                            .map(|m| serde_json::Value::String(m.clone()))
                            .collect(),
                    ),
                );
                (
                    "unsupported_model",
                    format!("Model '{}' is not supported", model),
                    Some(details),
                )
            }
            ApiError::InvalidImage { index, message } => (
                "invalid_image",
                format!("Invalid image at index {}: {}", index, message),
                Some(index_details(*index)),
            ),
            ApiError::ImageTooLarge { index, message } => (
                "image_too_large",
                format!("Image too large at index {}: {}", index, message),
                Some(index_details(*index)),
            ),
            ApiError::RemoteFetch { index, message } => (
                "remote_fetch_failed",
                format!("Failed to fetch image at index {}: {}", index, message),
                Some(index_details(*index)),
            ),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None),
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::ValidationError { .. }
            | ApiError::UnsupportedModel { .. }
            | ApiError::InvalidImage { .. }
            | ApiError::ImageTooLarge { .. }
            | ApiError::RemoteFetch { .. } => 400,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::InternalError(_) => 500,
        }
    }

    /// Maps a pipeline error; `available_models` fills unsupported-model details.
    pub fn from_embedding(error: EmbeddingError, available_models: &[String]) -> Self {
        match error {
            EmbeddingError::InvalidRequest(msg) => ApiError::InvalidRequest(msg),
            EmbeddingError::UnsupportedModel(unsupported) => ApiError::UnsupportedModel {
                model: unsupported.0,
                available_models: available_models.to_vec(),
            },
            EmbeddingError::InvalidImage { index, source } => ApiError::InvalidImage {
                index,
                message: source.to_string(),
            },
            EmbeddingError::ImageTooLarge { index, source } => ApiError::ImageTooLarge {
                index,
                message: source.to_string(),
            },
            EmbeddingError::RemoteFetch { index, source } => ApiError::RemoteFetch {
                index,
                message: source.to_string(),
            },
            EmbeddingError::ModelUnavailable(e) => ApiError::ServiceUnavailable(e.to_string()),
            EmbeddingError::Configuration(e) => ApiError::InternalError(e.to_string()),
            EmbeddingError::Inference(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<EmbeddingError> for ApiError {
    fn from(error: EmbeddingError) -> Self {
        ApiError::from_embedding(error, &[])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::UnsupportedModel { model, .. } => {
                write!(f, "Model '{}' is not supported", model)
            }
            ApiError::InvalidImage { index, message } => {
                write!(f, "Invalid image at index {}: {}", index, message)
            }
            ApiError::ImageTooLarge { index, message } => {
                write!(f, "Image too large at index {}: {}", index, message)
            }
            ApiError::RemoteFetch { index, message } => {
                write!(f, "Failed to fetch image at index {}: {}", index, message)
            }
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// [`ApiError`] tagged with the request id it belongs to
#[derive(Debug)]
pub struct ApiErrorResponse {
    pub error: ApiError,
    pub request_id: Option<String>,
}

impl From<ApiError> for ApiErrorResponse {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.error.to_response(self.request_id);

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiErrorResponse::from(self).into_response()
    }
}
