// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /v1/embeddings HTTP handler

use axum::{extract::State, Json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::request::EmbeddingRequest;
use super::response::EmbeddingResponse;
use crate::api::errors::{ApiError, ApiErrorResponse};
use crate::api::http_server::AppState;

/// POST /v1/embeddings - CLS and mean embeddings for a batch of images
///
/// # Errors
/// - 400 Bad Request: schema violation, batch too large, unsupported model,
///   undecodable/oversized image or failed remote fetch (with the input index)
/// - 503 Service Unavailable: model weights could not be loaded
/// - 500 Internal Server Error: inference failed
pub async fn embeddings_handler(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    debug!(
        "[{}] Embedding request: model={}, {} inputs",
        request_id,
        request.model,
        request.input.len()
    );

    let reject = |error: ApiError| {
        warn!("[{}] Embedding request failed: {}", request_id, error);
        ApiErrorResponse {
            error,
            request_id: Some(request_id.clone()),
        }
    };

    request.validate().map_err(reject)?;

    let batch = state
        .pipeline
        .create_embeddings_from_fields(&request.model, &request.image_inputs())
        .await
        .map_err(|e| reject(ApiError::from_embedding(e, &state.info.supported_models)))?;

    info!(
        "[{}] Returned {} embeddings ({}D)",
        request_id,
        batch.embeddings.len(),
        batch.embedding_dim
    );

    Ok(Json(EmbeddingResponse::from(batch)))
}
