// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod embed;
pub mod errors;
pub mod http_server;

pub use embed::{embeddings_handler, EmbeddingRequest, EmbeddingResponse};
pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use http_server::{create_router, start_server, AppState, InfoResponse, ServiceInfo};
