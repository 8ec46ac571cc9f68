// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::embed::embeddings_handler;
use crate::config::{Device, ResourceLimits};
use crate::embeddings::EmbeddingPipeline;
use crate::models::CacheStats;
use crate::version;

pub const SERVICE_NAME: &str = "imbeddings";

/// Static facts reported by `/info`
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub version: String,
    pub device: Device,
    pub cuda_memory_fraction: Option<f64>,
    pub supported_models: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<EmbeddingPipeline>,
    pub info: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(pipeline: EmbeddingPipeline, info: ServiceInfo) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            info: Arc::new(info),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub service: &'static str,
    pub version: String,
    pub features: &'static [&'static str],
    pub device: Device,
    pub cuda_memory_fraction: Option<f64>,
    #[serde(flatten)]
    pub limits: ResourceLimits,
    pub supported_models: Vec<String>,
    pub loaded_models: Vec<String>,
    pub cache: CacheStats,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/v1/embeddings", post(embeddings_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_server<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    let cache = state.pipeline.cache();
    let loaded_models = cache
        .resident_models()
        .await
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    Json(InfoResponse {
        service: SERVICE_NAME,
        version: state.info.version.clone(),
        features: version::FEATURES,
        device: state.info.device,
        cuda_memory_fraction: state.info.cuda_memory_fraction,
        limits: state.pipeline.limits().as_ref().clone(),
        supported_models: state.info.supported_models.clone(),
        loaded_models,
        cache: cache.stats().await,
    })
}
