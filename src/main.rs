// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use imbeddings::{
    api::{start_server, AppState, ServiceInfo},
    config::{probe_accelerator, ServiceConfig},
    embeddings::EmbeddingPipeline,
    models::{HubModelSource, ModelCache, ModelRegistry},
    version,
    vision::ImageAcquirer,
};
use std::{env, sync::Arc};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let config = ServiceConfig::parse();
    info!("Starting {}", version::get_version_string());

    // Everything below fails before the listener binds
    let limits = Arc::new(config.resource_limits().context("Invalid resource limits")?);

    let device_config = config
        .device_config(probe_accelerator())
        .context("Invalid device configuration")?;
    let device = device_config.resolve()?;
    info!("Compute device: {}", device);
    if let Some(fraction) = device_config.cuda_memory_fraction {
        info!("CUDA memory fraction: {}", fraction);
    }

    let registry = Arc::new(
        ModelRegistry::load(&config.supported_models).context("Failed to load model allow-list")?,
    );

    if config.hf_token.is_none() {
        warn!("HF_TOKEN is not set; model loads will fail until it is provided");
    }
    let source = Arc::new(HubModelSource::new(
        config.hf_token.clone(),
        config.model_cache_dir.clone(),
    ));

    let cache = ModelCache::new(
        registry.clone(),
        source,
        device_config.clone(),
        limits.max_loaded_models,
    )?;
    let acquirer = ImageAcquirer::new(limits.clone()).context("Failed to build HTTP client")?;
    let pipeline = EmbeddingPipeline::new(acquirer, cache);

    let state = AppState::new(
        pipeline,
        ServiceInfo {
            version: config.service_version.clone(),
            device,
            cuda_memory_fraction: device_config.cuda_memory_fraction,
            supported_models: registry.model_ids().iter().map(|m| m.to_string()).collect(),
        },
    );

    let addr = config.bind_addr()?;
    start_server(state, addr, async {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
    })
    .await
}
