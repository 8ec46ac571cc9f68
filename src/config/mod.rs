// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Every option can be given as a flag or through its `IMBEDDINGS_*`
//! environment variable. A `.env` file is honoured by the binary.

pub mod device;
pub mod limits;

pub use device::{probe_accelerator, resolve_device, Device, DeviceConfig, DevicePreference};
pub use limits::{ConfigError, ResourceLimits};

use clap::Parser;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Hugging Face access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct HubToken(String);

impl HubToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HubToken(***)")
    }
}

impl FromStr for HubToken {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

/// imbeddings service configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "imbeddings")]
#[command(about = "Batch image-embedding service", long_about = None)]
pub struct ServiceConfig {
    /// Compute device: auto, cpu or cuda
    #[arg(long, env = "IMBEDDINGS_DEVICE", default_value = "auto")]
    pub device: String,

    /// Optional share of accelerator memory the service may use, in (0, 1]
    #[arg(long, env = "IMBEDDINGS_CUDA_MEMORY_FRACTION")]
    pub cuda_memory_fraction: Option<f64>,

    #[arg(long, env = "IMBEDDINGS_MAX_LOADED_MODELS", default_value_t = 1)]
    pub max_loaded_models: usize,

    #[arg(long, env = "IMBEDDINGS_MAX_BATCH_SIZE", default_value_t = 4)]
    pub max_batch_size: usize,

    #[arg(long, env = "IMBEDDINGS_MAX_IMAGE_WIDTH", default_value_t = 256)]
    pub max_image_width: u32,

    #[arg(long, env = "IMBEDDINGS_MAX_IMAGE_HEIGHT", default_value_t = 256)]
    pub max_image_height: u32,

    #[arg(long, env = "IMBEDDINGS_MAX_IMAGE_BYTES", default_value_t = 102_400)]
    pub max_image_bytes: usize,

    /// Timeout for fetching remote images, in seconds
    #[arg(long, env = "IMBEDDINGS_REMOTE_IMAGE_REQUEST_TIMEOUT", default_value_t = 10.0)]
    pub remote_image_request_timeout: f64,

    #[arg(long, env = "IMBEDDINGS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "IMBEDDINGS_PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "IMBEDDINGS_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub service_version: String,

    /// Allow-list of model identifiers, one per line
    #[arg(long, env = "IMBEDDINGS_SUPPORTED_MODELS", default_value = "supported_models.txt")]
    pub supported_models: PathBuf,

    /// Token used to download model weights
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<HubToken>,

    /// Local directory for downloaded model files (defaults to the hub cache)
    #[arg(long, env = "IMBEDDINGS_MODEL_CACHE_DIR")]
    pub model_cache_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn resource_limits(&self) -> Result<ResourceLimits, ConfigError> {
        ResourceLimits {
            max_image_width: self.max_image_width,
            max_image_height: self.max_image_height,
            max_image_bytes: self.max_image_bytes,
            max_batch_size: self.max_batch_size,
            max_loaded_models: self.max_loaded_models,
            remote_fetch_timeout_seconds: self.remote_image_request_timeout,
        }
        .validated()
    }

    /// Parses the device preference and checks it against the probe result.
    pub fn device_config(&self, accelerator_available: bool) -> Result<DeviceConfig, ConfigError> {
        let preference: DevicePreference = self.device.parse()?;
        DeviceConfig::new(preference, accelerator_available, self.cuda_memory_fraction)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse::<SocketAddr>()?;
        Ok(addr)
    }
}
