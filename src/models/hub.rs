// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hugging Face Hub model source backed by ONNX Runtime
//!
//! Each model repository must ship `preprocessor_config.json` and an ONNX
//! export of the vision encoder at `onnx/model.onnx` whose first output is
//! the last hidden state `[batch, tokens, hidden]`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hf_hub::api::tokio::{ApiBuilder, ApiError};
use ndarray::{Array3, Array4, Ix3};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::registry::ModelId;
use super::source::{InferenceBundle, ModelLoadError, ModelSource, VisionEncoder};
use crate::config::{Device, HubToken};
use crate::vision::{HubImageProcessor, PreprocessorConfig};

const PREPROCESSOR_FILE: &str = "preprocessor_config.json";
const ONNX_MODEL_FILE: &str = "onnx/model.onnx";
const INTRA_THREADS: usize = 4;

/// Vision encoder running an ONNX session
pub struct OnnxVisionEncoder {
    session: Arc<Mutex<Session>>,
    input_name: String,
}

impl OnnxVisionEncoder {
    /// Builds a session on `device`. A CUDA session that fails to initialise
    /// falls back to CPU; the returned device says which one was used.
    pub fn load(model_path: &Path, device: Device) -> Result<(Self, Device)> {
        if !model_path.exists() {
            anyhow::bail!("ONNX model not found: {}", model_path.display());
        }

        let (session, device) = match device {
            Device::Cuda => match build_session(model_path, Device::Cuda) {
                Ok(session) => (session, Device::Cuda),
                Err(e) => {
                    warn!("CUDA execution provider failed: {}", e);
                    warn!("Falling back to CPU execution provider");
                    (build_session(model_path, Device::Cpu)?, Device::Cpu)
                }
            },
            Device::Cpu => (build_session(model_path, Device::Cpu)?, Device::Cpu),
        };

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());

        debug!("Vision encoder input: {}", input_name);

        Ok((
            Self {
                session: Arc::new(Mutex::new(session)),
                input_name,
            },
            device,
        ))
    }
}

fn build_session(model_path: &Path, device: Device) -> Result<Session> {
    let builder = Session::builder().context("Failed to create session builder")?;
    let builder = match device {
        Device::Cuda => builder
            .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
            .context("Failed to set CUDA execution provider")?,
        Device::Cpu => builder
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?,
    };

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(INTRA_THREADS)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))
}

impl VisionEncoder for OnnxVisionEncoder {
    fn forward(&self, pixel_values: Array4<f32>) -> Result<Array3<f32>> {
        let shape = pixel_values.shape().to_vec();
        if shape.len() != 4 || shape[1] != 3 {
            anyhow::bail!("Invalid input shape: {:?}, expected [N, 3, H, W]", shape);
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Encoder session lock poisoned"))?;

        let input_value =
            Value::from_array(pixel_values).context("Failed to create input tensor")?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Encoder inference failed")?;

        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        debug!("Encoder output shape: {:?}", hidden.shape());

        let hidden = hidden
            .into_dimensionality::<Ix3>()
            .context("Encoder output is not [batch, tokens, hidden]")?;

        Ok(hidden.to_owned())
    }
}

/// Downloads models from the Hugging Face Hub
#[derive(Debug, Clone)]
pub struct HubModelSource {
    token: Option<HubToken>,
    cache_dir: Option<PathBuf>,
}

impl HubModelSource {
    pub fn new(token: Option<HubToken>, cache_dir: Option<PathBuf>) -> Self {
        Self { token, cache_dir }
    }

    async fn fetch(&self, model_id: &ModelId) -> Result<(PathBuf, PathBuf), ModelLoadError> {
        let token = self
            .token
            .as_ref()
            .filter(|t| !t.expose().is_empty())
            .ok_or(ModelLoadError::MissingCredentials)?;

        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(Some(token.expose().to_string()));
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }

        let api = builder
            .build()
            .map_err(|e| ModelLoadError::Other(e.to_string()))?;
        let repo = api.model(model_id.to_string());

        let config_path = repo
            .get(PREPROCESSOR_FILE)
            .await
            .map_err(|e| map_hub_error(model_id, e))?;
        let model_path = repo
            .get(ONNX_MODEL_FILE)
            .await
            .map_err(|e| map_hub_error(model_id, e))?;

        Ok((config_path, model_path))
    }
}

#[async_trait]
impl ModelSource for HubModelSource {
    async fn load(
        &self,
        model_id: &ModelId,
        device: Device,
    ) -> Result<InferenceBundle, ModelLoadError> {
        let (config_path, model_path) = self.fetch(model_id).await?;
        info!("Fetched weights for {}: {}", model_id, model_path.display());

        let bundle_id = model_id.clone();
        tokio::task::spawn_blocking(move || {
            let config = PreprocessorConfig::from_file(&config_path)
                .map_err(|e| ModelLoadError::Other(format!("{:#}", e)))?;
            let (encoder, placed_on) = OnnxVisionEncoder::load(&model_path, device)
                .map_err(|e| ModelLoadError::Other(format!("{:#}", e)))?;

            Ok(InferenceBundle {
                model_id: bundle_id,
                preprocessor: Arc::new(HubImageProcessor::new(config)),
                encoder: Arc::new(encoder),
                device: placed_on,
            })
        })
        .await
        .map_err(|e| ModelLoadError::Other(format!("model build task failed: {}", e)))?
    }
}

fn map_hub_error(model_id: &ModelId, error: ApiError) -> ModelLoadError {
    match error {
        ApiError::RequestError(e) => match e.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => ModelLoadError::Unauthorized,
            Some(404) => ModelLoadError::NotFound(model_id.to_string()),
            Some(code) => ModelLoadError::Unreachable(format!("model source returned {}", code)),
            None => ModelLoadError::Unreachable(e.without_url().to_string()),
        },
        other => ModelLoadError::Other(other.to_string()),
    }
}
