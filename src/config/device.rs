// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Compute device selection

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::limits::{validate_fraction, ConfigError};

/// Configured device preference (`IMBEDDINGS_DEVICE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

impl FromStr for DevicePreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" | "accelerator" => Ok(Self::Accelerator),
            other => Err(ConfigError::UnknownDevice(other.to_string())),
        }
    }
}

/// Device an inference bundle is placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Device policy plus the accelerator probe result taken at process start.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub preference: DevicePreference,
    pub accelerator_available: bool,
    pub cuda_memory_fraction: Option<f64>,
}

impl DeviceConfig {
    pub fn new(
        preference: DevicePreference,
        accelerator_available: bool,
        cuda_memory_fraction: Option<f64>,
    ) -> Result<Self, ConfigError> {
        validate_fraction("cuda_memory_fraction", cuda_memory_fraction)?;
        let config = Self {
            preference,
            accelerator_available,
            cuda_memory_fraction,
        };
        // Forced-but-missing accelerators fail here, before the listener binds.
        config.resolve()?;
        Ok(config)
    }

    /// CPU-only configuration, used by tests and the stub model source.
    pub fn cpu() -> Self {
        Self {
            preference: DevicePreference::Cpu,
            accelerator_available: false,
            cuda_memory_fraction: None,
        }
    }

    pub fn resolve(&self) -> Result<Device, ConfigError> {
        resolve_device(self.preference, self.accelerator_available)
    }
}

pub fn resolve_device(
    preference: DevicePreference,
    accelerator_available: bool,
) -> Result<Device, ConfigError> {
    match preference {
        DevicePreference::Auto if accelerator_available => Ok(Device::Cuda),
        DevicePreference::Auto | DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Accelerator if accelerator_available => Ok(Device::Cuda),
        DevicePreference::Accelerator => Err(ConfigError::AcceleratorUnavailable),
    }
}

/// Asks ONNX Runtime whether the CUDA execution provider can be used.
pub fn probe_accelerator() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => {
            info!("CUDA execution provider available: {}", available);
            available
        }
        Err(e) => {
            debug!("CUDA availability probe failed: {}", e);
            false
        }
    }
}
