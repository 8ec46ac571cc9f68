// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Resource limits applied to every embedding request

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Startup configuration failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be greater than 0 (got {value})")]
    NonPositive { name: &'static str, value: String },

    #[error("{name} is out of range (got {value})")]
    OutOfRange { name: &'static str, value: String },

    #[error("{name} must be within (0.0, 1.0] (got {value})")]
    FractionOutOfRange { name: &'static str, value: f64 },

    #[error("unknown device '{0}', expected one of: auto, cpu, cuda")]
    UnknownDevice(String),

    #[error("device is set to cuda but no CUDA device is available")]
    AcceleratorUnavailable,

    #[error("supported model list not found at {0}")]
    MissingModelList(String),

    #[error("supported model list at {0} defines no models")]
    EmptyModelList(String),

    #[error("failed to read supported model list: {0}")]
    ModelListIo(String),
}

/// Immutable limits record, built once at startup and shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceLimits {
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub max_image_bytes: usize,
    pub max_batch_size: usize,
    pub max_loaded_models: usize,
    pub remote_fetch_timeout_seconds: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_image_width: 256,
            max_image_height: 256,
            max_image_bytes: 102_400,
            max_batch_size: 4,
            max_loaded_models: 1,
            remote_fetch_timeout_seconds: 10.0,
        }
    }
}

impl ResourceLimits {
    /// Consumes the record and returns it only if every field is in range.
    pub fn validated(self) -> Result<Self, ConfigError> {
        positive("max_image_width", self.max_image_width as u64)?;
        positive("max_image_height", self.max_image_height as u64)?;
        positive("max_image_bytes", self.max_image_bytes as u64)?;
        positive("max_batch_size", self.max_batch_size as u64)?;
        positive("max_loaded_models", self.max_loaded_models as u64)?;

        let timeout = self.remote_fetch_timeout_seconds;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "remote_fetch_timeout_seconds",
                value: timeout.to_string(),
            });
        }
        if Duration::try_from_secs_f64(timeout).is_err() {
            return Err(ConfigError::OutOfRange {
                name: "remote_fetch_timeout_seconds",
                value: timeout.to_string(),
            });
        }

        Ok(self)
    }

    /// Saturates at `Duration::MAX` for records that skipped validation.
    pub fn remote_fetch_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.remote_fetch_timeout_seconds).unwrap_or(Duration::MAX)
    }
}

fn positive(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositive {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validates an optional fraction bound such as a device-memory share.
pub fn validate_fraction(name: &'static str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(v > 0.0 && v <= 1.0) => Err(ConfigError::FractionOutOfRange { name, value: v }),
        _ => Ok(()),
    }
}
