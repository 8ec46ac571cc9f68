// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Allow-list of servable model identifiers
//!
//! The list is a plain text file, one identifier per line. Blank lines and
//! lines starting with `#` are skipped; anything after a `#` is a comment.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::config::ConfigError;

const COMMENT_MARKER: char = '#';

/// A model identifier that passed registry validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Requested identifier is not on the allow-list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Model '{0}' is not supported")]
pub struct UnsupportedModel(pub String);

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelId>,
    index: HashSet<String>,
}

impl ModelRegistry {
    /// Reads the allow-list once at startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::MissingModelList(path.display().to_string()));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ModelListIo(format!("{}: {}", path.display(), e)))?;

        let registry = Self::parse(&text)
            .map_err(|_| ConfigError::EmptyModelList(path.display().to_string()))?;

        info!(
            "Loaded {} supported models from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parses allow-list text. Duplicate lines collapse to one entry.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut models = Vec::new();
        let mut index = HashSet::new();

        for line in text.lines() {
            let entry = match line.split_once(COMMENT_MARKER) {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            if entry.is_empty() {
                continue;
            }
            if index.insert(entry.to_string()) {
                models.push(ModelId(entry.to_string()));
            }
        }

        if models.is_empty() {
            return Err(ConfigError::EmptyModelList("<inline>".to_string()));
        }

        Ok(Self { models, index })
    }

    /// Exact-match lookup; no trimming or case folding.
    pub fn resolve(&self, identifier: &str) -> Result<ModelId, UnsupportedModel> {
        if self.index.contains(identifier) {
            Ok(ModelId(identifier.to_string()))
        } else {
            Err(UnsupportedModel(identifier.to_string()))
        }
    }

    pub fn model_ids(&self) -> &[ModelId] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
