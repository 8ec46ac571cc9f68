// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for imbeddings

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "cls-embeddings",
    "mean-embeddings",
    "l2-normalization",
    "remote-images",
    "inline-base64-images",
    "lru-model-cache",
    "cuda-auto-detect",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("imbeddings {}", VERSION_NUMBER)
}
