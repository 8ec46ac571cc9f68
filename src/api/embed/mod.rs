// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding API Module
//!
//! This module provides the POST /v1/embeddings endpoint returning CLS and
//! mean-pooled image embeddings.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::embeddings_handler;
pub use request::{EmbeddingInputItem, EmbeddingRequest};
pub use response::{EmbeddingItem, EmbeddingResponse, EmbeddingVectors, Usage};
