// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! CLS / mean pooling over per-token hidden states

use ndarray::{s, Array2, Array3, Axis};

/// Lower bound on the norm used when normalizing
pub const NORM_EPS: f32 = 1e-12;

/// Pooled vectors for a batch, one row per image
#[derive(Debug, Clone, PartialEq)]
pub struct PooledEmbeddings {
    pub cls: Array2<f32>,
    pub mean: Array2<f32>,
}

impl PooledEmbeddings {
    pub fn embedding_dim(&self) -> usize {
        self.cls.ncols()
    }

    pub fn len(&self) -> usize {
        self.cls.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.cls.nrows() == 0
    }
}

/// First token of every sequence
pub fn cls_pool(hidden: &Array3<f32>) -> Array2<f32> {
    hidden.slice(s![.., 0, ..]).to_owned()
}

/// Mean over every token except the first. `None` with fewer than two tokens.
pub fn mean_pool(hidden: &Array3<f32>) -> Option<Array2<f32>> {
    if hidden.len_of(Axis(1)) < 2 {
        return None;
    }
    hidden.slice(s![.., 1.., ..]).mean_axis(Axis(1))
}

/// Scales each row to unit length; all-zero rows stay zero.
pub fn l2_normalize_rows(mut vectors: Array2<f32>) -> Array2<f32> {
    for mut row in vectors.rows_mut() {
        let norm = row.dot(&row).sqrt().max(NORM_EPS);
        row.mapv_inplace(|v| v / norm);
    }
    vectors
}

/// CLS and mean pooling, both L2-normalized
pub fn pool_hidden_states(hidden: &Array3<f32>) -> Option<PooledEmbeddings> {
    let mean = mean_pool(hidden)?;
    Some(PooledEmbeddings {
        cls: l2_normalize_rows(cls_pool(hidden)),
        mean: l2_normalize_rows(mean),
    })
}
