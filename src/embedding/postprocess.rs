//! PCA whitening and 8-bit quantisation of raw VGGish embeddings.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};

use crate::weights::WeightStore;
use crate::{Result, TagError, EMBEDDING_SIZE};

pub const QUANTIZE_MIN_VAL: f32 = -2.0;
pub const QUANTIZE_MAX_VAL: f32 = 2.0;

pub const PCA_EIGEN_VECTORS: &str = "pca_eigen_vectors";
pub const PCA_MEANS: &str = "pca_means";

#[derive(Debug, Clone)]
pub struct Postprocessor {
    eigen_vectors: Array2<f32>,
    means: Array1<f32>,
}

impl Postprocessor {
    pub fn new(eigen_vectors: Array2<f32>, means: Array1<f32>) -> Result<Self> {
        if eigen_vectors.dim() != (EMBEDDING_SIZE, EMBEDDING_SIZE) || means.len() != EMBEDDING_SIZE {
            return Err(TagError::weight_load(
                "<pca params>",
                format!(
                    "expected {EMBEDDING_SIZE}x{EMBEDDING_SIZE} eigenvectors and {EMBEDDING_SIZE} means, got {:?} and {}",
                    eigen_vectors.dim(),
                    means.len()
                ),
            ));
        }
        Ok(Self {
            eigen_vectors,
            means,
        })
    }

    /// Load `pca_eigen_vectors` `[128, 128]` and `pca_means` (`[128]` or `[128, 1]`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = WeightStore::open(path)?;
        let eigen_vectors = store.matrix(PCA_EIGEN_VECTORS, EMBEDDING_SIZE, EMBEDDING_SIZE)?;
        let means = store.tensor_f32(PCA_MEANS)?;
        if means.data.len() != EMBEDDING_SIZE {
            return Err(TagError::weight_load(
                store.path().display(),
                format!("{PCA_MEANS} has shape {:?}", means.shape),
            ));
        }
        Self::new(eigen_vectors, Array1::from_vec(means.data))
    }

    /// `[T, 128]` raw embeddings to `[T, 128]` integers in 0..=255 (as f32).
    pub fn postprocess(&self, embeddings: ArrayView2<f32>) -> Array2<f32> {
        let centered = &embeddings - &self.means;
        let projected = centered.dot(&self.eigen_vectors.t());
        let scale = 255.0 / (QUANTIZE_MAX_VAL - QUANTIZE_MIN_VAL);
        projected.mapv(|v| {
            let clipped = v.clamp(QUANTIZE_MIN_VAL, QUANTIZE_MAX_VAL);
            ((clipped - QUANTIZE_MIN_VAL) * scale).floor()
        })
    }
}
