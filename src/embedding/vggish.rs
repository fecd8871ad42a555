//! VGGish embeddings through ONNX Runtime.

use std::path::PathBuf;

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;

use super::{frontend::waveform_to_examples, EmbeddingProvider, Postprocessor, Waveform};
use crate::{Result, TagError, EMBEDDING_SIZE};

#[derive(Debug, Clone)]
pub struct VggishConfig {
    /// ONNX export of VGGish taking `[N, 96, 64]` log-mel examples.
    pub model: String,
    /// Safetensors file with `pca_eigen_vectors` and `pca_means`.
    pub pca_params: String,
    pub input_name: String,
    pub num_threads: Option<usize>,
}

impl Default for VggishConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            pca_params: String::new(),
            input_name: "input".into(),
            num_threads: Some(1),
        }
    }
}

/// Loaded VGGish session. Dropping the handle releases the session.
pub struct VggishProvider {
    session: Session,
    postprocessor: Postprocessor,
    input_name: String,
}

impl VggishProvider {
    pub fn new(config: VggishConfig) -> Result<Self> {
        let model_path = PathBuf::from(&config.model);
        if !model_path.exists() {
            return Err(TagError::Embedding(format!(
                "model not found at {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(config.num_threads.unwrap_or(1)))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| TagError::Embedding(format!("failed to load VGGish: {e}")))?;
        let postprocessor = Postprocessor::from_file(&config.pca_params)?;

        tracing::info!("loaded VGGish from {}", model_path.display());
        Ok(Self {
            session,
            postprocessor,
            input_name: config.input_name,
        })
    }

    /// Release the session now rather than at end of scope.
    pub fn close(self) {}
}

impl EmbeddingProvider for VggishProvider {
    fn extract(&mut self, waveform: &Waveform) -> Result<Array2<f32>> {
        let examples = waveform_to_examples(waveform)?;
        let n = examples.dim().0;
        if n == 0 {
            return Ok(Array2::zeros((0, EMBEDDING_SIZE)));
        }

        let input_tensor = Tensor::from_array(examples)
            .map_err(|e| TagError::Embedding(format!("VGGish tensor creation error: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| TagError::Embedding(format!("VGGish inference error: {e}")))?;

        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| TagError::Embedding("VGGish produced no output".into()))?;
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| TagError::Embedding(format!("VGGish output extraction error: {e}")))?;

        let raw = Array2::from_shape_vec((n, EMBEDDING_SIZE), data.to_vec())
            .map_err(|e| TagError::Embedding(format!("unexpected VGGish output: {e}")))?;
        Ok(self.postprocessor.postprocess(raw.view()))
    }
}
