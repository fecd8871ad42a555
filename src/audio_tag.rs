use std::path::{Path, PathBuf};

use ndarray::ArrayView2;

use crate::block::block;
use crate::classifier::{build_classifier, AttentionClassifier};
use crate::embedding::{EmbeddingProvider, Waveform};
use crate::labels::{
    extract_labels, resolve_names, BlockLabels, LabelTable, DEFAULT_LABEL_COLUMN,
    DEFAULT_THRESHOLD,
};
use crate::{read_audio_file, Result, TagError, BLOCK_WINDOW, EMBEDDING_HOP_SECONDS};

#[derive(Debug, Clone)]
pub struct AudioTagConfig {
    /// Safetensors weights of the attention classifier.
    pub weights: String,
    /// CSV class table, one row per class in index order.
    pub labels: String,
    pub label_column: String,
    pub window: usize,
    pub hop: usize,
    pub threshold: f32,
}

impl Default for AudioTagConfig {
    fn default() -> Self {
        Self {
            weights: String::new(),
            labels: String::new(),
            label_column: DEFAULT_LABEL_COLUMN.into(),
            window: BLOCK_WINDOW,
            hop: 1,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Classifier and label table loaded once, reused for any number of inputs.
#[derive(Debug, Clone)]
pub struct AudioTag {
    classifier: AttentionClassifier,
    labels: LabelTable,
    config: AudioTagConfig,
}

impl AudioTag {
    pub fn new(config: AudioTagConfig) -> Result<Self> {
        if config.window != BLOCK_WINDOW {
            return Err(TagError::InvalidConfig(format!(
                "the classifier was trained on windows of {BLOCK_WINDOW}, got {}",
                config.window
            )));
        }
        if config.hop == 0 || config.hop > config.window {
            return Err(TagError::InvalidConfig(format!(
                "hop must be in 1..={}, got {}",
                config.window, config.hop
            )));
        }

        let weights = PathBuf::from(&config.weights);
        let classifier = build_classifier(&weights)?;
        let labels = LabelTable::from_csv(&config.labels, &config.label_column)?;
        Ok(Self::from_parts(classifier, labels, config))
    }

    pub fn from_parts(
        classifier: AttentionClassifier,
        labels: LabelTable,
        config: AudioTagConfig,
    ) -> Self {
        Self {
            classifier,
            labels,
            config,
        }
    }

    pub fn config(&self) -> &AudioTagConfig {
        &self.config
    }

    /// Active class indices per block of a `[T, 128]` embedding sequence.
    pub fn compute_indices(&self, embeddings: ArrayView2<f32>) -> Result<BlockLabels<usize>> {
        let blocks = block(embeddings, self.config.window, self.config.hop)?;
        let probabilities = self.classifier.predict(blocks.view())?;
        Ok(extract_labels(probabilities.view(), self.config.threshold))
    }

    /// Label names per block of a `[T, 128]` embedding sequence.
    pub fn compute(&self, embeddings: ArrayView2<f32>) -> Result<BlockLabels<String>> {
        let indices = self.compute_indices(embeddings)?;
        resolve_names(&self.labels, &indices)
    }

    pub fn compute_waveform<E: EmbeddingProvider>(
        &self,
        provider: &mut E,
        waveform: &Waveform,
    ) -> Result<BlockLabels<String>> {
        let embeddings = provider.extract(waveform)?;
        tracing::debug!("{} embeddings extracted", embeddings.nrows());
        self.compute(embeddings.view())
    }

    pub fn compute_file<E: EmbeddingProvider, P: AsRef<Path>>(
        &self,
        provider: &mut E,
        path: P,
    ) -> Result<BlockLabels<String>> {
        let waveform = read_audio_file(path)?;
        self.compute_waveform(provider, &waveform)
    }

    /// Offset in seconds of the first embedding of block `index`.
    pub fn block_start_seconds(&self, index: usize) -> f32 {
        (index * self.config.hop) as f32 * EMBEDDING_HOP_SECONDS
    }
}
