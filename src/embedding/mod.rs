//! Waveform to per-second embedding sequence.
//!
//! The classifier only needs `[T, EMBEDDING_SIZE]` quantised embeddings. Anything
//! producing them can be plugged in through [`EmbeddingProvider`]; the VGGish
//! frontend and postprocessor live here, the ONNX-backed network behind the
//! `vggish` feature.

pub mod frontend;
pub mod postprocess;
#[cfg(feature = "vggish")]
pub mod vggish;

use ndarray::Array2;

use crate::Result;

pub use frontend::waveform_to_examples;
pub use postprocess::Postprocessor;
#[cfg(feature = "vggish")]
pub use vggish::{VggishConfig, VggishProvider};

/// Decoded audio, samples interleaved by channel in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Average of all channels per frame.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// Load-once, query-many source of `[T, EMBEDDING_SIZE]` embeddings on the 0..=255 scale.
pub trait EmbeddingProvider {
    fn extract(&mut self, waveform: &Waveform) -> Result<Array2<f32>>;
}

impl<F> EmbeddingProvider for F
where
    F: FnMut(&Waveform) -> Result<Array2<f32>>,
{
    fn extract(&mut self, waveform: &Waveform) -> Result<Array2<f32>> {
        self(waveform)
    }
}
