//! Seeded classifier weights and embeddings shared by the integration tests.
#![allow(dead_code)]

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use safetensors::tensor::{serialize_to_file, Dtype, View};
use vggish_tag::{EMBEDDING_SIZE, HIDDEN_UNITS, NUM_CLASSES};

pub const WEIGHTS_SEED: u64 = 2024;
pub const EMBEDDINGS_SEED: u64 = 30;

/// SplitMix64; every draw is exactly representable as f32.
pub struct SplitMix64(u64);

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1) with 24 bits.
    pub fn unit(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform in [-scale, scale) for a power-of-two `scale`.
    pub fn symmetric(&mut self, scale: f32) -> f32 {
        (2.0 * self.unit() - 1.0) * scale
    }
}

struct F32Tensor {
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl View for F32Tensor {
    fn dtype(&self) -> Dtype {
        Dtype::F32
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.data)
    }

    fn data_len(&self) -> usize {
        self.data.len()
    }
}

struct FixtureBuilder {
    rng: SplitMix64,
    tensors: Vec<(String, F32Tensor)>,
}

impl FixtureBuilder {
    fn push(&mut self, name: String, shape: Vec<usize>, mut draw: impl FnMut(&mut SplitMix64) -> f32) {
        let len: usize = shape.iter().product();
        let data = (0..len)
            .flat_map(|_| draw(&mut self.rng).to_le_bytes())
            .collect();
        self.tensors.push((name, F32Tensor { shape, data }));
    }
}

/// Tensor list in generation order. The same draw order reproduces the
/// committed regression fixture.
///
/// `attention_bias` scales the attention biases; large values push most
/// class-axis softmax weights below the attention floor.
fn fixture_tensors(seed: u64, attention_bias: f32) -> Vec<(String, F32Tensor)> {
    let mut b = FixtureBuilder {
        rng: SplitMix64::new(seed),
        tensors: Vec::new(),
    };

    for layer in 0..3 {
        let (in_dim, scale) = if layer == 0 {
            (EMBEDDING_SIZE, 0.125)
        } else {
            (HIDDEN_UNITS, 0.0625)
        };
        let p = format!("embed.{layer}");
        b.push(format!("{p}.dense.weight"), vec![HIDDEN_UNITS, in_dim], |r| r.symmetric(scale));
        b.push(format!("{p}.dense.bias"), vec![HIDDEN_UNITS], |r| r.symmetric(0.0625));
        b.push(format!("{p}.bn.gamma"), vec![HIDDEN_UNITS], |r| 0.75 + 0.5 * r.unit());
        b.push(format!("{p}.bn.beta"), vec![HIDDEN_UNITS], |r| r.symmetric(1.0));
        b.push(format!("{p}.bn.moving_mean"), vec![HIDDEN_UNITS], |r| r.symmetric(1.0));
        b.push(format!("{p}.bn.moving_variance"), vec![HIDDEN_UNITS], |r| 0.5 + r.unit());
    }
    for head in 0..2 {
        for kind in ["cla", "att"] {
            let p = format!("heads.{head}.{kind}");
            b.push(format!("{p}.weight"), vec![NUM_CLASSES, HIDDEN_UNITS], |r| r.symmetric(0.0625));
            let scale = if kind == "att" { attention_bias } else { 1.0 };
            b.push(format!("{p}.bias"), vec![NUM_CLASSES], |r| r.symmetric(scale));
        }
    }
    b.push("fusion.weight".into(), vec![NUM_CLASSES, 2 * NUM_CLASSES], |r| r.symmetric(1.0));
    b.push("fusion.bias".into(), vec![NUM_CLASSES], |r| 0.25 * r.unit() - 21.0);
    b.tensors
}

pub fn write_weights(path: &Path) {
    write_weights_with_attention_bias(path, 1.0);
}

/// Fixture weights with attention biases drawn from `[-scale, scale)`.
pub fn write_weights_with_attention_bias(path: &Path, scale: f32) {
    serialize_to_file(fixture_tensors(WEIGHTS_SEED, scale), &None, path)
        .expect("write weights fixture");
}

/// Same tensors with one of them dropped.
pub fn write_weights_without(path: &Path, missing: &str) {
    let tensors = fixture_tensors(WEIGHTS_SEED, 1.0)
        .into_iter()
        .filter(|(name, _)| name != missing);
    serialize_to_file(tensors, &None, path).expect("write weights fixture");
}

/// Same tensors with `name` replaced by a wrongly shaped zero tensor.
pub fn write_weights_reshaped(path: &Path, name: &str, shape: Vec<usize>) {
    let len: usize = shape.iter().product();
    let tensors = fixture_tensors(WEIGHTS_SEED, 1.0).into_iter().map(|(n, t)| {
        if n == name {
            let data = vec![0u8; len * 4];
            (n, F32Tensor { shape: shape.clone(), data })
        } else {
            (n, t)
        }
    });
    serialize_to_file(tensors, &None, path).expect("write weights fixture");
}

/// `frames` quantised embeddings with integer values in 0..=255.
pub fn embeddings(frames: usize, seed: u64) -> Array2<f32> {
    let mut rng = SplitMix64::new(seed);
    Array2::from_shape_simple_fn((frames, EMBEDDING_SIZE), || (rng.next_u64() >> 56) as f32)
}

/// `class_labels_indices.csv`-style table naming class `i` "class {i}".
pub fn write_labels(path: &Path) {
    let mut csv = String::from("index,mid,display_name\n");
    for i in 0..NUM_CLASSES {
        csv.push_str(&format!("{i},/m/{i:05},\"class {i}\"\n"));
    }
    std::fs::write(path, csv).expect("write labels fixture");
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub weights: PathBuf,
    pub labels: PathBuf,
}

pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let weights = dir.path().join("attention.safetensors");
    let labels = dir.path().join("class_labels_indices.csv");
    write_weights(&weights);
    write_labels(&labels);
    Fixture {
        dir,
        weights,
        labels,
    }
}
