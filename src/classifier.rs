//! Multi-level attention classifier over blocks of VGGish embeddings.
//!
//! Three dense + batch-norm + ReLU feature layers feed two attention heads
//! (one on the second layer, one on the third). Each head pools its block to
//! one vector per class; both pooled vectors are concatenated and mapped back
//! to per-class probabilities through a final dense + sigmoid.

use std::path::Path;

use ndarray::{s, Array1, Array2, ArrayView2, ArrayView3, Axis};

use crate::layers::{
    attention_pooling, concat_features, dense, relu, sigmoid, softmax_classes, BatchNorm,
};
use crate::weights::WeightStore;
use crate::{Result, TagError, BLOCK_WINDOW, EMBEDDING_SIZE, HIDDEN_UNITS, NUM_CLASSES};

/// Centre of the quantised embedding scale.
const INPUT_OFFSET: f32 = 128.0;
const INPUT_SCALE: f32 = 128.0;

#[derive(Debug, Clone)]
struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    fn load(store: &WeightStore, prefix: &str, out_dim: usize, in_dim: usize) -> Result<Self> {
        Ok(Self {
            weight: store.matrix(&format!("{prefix}.weight"), out_dim, in_dim)?,
            bias: store.vector(&format!("{prefix}.bias"), out_dim)?,
        })
    }

    fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        dense(x, self.weight.view(), self.bias.view())
    }
}

#[derive(Debug, Clone)]
struct FeatureLayer {
    dense: Dense,
    norm: BatchNorm,
}

impl FeatureLayer {
    fn load(store: &WeightStore, index: usize, in_dim: usize) -> Result<Self> {
        let prefix = format!("embed.{index}");
        let dense = Dense::load(store, &format!("{prefix}.dense"), HIDDEN_UNITS, in_dim)?;
        let bn = |name: &str| store.vector(&format!("{prefix}.bn.{name}"), HIDDEN_UNITS);
        let norm = BatchNorm::new(
            bn("gamma")?.view(),
            bn("beta")?.view(),
            bn("moving_mean")?.view(),
            bn("moving_variance")?.view(),
        );
        Ok(Self { dense, norm })
    }

    // Dropout follows ReLU during training and is the identity here.
    fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        relu(self.norm.forward(self.dense.forward(x)))
    }
}

#[derive(Debug, Clone)]
struct AttentionHead {
    cla: Dense,
    att: Dense,
}

impl AttentionHead {
    fn load(store: &WeightStore, index: usize) -> Result<Self> {
        Ok(Self {
            cla: Dense::load(store, &format!("heads.{index}.cla"), NUM_CLASSES, HIDDEN_UNITS)?,
            att: Dense::load(store, &format!("heads.{index}.att"), NUM_CLASSES, HIDDEN_UNITS)?,
        })
    }

    /// `features` stacks `blocks * window` rows; returns `[blocks, classes]`.
    fn forward(&self, features: ArrayView2<f32>, window: usize) -> Array2<f32> {
        let cla = sigmoid(self.cla.forward(features));
        let att = softmax_classes(self.att.forward(features));

        let blocks = features.nrows() / window;
        let mut pooled = Array2::<f32>::zeros((blocks, NUM_CLASSES));
        for (b, mut row) in pooled.axis_iter_mut(Axis(0)).enumerate() {
            let (start, end) = (b * window, (b + 1) * window);
            row.assign(&attention_pooling(
                cla.slice(s![start..end, ..]),
                att.slice(s![start..end, ..]),
            ));
        }
        pooled
    }
}

/// Frozen classifier weights. Immutable after loading and safe to share.
#[derive(Debug, Clone)]
pub struct AttentionClassifier {
    layers: [FeatureLayer; 3],
    heads: [AttentionHead; 2],
    fusion: Dense,
}

impl AttentionClassifier {
    pub fn from_store(store: &WeightStore) -> Result<Self> {
        let layers = [
            FeatureLayer::load(store, 0, EMBEDDING_SIZE)?,
            FeatureLayer::load(store, 1, HIDDEN_UNITS)?,
            FeatureLayer::load(store, 2, HIDDEN_UNITS)?,
        ];
        let heads = [AttentionHead::load(store, 0)?, AttentionHead::load(store, 1)?];
        let fusion = Dense::load(store, "fusion", NUM_CLASSES, 2 * NUM_CLASSES)?;
        Ok(Self {
            layers,
            heads,
            fusion,
        })
    }

    /// Probabilities `[N, NUM_CLASSES]` for blocks `[N, BLOCK_WINDOW, EMBEDDING_SIZE]`
    /// on the 0..=255 quantised embedding scale.
    pub fn predict(&self, blocks: ArrayView3<f32>) -> Result<Array2<f32>> {
        let (n, window, features) = blocks.dim();
        if window != BLOCK_WINDOW || features != EMBEDDING_SIZE {
            return Err(TagError::InvalidConfig(format!(
                "classifier expects blocks of [{BLOCK_WINDOW}, {EMBEDDING_SIZE}], got [{window}, {features}]"
            )));
        }
        if n == 0 {
            return Ok(Array2::zeros((0, NUM_CLASSES)));
        }

        let x = blocks
            .to_shape((n * window, features))
            .map_err(|e| TagError::InvalidConfig(e.to_string()))?
            .mapv(|v| (v - INPUT_OFFSET) / INPUT_SCALE);

        let a1 = self.layers[0].forward(x.view());
        let a2 = self.layers[1].forward(a1.view());
        let a3 = self.layers[2].forward(a2.view());

        let out1 = self.heads[0].forward(a2.view(), window);
        let out2 = self.heads[1].forward(a3.view(), window);

        let mut fused = Array2::<f32>::zeros((n, 2 * NUM_CLASSES));
        for (b, mut row) in fused.axis_iter_mut(Axis(0)).enumerate() {
            row.assign(&concat_features(out1.row(b), out2.row(b)));
        }

        let probabilities = sigmoid(self.fusion.forward(fused.view()));
        tracing::debug!("predicted {} blocks", n);
        Ok(probabilities)
    }
}

/// Load the fixed architecture from a safetensors weights artifact.
pub fn build_classifier<P: AsRef<Path>>(weights: P) -> Result<AttentionClassifier> {
    let store = WeightStore::open(weights)?;
    let classifier = AttentionClassifier::from_store(&store)?;
    tracing::info!("loaded attention classifier from {}", store.path().display());
    Ok(classifier)
}

pub fn predict(model: &AttentionClassifier, blocks: ArrayView3<f32>) -> Result<Array2<f32>> {
    model.predict(blocks)
}
