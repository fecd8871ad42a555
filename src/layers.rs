//! Inference layers used by the attention classifier.
//!
//! Every function takes and returns plain arrays; rows are time steps
//! (possibly of several blocks stacked together), columns are features or classes.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Numeric floor/ceiling applied to attention weights before normalisation.
pub const ATTENTION_EPSILON: f32 = 1e-7;
/// Batch-norm variance epsilon of the trained model.
pub const BATCH_NORM_EPSILON: f32 = 1e-3;

/// Fully connected layer: `y = x * W^T + b`.
///
/// Shapes:
/// - `input`: `[rows, in_dim]`
/// - `weight`: `[out_dim, in_dim]`
/// - output: `[rows, out_dim]`
pub fn dense(input: ArrayView2<f32>, weight: ArrayView2<f32>, bias: ArrayView1<f32>) -> Array2<f32> {
    debug_assert_eq!(input.ncols(), weight.ncols());
    debug_assert_eq!(weight.nrows(), bias.len());
    input.dot(&weight.t()) + &bias
}

/// Frozen batch normalisation folded into a per-feature affine map.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    scale: Array1<f32>,
    shift: Array1<f32>,
}

impl BatchNorm {
    pub fn new(
        gamma: ArrayView1<f32>,
        beta: ArrayView1<f32>,
        moving_mean: ArrayView1<f32>,
        moving_variance: ArrayView1<f32>,
    ) -> Self {
        let scale = Zip::from(&gamma)
            .and(&moving_variance)
            .map_collect(|&g, &v| g / (v + BATCH_NORM_EPSILON).sqrt());
        let shift = Zip::from(&beta)
            .and(&moving_mean)
            .and(&scale)
            .map_collect(|&b, &m, &s| b - m * s);
        Self { scale, shift }
    }

    pub fn forward(&self, mut x: Array2<f32>) -> Array2<f32> {
        x *= &self.scale;
        x += &self.shift;
        x
    }
}

pub fn relu(mut x: Array2<f32>) -> Array2<f32> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

#[inline]
fn sigmoid_scalar(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

pub fn sigmoid<D: ndarray::Dimension>(mut x: ndarray::Array<f32, D>) -> ndarray::Array<f32, D> {
    x.mapv_inplace(sigmoid_scalar);
    x
}

/// Softmax across the class axis of every row.
pub fn softmax_classes(mut x: Array2<f32>) -> Array2<f32> {
    for mut row in x.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
    x
}

/// Collapse the time axis of one block: `sum_t cla[t, c] * att[t, c] / sum_t att[t, c]`.
///
/// `att` is clipped to `[ATTENTION_EPSILON, 1 - ATTENTION_EPSILON]` first so the
/// per-class denominator never reaches zero.
pub fn attention_pooling(cla: ArrayView2<f32>, att: ArrayView2<f32>) -> Array1<f32> {
    debug_assert_eq!(cla.dim(), att.dim());
    let att = att.mapv(|v| v.clamp(ATTENTION_EPSILON, 1.0 - ATTENTION_EPSILON));
    let norm = att.sum_axis(Axis(0));
    (&cla * &att).sum_axis(Axis(0)) / &norm
}

/// Join two pooled vectors end to end.
pub fn concat_features(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Array1<f32> {
    a.iter().chain(b.iter()).copied().collect()
}
