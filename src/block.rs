//! Sliding-window blocks over an embedding sequence.

use ndarray::{s, Array3, ArrayView2, Axis};

use crate::{Result, TagError};

/// Start offsets `0, hop, 2 * hop, ...` strictly below `frames - window`.
///
/// A window that would start exactly at `frames - window` is not emitted.
/// `hop` may not exceed `window`, otherwise embeddings between blocks would go
/// unclassified.
pub fn block_offsets(frames: usize, window: usize, hop: usize) -> Result<Vec<usize>> {
    if window == 0 || hop == 0 {
        return Err(TagError::InvalidConfig(format!(
            "window ({window}) and hop ({hop}) must be positive"
        )));
    }
    if hop > window {
        return Err(TagError::InvalidConfig(format!(
            "hop ({hop}) must not exceed window ({window})"
        )));
    }
    if frames <= window {
        return Err(TagError::InsufficientLength { frames, window });
    }
    Ok((0..frames - window).step_by(hop).collect())
}

/// Stack overlapping `[window, F]` slices of `embeddings` into `[N, window, F]`.
pub fn block(embeddings: ArrayView2<f32>, window: usize, hop: usize) -> Result<Array3<f32>> {
    let (frames, features) = embeddings.dim();
    let offsets = block_offsets(frames, window, hop)?;

    let mut blocks = Array3::<f32>::zeros((offsets.len(), window, features));
    for (mut dst, &start) in blocks.axis_iter_mut(Axis(0)).zip(&offsets) {
        dst.assign(&embeddings.slice(s![start..start + window, ..]));
    }

    tracing::debug!(
        "windowed {} embeddings into {} blocks (window {}, hop {})",
        frames,
        offsets.len(),
        window,
        hop
    );
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(frames: usize, features: usize) -> Array2<f32> {
        Array2::from_shape_fn((frames, features), |(t, f)| (t * 1000 + f) as f32)
    }

    #[test]
    fn twenty_frames_hop_five() {
        let seq = ramp(20, 128);
        let blocks = block(seq.view(), 10, 5).unwrap();
        assert_eq!(blocks.dim(), (2, 10, 128));
        assert_eq!(block_offsets(20, 10, 5).unwrap(), vec![0, 5]);

        // block i row r is embedding i * hop + r
        assert_eq!(blocks[[0, 0, 0]], 0.0);
        assert_eq!(blocks[[1, 0, 3]], 5003.0);
        assert_eq!(blocks[[1, 9, 127]], 14127.0);
    }

    #[test]
    fn offsets_exclude_final_aligned_window() {
        assert_eq!(block_offsets(31, 10, 10).unwrap(), vec![0, 10, 20]);
        assert_eq!(block_offsets(30, 10, 10).unwrap(), vec![0, 10]);
        assert_eq!(block_offsets(11, 10, 1).unwrap(), vec![0]);
        assert_eq!(block_offsets(23, 10, 4).unwrap(), vec![0, 4, 8, 12]);
    }

    #[test]
    fn rejects_short_sequences() {
        for frames in [0, 3, 10] {
            let seq = ramp(frames, 4);
            match block(seq.view(), 10, 1) {
                Err(TagError::InsufficientLength { frames: got, window }) => {
                    assert_eq!(got, frames);
                    assert_eq!(window, 10);
                }
                other => panic!("expected InsufficientLength, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_zero_hop() {
        let seq = ramp(20, 4);
        assert!(matches!(
            block(seq.view(), 10, 0),
            Err(TagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_hop_wider_than_window() {
        let seq = ramp(40, 4);
        assert!(matches!(
            block(seq.view(), 10, 15),
            Err(TagError::InvalidConfig(_))
        ));
        assert_eq!(block(seq.view(), 10, 10).unwrap().dim(), (3, 10, 4));
    }

    #[test]
    fn deterministic() {
        let seq = ramp(40, 8);
        let a = block(seq.view(), 10, 3).unwrap();
        let b = block(seq.view(), 10, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim().0, 10);
    }
}
