//! Safetensors-backed weight loading.

use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use ndarray::{Array1, Array2};
use safetensors::tensor::Dtype;

use crate::{Result, TagError};

#[derive(Debug, Clone)]
pub struct TensorF32 {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorF32 {
    fn check_shape(&self, path: &Path, name: &str, expected: &[usize]) -> Result<()> {
        if self.shape != expected {
            return Err(TagError::weight_load(
                path.display(),
                format!(
                    "tensor {name} has shape {:?}, expected {:?}",
                    self.shape, expected
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct WeightStore {
    path: PathBuf,
    mmap: memmap2::Mmap,
}

impl WeightStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path).map_err(|e| TagError::weight_load(path.display(), e))?;
        // SAFETY: read-only file mapping for immutable tensor access.
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| TagError::weight_load(path.display(), e))?;
        // Validate the header up front so a corrupt file fails at open.
        safetensors::SafeTensors::deserialize(&mmap)
            .map_err(|e| TagError::weight_load(path.display(), e))?;
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> Result<Vec<String>> {
        let st = self.deserialize()?;
        let mut names: Vec<String> = st.names().into_iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn tensor_f32(&self, name: &str) -> Result<TensorF32> {
        let st = self.deserialize()?;
        let tv = st.tensor(name).map_err(|e| match self.names() {
            Ok(available) => self.err(format!(
                "tensor {name}: {e} (available: {})",
                available.join(", ")
            )),
            Err(err) => err,
        })?;
        let dtype = tv.dtype();
        let shape = tv.shape().to_vec();
        let raw = tv.data();

        let data = match dtype {
            Dtype::F32 => {
                if raw.len() % 4 != 0 {
                    return Err(self.err(format!(
                        "invalid byte length {} for {name}, expected multiple of 4",
                        raw.len()
                    )));
                }
                raw.chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }
            Dtype::BF16 => {
                if raw.len() % 2 != 0 {
                    return Err(self.err(format!(
                        "invalid byte length {} for {name}, expected multiple of 2",
                        raw.len()
                    )));
                }
                raw.chunks_exact(2)
                    .map(|c| {
                        let bits = u16::from_le_bytes([c[0], c[1]]) as u32;
                        f32::from_bits(bits << 16)
                    })
                    .collect()
            }
            other => {
                return Err(self.err(format!("unsupported dtype {other:?} for {name}")));
            }
        };

        Ok(TensorF32 { shape, data })
    }

    /// Load a rank-1 tensor and check its length.
    pub fn vector(&self, name: &str, len: usize) -> Result<Array1<f32>> {
        let t = self.tensor_f32(name)?;
        t.check_shape(&self.path, name, &[len])?;
        Ok(Array1::from_vec(t.data))
    }

    /// Load a rank-2 tensor and check its `[rows, cols]` shape.
    pub fn matrix(&self, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>> {
        let t = self.tensor_f32(name)?;
        t.check_shape(&self.path, name, &[rows, cols])?;
        Array2::from_shape_vec((rows, cols), t.data).map_err(|e| self.err(e))
    }

    fn deserialize(&self) -> Result<safetensors::SafeTensors<'_>> {
        safetensors::SafeTensors::deserialize(&self.mmap).map_err(|e| self.err(e))
    }

    fn err(&self, reason: impl ToString) -> TagError {
        TagError::weight_load(self.path.display(), reason)
    }
}
