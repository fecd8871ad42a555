use thiserror::Error;

pub type Result<T, E = TagError> = std::result::Result<T, E>;

/// Every failure aborts the prediction it belongs to; nothing is retried here.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("failed to decode audio {path}: {reason}")]
    AudioDecode { path: String, reason: String },

    #[error("need more than {window} embeddings to form a block, got {frames}")]
    InsufficientLength { frames: usize, window: usize },

    #[error("failed to load weights from {path}: {reason}")]
    WeightLoad { path: String, reason: String },

    #[error("class index {index} is outside the label table ({rows} rows)")]
    LabelLookup { index: usize, rows: usize },

    #[error("malformed label table {path}: {reason}")]
    LabelTable { path: String, reason: String },

    #[error("embedding extraction failed: {0}")]
    Embedding(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TagError {
    pub(crate) fn weight_load(path: impl std::fmt::Display, reason: impl ToString) -> Self {
        Self::WeightLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
