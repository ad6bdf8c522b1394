use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("{what} not available at {}", path.display())]
    ResourceUnavailable { what: &'static str, path: PathBuf },

    #[error("dataset {} contains no samples", .0.display())]
    EmptyDataset(PathBuf),

    #[error("malformed dataset row {line}: {reason}")]
    MalformedDataset { line: usize, reason: String },

    #[error("classification failed: {0}")]
    ClassificationFailure(String),

    #[error("class index {index} out of range for {len} labels")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unknown model type `{0}`")]
    UnknownModel(String),
}
