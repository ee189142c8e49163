use crate::embedding::EmbeddingError;
use crate::segmentation::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures scoped to one image or one click; none of them end the process
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("failed to load image {path}: {source}")]
    ImageLoadFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image has zero width or height")]
    EmptyImage,

    #[error("embedding fetch failed: {0}")]
    EmbeddingFetchFailed(#[source] EmbeddingError),

    #[error("inference failed, {rolled_back} click(s) rolled back: {source}")]
    InferenceFailed {
        rolled_back: usize,
        #[source]
        source: ModelError,
    },

    #[error("no image loaded")]
    NoImage,
}
