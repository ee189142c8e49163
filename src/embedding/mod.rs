mod client;
mod tensor;

pub use client::{parse_response, EmbeddingConfig, FileEmbeddingSource, HttpEmbeddingClient};
pub use tensor::{EmbeddingTensor, EMBEDDING_SHAPE};

use crate::scale::ScaleModel;
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned HTTP {0}")]
    Status(u16),

    #[error("malformed embedding response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding response contained no tensor")]
    EmptyResponse,

    #[error("invalid base64 in embedding response: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("embedding buffer is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("embedding tensor has shape {0:?}, expected [1, 256, 64, 64]")]
    Shape(Vec<usize>),

    #[error("failed to encode upload image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to read embedding: {0}")]
    Io(#[from] std::io::Error),
}

/// Image as sent to the embedding service: resized into Upload space and re-encoded
#[derive(Clone, Debug)]
pub struct UploadImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl UploadImage {
    /// Resize so the longest side equals the upload cap and encode in `format`
    pub fn prepare(
        image: &DynamicImage,
        scale: &ScaleModel,
        format: ImageFormat,
    ) -> Result<Self, EmbeddingError> {
        let _span = tracing::debug_span!("prepare_upload").entered();

        let (width, height) = scale.upload_size();
        let resized = if image.width() == width && image.height() == height {
            image.clone()
        } else {
            image.resize_exact(width, height, FilterType::Lanczos3)
        };

        let bytes = match encode(&resized, format) {
            Ok(bytes) => bytes,
            // Some source formats cannot hold the upload size (ICO caps at 256 px)
            Err(err) if format != ImageFormat::Png => {
                tracing::warn!("Cannot encode upload as {:?} ({}), sending PNG", format, err);
                encode(&resized, ImageFormat::Png)?
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            bytes,
            width,
            height,
        })
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    // Formats without alpha (JPEG) reject RGBA buffers
    let converted;
    let image = match format {
        ImageFormat::Jpeg => {
            converted = DynamicImage::ImageRgb8(image.to_rgb8());
            &converted
        }
        _ => image,
    };

    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format)?;
    Ok(bytes.into_inner())
}

/// Source of per-image embeddings
#[async_trait]
pub trait EmbeddingSource: Send + Sync {
    async fn fetch(&self, image: &UploadImage) -> Result<EmbeddingTensor, EmbeddingError>;
}
