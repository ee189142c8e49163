use super::EmbeddingError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ndarray::{Array4, ArrayView4};

/// Shape of the image embedding produced by the encoder
pub const EMBEDDING_SHAPE: (usize, usize, usize, usize) = (1, 256, 64, 64);

/// Per-image feature tensor, `[1, 256, 64, 64]`.
///
/// Produced once per loaded image and shared read-only by every inference
/// call on that image.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingTensor {
    data: Array4<f32>,
}

impl EmbeddingTensor {
    pub fn new(data: Array4<f32>) -> Result<Self, EmbeddingError> {
        let (a, b, c, d) = EMBEDDING_SHAPE;
        if data.shape() != [a, b, c, d] {
            return Err(EmbeddingError::Shape(data.shape().to_vec()));
        }
        Ok(Self { data })
    }

    /// Interpret a little-endian f32 buffer
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, EmbeddingError> {
        let (a, b, c, d) = EMBEDDING_SHAPE;
        let expected = a * b * c * d * 4;
        if bytes.len() != expected {
            return Err(EmbeddingError::Length {
                expected,
                actual: bytes.len(),
            });
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let data = Array4::from_shape_vec(EMBEDDING_SHAPE, values)
            .map_err(|_| EmbeddingError::Shape(vec![a, b, c, d]))?;
        Ok(Self { data })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, EmbeddingError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::from_le_bytes(&bytes)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn to_array(&self) -> Array4<f32> {
        self.data.clone()
    }
}
