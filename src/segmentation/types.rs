use crate::embedding::EmbeddingTensor;
use ndarray::Array4;
use std::sync::Arc;
use thiserror::Error;

/// Side length of the low-resolution continuity mask
pub const LOW_RES_MASK_SIZE: usize = 256;

/// Prompt label for a foreground click
pub const POSITIVE_LABEL: f32 = 1.0;

/// Prompt label for the padding point appended when no box is given
pub const PADDING_LABEL: f32 = -1.0;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("onnx runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error(transparent)]
    Array(#[from] ndarray::ShapeError),

    #[error("model output `{0}` is missing")]
    MissingOutput(String),

    #[error("unexpected {name} shape {actual:?}")]
    Shape { name: String, actual: Vec<usize> },

    #[error("prompt contains no clicks")]
    NoClicks,

    #[error("no embedding is loaded for the current image")]
    MissingEmbedding,

    #[error("inference task aborted")]
    Aborted,
}

/// Full-resolution mask logits, one channel, row-major.
///
/// Values above zero are foreground. Its grid is independent of Display
/// space and must be scaled by the consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskTensor {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl MaskTensor {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self, ModelError> {
        if data.len() != width * height {
            return Err(ModelError::Shape {
                name: "mask".to_string(),
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn foreground_count(&self, threshold: f32) -> usize {
        self.data.iter().filter(|&&v| v > threshold).count()
    }
}

/// Low-resolution logits fed back into the next call, `[1, 1, 256, 256]`
#[derive(Clone, Debug, PartialEq)]
pub struct LowResMask(Array4<f32>);

impl LowResMask {
    pub fn new(data: Array4<f32>) -> Result<Self, ModelError> {
        if data.shape() != [1, 1, LOW_RES_MASK_SIZE, LOW_RES_MASK_SIZE] {
            return Err(ModelError::Shape {
                name: "low_res_mask".to_string(),
                actual: data.shape().to_vec(),
            });
        }
        Ok(Self(data))
    }

    /// Placeholder used on the first call of a session
    pub fn zeros() -> Self {
        Self(Array4::zeros((1, 1, LOW_RES_MASK_SIZE, LOW_RES_MASK_SIZE)))
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }
}

/// Result of one inference call
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub full: MaskTensor,
    pub low_res: LowResMask,
}

/// One prompt point in Model space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PromptPoint {
    pub x: f32,
    pub y: f32,
    /// Box extent; always `None` for point prompts
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub label: f32,
}

/// Everything the model needs for one call
#[derive(Clone, Debug)]
pub struct PromptRequest {
    pub embedding: Arc<EmbeddingTensor>,
    pub points: Vec<PromptPoint>,
    pub previous_mask: Option<LowResMask>,
    /// Size the full mask is produced at, `(width, height)` in Upload space
    pub output_size: (u32, u32),
}

/// Trait for point-prompted segmentation models
///
/// Implementations are stateless between calls apart from what the request
/// carries; continuity comes only from `previous_mask`.
pub trait PromptModel: Send {
    /// Decode a mask for the given prompts
    fn predict(&mut self, request: &PromptRequest) -> Result<Prediction, ModelError>;

    /// Human-readable backend name for logs
    fn name(&self) -> &str {
        "prompt-model"
    }
}
