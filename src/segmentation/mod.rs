mod decoder;
mod preprocess;
pub mod types;

pub use decoder::{DecoderConfig, OnnxPromptDecoder};
pub use preprocess::Preprocessor;
pub use types::{
    LowResMask, MaskTensor, ModelError, Prediction, PromptModel, PromptPoint, PromptRequest,
    LOW_RES_MASK_SIZE, POSITIVE_LABEL,
};

use anyhow::Result;
use std::path::Path;

/// Create the default prompt model (ONNX decoder with standard tensor names)
pub fn create_default_model<P: AsRef<Path>>(model_path: P) -> Result<Box<dyn PromptModel>> {
    let model = OnnxPromptDecoder::new(model_path, DecoderConfig::default())?;
    Ok(Box::new(model))
}
