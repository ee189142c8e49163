use super::preprocess::Preprocessor;
use super::types::{ModelError, Prediction, PromptModel, PromptRequest};
use anyhow::{Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;

/// Tensor names of the prompt decoder graph
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    pub intra_threads: usize,
    pub embedding_input: String,
    pub coords_input: String,
    pub labels_input: String,
    pub mask_input: String,
    pub has_mask_input: String,
    pub size_input: String,
    pub masks_output: String,
    pub low_res_output: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            embedding_input: "image_embeddings".to_string(),
            coords_input: "point_coords".to_string(),
            labels_input: "point_labels".to_string(),
            mask_input: "mask_input".to_string(),
            has_mask_input: "has_mask_input".to_string(),
            size_input: "orig_im_size".to_string(),
            masks_output: "masks".to_string(),
            low_res_output: "low_res_masks".to_string(),
        }
    }
}

/// Point-prompted mask decoder running on ONNX Runtime.
///
/// Takes the precomputed image embedding plus clicks in Model space and
/// returns the full mask at the requested Upload-space size together with
/// the 256x256 low-resolution logits for the next call.
pub struct OnnxPromptDecoder {
    session: Session,
    config: DecoderConfig,
}

impl OnnxPromptDecoder {
    pub fn new<P: AsRef<Path>>(model_path: P, config: DecoderConfig) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading prompt decoder from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Prompt decoder loaded successfully");

        Ok(Self { session, config })
    }
}

impl PromptModel for OnnxPromptDecoder {
    fn predict(&mut self, request: &PromptRequest) -> Result<Prediction, ModelError> {
        let _span = tracing::debug_span!("decode", points = request.points.len()).entered();

        let (coords, labels) = Preprocessor::prompt_tensors(&request.points)?;
        let (mask_input, has_mask) = Preprocessor::mask_input(request.previous_mask.as_ref());
        let (width, height) = request.output_size;
        let orig_size = Preprocessor::output_size(width, height);

        let embedding = Value::from_array(request.embedding.to_array())?;
        let coords = Value::from_array(coords)?;
        let labels = Value::from_array(labels)?;
        let mask_input = Value::from_array(mask_input)?;
        let has_mask = Value::from_array(has_mask)?;
        let orig_size = Value::from_array(orig_size)?;

        let outputs = self.session.run(ort::inputs![
            self.config.embedding_input.as_str() => embedding,
            self.config.coords_input.as_str() => coords,
            self.config.labels_input.as_str() => labels,
            self.config.mask_input.as_str() => mask_input,
            self.config.has_mask_input.as_str() => has_mask,
            self.config.size_input.as_str() => orig_size,
        ])?;

        let extract = |name: &str| -> Result<(Vec<usize>, Vec<f32>), ModelError> {
            let value = outputs
                .get(name)
                .ok_or_else(|| ModelError::MissingOutput(name.to_string()))?;
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
            Ok((dims, data.to_vec()))
        };

        let (mask_shape, mask_data) = extract(&self.config.masks_output)?;
        let (low_shape, low_data) = extract(&self.config.low_res_output)?;
        drop(outputs);

        let full = Preprocessor::full_mask_from_output(&mask_shape, &mask_data)?;
        let low_res = Preprocessor::low_res_from_output(&low_shape, &low_data)?;

        tracing::debug!(
            "Decoded {}x{} mask, {} foreground px",
            full.width,
            full.height,
            full.foreground_count(0.0)
        );

        Ok(Prediction { full, low_res })
    }

    fn name(&self) -> &str {
        "onnx-prompt-decoder"
    }
}
