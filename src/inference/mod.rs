//! Builds prompt requests from the click history and runs the model.

use crate::embedding::EmbeddingTensor;
use crate::scale::ScaleModel;
use crate::segmentation::{LowResMask, ModelError, Prediction, PromptModel, PromptPoint, PromptRequest, POSITIVE_LABEL};
use crate::session::{Click, Generation, InferenceJob};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

/// Result of one [`InferenceJob`], tagged with the generation that asked for it
#[derive(Debug)]
pub struct JobResult {
    pub generation: Generation,
    pub result: Result<Prediction, ModelError>,
}

/// Owns the model and the embedding of the current image.
///
/// Cloning is cheap and shares both, which is how spawned jobs get at them.
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<Mutex<Box<dyn PromptModel>>>,
    embedding: Option<Arc<EmbeddingTensor>>,
}

impl Orchestrator {
    pub fn new(model: Box<dyn PromptModel>) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            embedding: None,
        }
    }

    /// Install the embedding for a newly loaded image, replacing the old one
    pub fn set_embedding(&mut self, embedding: EmbeddingTensor) {
        self.embedding = Some(Arc::new(embedding));
    }

    pub fn clear_embedding(&mut self) {
        self.embedding = None;
    }

    /// Re-encode the whole click history in Model space
    pub fn encode_clicks(clicks: &[Click], scale: &ScaleModel) -> Vec<PromptPoint> {
        clicks
            .iter()
            .map(|click| {
                let p = scale.display_to_model(click.point());
                PromptPoint {
                    x: p.x as f32,
                    y: p.y as f32,
                    width: None,
                    height: None,
                    label: POSITIVE_LABEL,
                }
            })
            .collect()
    }

    /// One model call on `clicks`, continuing from `previous` if given.
    ///
    /// The blocking session runs on tokio's blocking pool; this await is the
    /// suspension point. No retry is attempted.
    pub async fn infer(
        &self,
        clicks: &[Click],
        scale: &ScaleModel,
        previous: Option<LowResMask>,
    ) -> Result<Prediction, ModelError> {
        let embedding = self.embedding.clone().ok_or(ModelError::MissingEmbedding)?;

        let request = PromptRequest {
            embedding,
            points: Self::encode_clicks(clicks, scale),
            previous_mask: previous,
            output_size: scale.upload_size(),
        };

        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| ModelError::Aborted)?;
            model.predict(&request)
        })
        .await
        .map_err(|_| ModelError::Aborted)?
    }

    /// Run a job: the committed history plus the new click, in one call
    pub async fn run_job(&self, job: &InferenceJob) -> Result<Prediction, ModelError> {
        let mut clicks = Vec::with_capacity(job.committed.len() + 1);
        clicks.extend_from_slice(&job.committed);
        clicks.push(job.click);
        self.infer(&clicks, &job.scale, job.previous.clone()).await
    }

    /// Run `job` in the background and report on `results`
    pub fn spawn(&self, job: InferenceJob, results: UnboundedSender<JobResult>) {
        let orchestrator = self.clone();
        let span = tracing::debug_span!("inference", generation = job.generation.0);
        tokio::spawn(
            async move {
                let result = orchestrator.run_job(&job).await;
                if let Err(err) = &result {
                    tracing::warn!("Inference gen={} failed: {}", job.generation.0, err);
                }
                // Receiver gone means the editor was dropped
                let _ = results.send(JobResult {
                    generation: job.generation,
                    result,
                });
            }
            .instrument(span),
        );
    }
}
