//! Async driver tying the session machine to its external collaborators.

mod host;

pub use host::{HostNotifier, LogNotifier};

use crate::contour::{self, TracedPath};
use crate::embedding::{EmbeddingError, EmbeddingSource, EmbeddingTensor, UploadImage};
use crate::error::EditorError;
use crate::inference::{JobResult, Orchestrator};
use crate::render;
use crate::scale::{HostViewport, Point, ScaleConfig, ViewportConfig};
use crate::scale::ScaleModel;
use crate::segmentation::{MaskTensor, PromptModel};
use crate::session::{Click, Effect, Event, ImageEpoch, Outcome, SessionMachine};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Clone, Debug, Default)]
pub struct EditorConfig {
    pub scale: ScaleConfig,
    pub viewport: ViewportConfig,
    /// Douglas-Peucker tolerance in Display pixels; 0 keeps every corner
    pub simplify_tolerance: f64,
}

struct EmbeddingReply {
    epoch: ImageEpoch,
    result: Result<EmbeddingTensor, EmbeddingError>,
}

/// Interactive click-to-select editor for one image at a time.
///
/// Runs on a single cooperative task. The embedding fetch and inference jobs
/// are spawned and report back over channels; [`Editor::next_completion`]
/// applies whatever arrives, dropping results of cancelled calls or of an
/// image that has since been replaced.
pub struct Editor {
    config: EditorConfig,
    machine: SessionMachine,
    orchestrator: Orchestrator,
    embeddings: Arc<dyn EmbeddingSource>,
    notifier: Box<dyn HostNotifier>,

    image: Option<Arc<DynamicImage>>,
    upload_format: ImageFormat,
    viewport: Option<HostViewport>,
    traced: Option<TracedPath>,
    awaiting_embedding: bool,

    embedding_tx: UnboundedSender<EmbeddingReply>,
    embedding_rx: UnboundedReceiver<EmbeddingReply>,
    job_tx: UnboundedSender<JobResult>,
    job_rx: UnboundedReceiver<JobResult>,
}

impl Editor {
    pub fn new(
        model: Box<dyn PromptModel>,
        embeddings: Arc<dyn EmbeddingSource>,
        notifier: Box<dyn HostNotifier>,
        config: EditorConfig,
    ) -> Self {
        let (embedding_tx, embedding_rx) = mpsc::unbounded_channel();
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        Self {
            config,
            machine: SessionMachine::new(),
            orchestrator: Orchestrator::new(model),
            embeddings,
            notifier,
            image: None,
            upload_format: ImageFormat::Png,
            viewport: None,
            traced: None,
            awaiting_embedding: false,
            embedding_tx,
            embedding_rx,
            job_tx,
            job_rx,
        }
    }

    /// Decode an image file and make it the current image
    pub fn open_image<P: AsRef<Path>>(&mut self, path: P) -> Result<(), EditorError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| EditorError::ImageLoadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
        self.load_image(image, format)
    }

    /// Replace the current image. Resets the session and starts the embedding fetch.
    ///
    /// `format` is the encoding used for the upload to the embedding service.
    pub fn load_image(&mut self, image: DynamicImage, format: ImageFormat) -> Result<(), EditorError> {
        let scale = ScaleModel::new(image.width(), image.height(), &self.config.scale)
            .ok_or(EditorError::EmptyImage)?;

        self.image = Some(Arc::new(image));
        self.upload_format = format;
        self.orchestrator.clear_embedding();
        self.traced = None;

        let transition = self.machine.handle(Event::ImageLoaded(scale));
        self.apply(transition.effects)
    }

    pub fn add_click(&mut self, click: Click) -> Result<Outcome, EditorError> {
        let transition = self.machine.handle(Event::AddClick(click));
        self.apply(transition.effects)?;
        Ok(transition.outcome)
    }

    /// Click given in canvas (viewport) coordinates
    pub fn add_canvas_click(&mut self, point: Point) -> Result<Outcome, EditorError> {
        let viewport = self.viewport.ok_or(EditorError::NoImage)?;
        self.add_click(Click::from(viewport.canvas_to_display(point)))
    }

    pub fn undo(&mut self) -> Result<Outcome, EditorError> {
        let transition = self.machine.handle(Event::Undo);
        self.apply(transition.effects)?;
        Ok(transition.outcome)
    }

    pub fn clear(&mut self) -> Result<Outcome, EditorError> {
        let transition = self.machine.handle(Event::Clear);
        self.apply(transition.effects)?;
        Ok(transition.outcome)
    }

    /// Carry out every effect, then report the first failure
    fn apply(&mut self, effects: Vec<Effect>) -> Result<(), EditorError> {
        let mut first_err = None;
        for effect in effects {
            let result = match effect {
                Effect::FetchEmbedding { epoch } => self.fetch_embedding(epoch),
                Effect::NotifyResize { width, height } => {
                    let viewport = HostViewport::fit(width, height, &self.config.viewport);
                    self.viewport = Some(viewport);
                    self.notifier.resize(&viewport);
                    Ok(())
                }
                Effect::RunInference(job) => {
                    self.orchestrator.spawn(job, self.job_tx.clone());
                    Ok(())
                }
                Effect::Retrace => {
                    self.retrace();
                    Ok(())
                }
            };
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn fetch_embedding(&mut self, epoch: ImageEpoch) -> Result<(), EditorError> {
        let (Some(image), Some(scale)) = (self.image.as_ref(), self.machine.scale()) else {
            return Err(EditorError::NoImage);
        };

        let upload = UploadImage::prepare(image, scale, self.upload_format)
            .map_err(EditorError::EmbeddingFetchFailed)?;

        self.awaiting_embedding = true;
        let source = Arc::clone(&self.embeddings);
        let tx = self.embedding_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch(&upload).await;
            let _ = tx.send(EmbeddingReply { epoch, result });
        });
        Ok(())
    }

    fn retrace(&mut self) {
        let Some(scale) = self.machine.scale() else {
            self.traced = None;
            return;
        };
        let display_scale = scale.display_scale();
        let tolerance = self.config.simplify_tolerance;

        self.traced = self.machine.current_prediction().map(|prediction| {
            let traced = contour::trace(&prediction.full, display_scale);
            contour::simplify(&traced, tolerance)
        });
    }

    /// Wait for the next embedding or inference result and apply it.
    ///
    /// Stale results come back as `Ok(Outcome::Discarded)`.
    pub async fn next_completion(&mut self) -> Result<Outcome, EditorError> {
        tokio::select! {
            Some(reply) = self.embedding_rx.recv() => self.on_embedding(reply),
            Some(reply) = self.job_rx.recv() => self.on_job(reply),
            else => Ok(Outcome::Ignored),
        }
    }

    /// Apply results until nothing the current state depends on is outstanding
    pub async fn settle(&mut self) -> Result<(), EditorError> {
        while self.awaiting_embedding || self.machine.is_inferring() {
            self.next_completion().await?;
        }
        Ok(())
    }

    fn on_embedding(&mut self, reply: EmbeddingReply) -> Result<Outcome, EditorError> {
        if reply.epoch != self.machine.epoch() {
            tracing::debug!("Dropping embedding for stale epoch {}", reply.epoch.0);
            return Ok(Outcome::Discarded);
        }
        self.awaiting_embedding = false;

        match reply.result {
            Ok(tensor) => {
                self.orchestrator.set_embedding(tensor);
                let transition = self.machine.handle(Event::EmbeddingReady { epoch: reply.epoch });
                self.apply(transition.effects)?;
                Ok(transition.outcome)
            }
            Err(err) => {
                self.machine.handle(Event::EmbeddingFailed { epoch: reply.epoch });
                Err(EditorError::EmbeddingFetchFailed(err))
            }
        }
    }

    fn on_job(&mut self, reply: JobResult) -> Result<Outcome, EditorError> {
        let generation = reply.generation;
        match reply.result {
            Ok(prediction) => {
                let transition = self.machine.handle(Event::InferenceSucceeded {
                    generation,
                    prediction,
                });
                self.apply(transition.effects)?;
                Ok(transition.outcome)
            }
            Err(source) => {
                let transition = self.machine.handle(Event::InferenceFailed { generation });
                // The next queued click still gets dispatched
                self.apply(transition.effects)?;
                match transition.outcome {
                    Outcome::RolledBack { clicks } => Err(EditorError::InferenceFailed {
                        rolled_back: clicks,
                        source,
                    }),
                    outcome => Ok(outcome),
                }
            }
        }
    }

    pub fn clicks(&self) -> &[Click] {
        self.machine.clicks()
    }

    pub fn is_undoable(&self) -> bool {
        self.machine.is_undoable()
    }

    /// Image loaded but its embedding has not arrived
    pub fn is_loading(&self) -> bool {
        self.machine.is_loading()
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        self.image.as_deref()
    }

    pub fn scale(&self) -> Option<&ScaleModel> {
        self.machine.scale()
    }

    pub fn viewport(&self) -> Option<&HostViewport> {
        self.viewport.as_ref()
    }

    pub fn current_mask(&self) -> Option<&MaskTensor> {
        self.machine.current_prediction().map(|p| &p.full)
    }

    /// Outline of the current mask in Display space
    pub fn traced(&self) -> Option<&TracedPath> {
        self.traced.as_ref()
    }

    /// Foreground isolated from the image, if there is a mask
    pub fn rendered(&self) -> Option<RgbaImage> {
        let image = self.image.as_ref()?;
        let traced = self.traced.as_ref()?;
        Some(render::cutout(image, traced))
    }

    /// Rendered foreground further clipped by lasso polygons
    pub fn clip(&self, lassos: &[Vec<Point>]) -> Option<RgbaImage> {
        render::clip_to_lasso(&self.rendered()?, lassos)
    }
}
