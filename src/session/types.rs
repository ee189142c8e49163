use crate::scale::{Point, ScaleModel};
use crate::segmentation::{LowResMask, Prediction};

/// A foreground click in Display space. Immutable once recorded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Click {
    pub x: f64,
    pub y: f64,
}

impl Click {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for Click {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// Bumped on every add/undo/clear and on every dispatch; tags in-flight inference
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Bumped on every image load; tags in-flight embedding fetches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageEpoch(pub u64);

impl ImageEpoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Work order for the inference orchestrator: one model call for `click`.
///
/// The call sees `committed + [click]` and continues from `previous`, the
/// low-res mask of the last committed click.
#[derive(Clone, Debug)]
pub struct InferenceJob {
    pub generation: Generation,
    pub scale: ScaleModel,
    pub committed: Vec<Click>,
    pub previous: Option<LowResMask>,
    pub click: Click,
}

#[derive(Clone, Debug)]
pub enum Event {
    ImageLoaded(ScaleModel),
    EmbeddingReady { epoch: ImageEpoch },
    EmbeddingFailed { epoch: ImageEpoch },
    AddClick(Click),
    Undo,
    Clear,
    InferenceSucceeded {
        generation: Generation,
        prediction: Prediction,
    },
    InferenceFailed { generation: Generation },
}

#[derive(Clone, Debug)]
pub enum Effect {
    /// Start computing the embedding for the image loaded at `epoch`
    FetchEmbedding { epoch: ImageEpoch },
    /// Tell the host the natural image size changed
    NotifyResize { width: u32, height: u32 },
    RunInference(InferenceJob),
    /// The current mask changed (possibly to none); rebuild the outline
    Retrace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Nothing to do, e.g. undo on an empty session
    Ignored,
    /// Result belonged to a superseded generation or image
    Discarded,
    /// Inference failed and this many clicks were withdrawn
    RolledBack { clicks: usize },
}

#[derive(Debug)]
pub struct Transition {
    pub outcome: Outcome,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub(crate) fn new(outcome: Outcome, effects: Vec<Effect>) -> Self {
        Self { outcome, effects }
    }

    pub(crate) fn only(outcome: Outcome) -> Self {
        Self::new(outcome, Vec::new())
    }
}
