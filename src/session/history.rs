use super::types::Click;
use crate::segmentation::Prediction;

/// Committed clicks and the predictions they produced.
///
/// `predictions[i]` is the result of inference on `clicks[..=i]`. Both
/// vectors only change together, so their lengths are always equal.
#[derive(Clone, Debug, Default)]
pub struct History {
    clicks: Vec<Click>,
    predictions: Vec<Prediction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, click: Click, prediction: Prediction) {
        self.clicks.push(click);
        self.predictions.push(prediction);
    }

    pub fn pop(&mut self) -> Option<(Click, Prediction)> {
        let click = self.clicks.pop()?;
        let prediction = self.predictions.pop()?;
        Some((click, prediction))
    }

    pub fn clear(&mut self) {
        self.clicks.clear();
        self.predictions.clear();
    }

    pub fn len(&self) -> usize {
        self.clicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }

    pub fn clicks(&self) -> &[Click] {
        &self.clicks
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn last_prediction(&self) -> Option<&Prediction> {
        self.predictions.last()
    }
}
