use super::history::History;
use super::types::{Click, Effect, Event, Generation, ImageEpoch, InferenceJob, Outcome, Transition};
use crate::scale::ScaleModel;
use crate::segmentation::Prediction;

#[derive(Clone, Copy, Debug)]
struct LoadedImage {
    scale: ScaleModel,
    embedding_ready: bool,
}

/// Click/undo session as an explicit transition function.
///
/// All bookkeeping is synchronous; the only thing that leaves the machine is
/// the list of [`Effect`]s for the caller to carry out. Results come back as
/// events tagged with the generation or epoch that requested them, and only
/// the current one is ever applied.
#[derive(Debug, Default)]
pub struct SessionMachine {
    history: History,
    /// Clicks waiting for their mask, oldest first
    pending: Vec<Click>,
    generation: Generation,
    in_flight: Option<Generation>,
    epoch: ImageEpoch,
    image: Option<LoadedImage>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: Event) -> Transition {
        match event {
            Event::ImageLoaded(scale) => self.on_image_loaded(scale),
            Event::EmbeddingReady { epoch } => self.on_embedding_ready(epoch),
            Event::EmbeddingFailed { epoch } => self.on_embedding_failed(epoch),
            Event::AddClick(click) => self.on_add_click(click),
            Event::Undo => self.on_undo(),
            Event::Clear => self.on_clear(),
            Event::InferenceSucceeded {
                generation,
                prediction,
            } => self.on_inference_succeeded(generation, prediction),
            Event::InferenceFailed { generation } => self.on_inference_failed(generation),
        }
    }

    /// Committed clicks, aligned 1:1 with [`Self::predictions`]
    pub fn clicks(&self) -> &[Click] {
        self.history.clicks()
    }

    pub fn predictions(&self) -> &[Prediction] {
        self.history.predictions()
    }

    /// The prediction whose mask is currently shown
    pub fn current_prediction(&self) -> Option<&Prediction> {
        self.history.last_prediction()
    }

    pub fn pending(&self) -> &[Click] {
        &self.pending
    }

    pub fn is_undoable(&self) -> bool {
        !self.history.is_empty() || !self.pending.is_empty()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn epoch(&self) -> ImageEpoch {
        self.epoch
    }

    pub fn scale(&self) -> Option<&ScaleModel> {
        self.image.as_ref().map(|image| &image.scale)
    }

    pub fn embedding_ready(&self) -> bool {
        self.image.map(|image| image.embedding_ready).unwrap_or(false)
    }

    /// An inference call is outstanding and its result will be applied
    pub fn is_inferring(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Still waiting on the embedding for the current image
    pub fn is_loading(&self) -> bool {
        self.image.map(|image| !image.embedding_ready).unwrap_or(false)
    }

    fn bump(&mut self) {
        self.generation = self.generation.next();
    }

    /// Forget the outstanding call; its result will be discarded
    fn cancel_in_flight(&mut self) {
        if let Some(generation) = self.in_flight.take() {
            tracing::debug!("Cancelled inference gen={}", generation.0);
        }
    }

    /// Send the oldest pending click to inference if nothing is running
    /// and the embedding is there
    fn dispatch(&mut self) -> Option<Effect> {
        let image = self.image?;
        if self.in_flight.is_some() || !image.embedding_ready {
            return None;
        }
        let click = *self.pending.first()?;

        // Every job gets a tag no earlier job had
        self.bump();
        self.in_flight = Some(self.generation);
        tracing::debug!(
            "Dispatching inference gen={} committed={} queued={}",
            self.generation.0,
            self.history.len(),
            self.pending.len() - 1
        );

        Some(Effect::RunInference(InferenceJob {
            generation: self.generation,
            scale: image.scale,
            committed: self.history.clicks().to_vec(),
            previous: self.history.last_prediction().map(|p| p.low_res.clone()),
            click,
        }))
    }

    fn on_image_loaded(&mut self, scale: ScaleModel) -> Transition {
        self.epoch = self.epoch.next();
        self.history.clear();
        self.pending.clear();
        self.cancel_in_flight();
        self.bump();
        self.image = Some(LoadedImage {
            scale,
            embedding_ready: false,
        });

        tracing::info!(
            "Image {}x{} loaded (epoch {})",
            scale.image_width,
            scale.image_height,
            self.epoch.0
        );

        // Retrace first so the old outline is gone even if the fetch cannot start
        Transition::new(
            Outcome::Applied,
            vec![
                Effect::NotifyResize {
                    width: scale.image_width,
                    height: scale.image_height,
                },
                Effect::Retrace,
                Effect::FetchEmbedding { epoch: self.epoch },
            ],
        )
    }

    fn on_embedding_ready(&mut self, epoch: ImageEpoch) -> Transition {
        if epoch != self.epoch {
            tracing::debug!("Discarding embedding for stale epoch {}", epoch.0);
            return Transition::only(Outcome::Discarded);
        }
        let Some(image) = self.image.as_mut() else {
            return Transition::only(Outcome::Discarded);
        };
        image.embedding_ready = true;

        Transition::new(Outcome::Applied, self.dispatch().into_iter().collect())
    }

    fn on_embedding_failed(&mut self, epoch: ImageEpoch) -> Transition {
        if epoch != self.epoch {
            return Transition::only(Outcome::Discarded);
        }
        // The image stays in the loading state; reloading it is the only recovery
        tracing::warn!("Embedding for epoch {} failed", epoch.0);
        Transition::only(Outcome::Applied)
    }

    fn on_add_click(&mut self, click: Click) -> Transition {
        if self.image.is_none() {
            tracing::warn!("Click ignored, no image loaded");
            return Transition::only(Outcome::Ignored);
        }

        // Queued behind any running call, which stays valid
        self.pending.push(click);
        self.bump();

        Transition::new(Outcome::Applied, self.dispatch().into_iter().collect())
    }

    fn on_undo(&mut self) -> Transition {
        if self.pending.pop().is_some() {
            // Only the oldest pending click can be running
            if self.pending.is_empty() {
                self.cancel_in_flight();
            }
            // The click never got a mask, so the visible outline is unchanged
            self.bump();
            return Transition::only(Outcome::Applied);
        }

        if self.history.pop().is_some() {
            self.bump();
            return Transition::new(Outcome::Applied, vec![Effect::Retrace]);
        }

        Transition::only(Outcome::Ignored)
    }

    fn on_clear(&mut self) -> Transition {
        if !self.is_undoable() {
            return Transition::only(Outcome::Ignored);
        }

        let had_mask = !self.history.is_empty();
        self.history.clear();
        self.pending.clear();
        self.cancel_in_flight();
        self.bump();

        let effects = if had_mask { vec![Effect::Retrace] } else { Vec::new() };
        Transition::new(Outcome::Applied, effects)
    }

    /// The running call always belongs to `pending[0]`
    fn is_current(&self, generation: Generation) -> bool {
        self.in_flight == Some(generation) && !self.pending.is_empty()
    }

    fn on_inference_succeeded(&mut self, generation: Generation, prediction: Prediction) -> Transition {
        if !self.is_current(generation) {
            tracing::debug!(
                "Discarding stale inference gen={} (current {})",
                generation.0,
                self.generation.0
            );
            return Transition::only(Outcome::Discarded);
        }

        self.in_flight = None;
        let click = self.pending.remove(0);
        self.history.push(click, prediction);

        let mut effects = vec![Effect::Retrace];
        effects.extend(self.dispatch());
        Transition::new(Outcome::Applied, effects)
    }

    fn on_inference_failed(&mut self, generation: Generation) -> Transition {
        if !self.is_current(generation) {
            return Transition::only(Outcome::Discarded);
        }

        // Withdraw the click that failed; the ones queued after it go next
        self.in_flight = None;
        self.pending.remove(0);
        tracing::warn!("Rolled back click after failed inference gen={}", generation.0);

        Transition::new(
            Outcome::RolledBack { clicks: 1 },
            self.dispatch().into_iter().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaleConfig;
    use crate::segmentation::{LowResMask, MaskTensor};

    fn prediction(tag: f32) -> Prediction {
        Prediction {
            full: MaskTensor::new(1, 1, vec![tag]).unwrap(),
            low_res: LowResMask::zeros(),
        }
    }

    fn ready_machine() -> SessionMachine {
        let mut machine = SessionMachine::new();
        let scale = ScaleModel::new(640, 480, &ScaleConfig::default()).unwrap();
        machine.handle(Event::ImageLoaded(scale));
        let epoch = machine.epoch();
        machine.handle(Event::EmbeddingReady { epoch });
        machine
    }

    fn job_of(transition: &Transition) -> InferenceJob {
        transition
            .effects
            .iter()
            .find_map(|e| match e {
                Effect::RunInference(job) => Some(job.clone()),
                _ => None,
            })
            .expect("expected an inference job")
    }

    fn jobs_of(transition: &Transition) -> Vec<InferenceJob> {
        transition
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::RunInference(job) => Some(job.clone()),
                _ => None,
            })
            .collect()
    }

    fn succeed(machine: &mut SessionMachine, job: &InferenceJob, tag: f32) -> Transition {
        machine.handle(Event::InferenceSucceeded {
            generation: job.generation,
            prediction: prediction(tag),
        })
    }

    /// Click and immediately deliver a successful result tagged `tag`
    fn click_and_complete(machine: &mut SessionMachine, click: Click, tag: f32) {
        let job = job_of(&machine.handle(Event::AddClick(click)));
        assert_eq!(succeed(machine, &job, tag).outcome, Outcome::Applied);
    }

    fn assert_aligned(machine: &SessionMachine) {
        assert_eq!(machine.clicks().len(), machine.predictions().len());
    }

    #[test]
    fn test_image_load_requests_embedding() {
        let mut machine = SessionMachine::new();
        let scale = ScaleModel::new(100, 50, &ScaleConfig::default()).unwrap();
        let t = machine.handle(Event::ImageLoaded(scale));
        assert!(t.effects.iter().any(|e| matches!(e, Effect::FetchEmbedding { .. })));
        assert!(t
            .effects
            .iter()
            .any(|e| matches!(e, Effect::NotifyResize { width: 100, height: 50 })));
        assert!(machine.is_loading());
    }

    #[test]
    fn test_click_without_image_ignored() {
        let mut machine = SessionMachine::new();
        let t = machine.handle(Event::AddClick(Click::new(1.0, 1.0)));
        assert_eq!(t.outcome, Outcome::Ignored);
        assert!(!machine.is_undoable());
    }

    #[test]
    fn test_add_click_sends_full_history() {
        let mut machine = ready_machine();
        click_and_complete(&mut machine, Click::new(1.0, 2.0), 1.0);

        let t = machine.handle(Event::AddClick(Click::new(3.0, 4.0)));
        let job = job_of(&t);
        assert_eq!(job.committed, vec![Click::new(1.0, 2.0)]);
        assert_eq!(job.click, Click::new(3.0, 4.0));
        assert!(job.previous.is_some());

        // Nothing visible changes until the result lands
        assert_eq!(machine.clicks().len(), 1);
        assert_eq!(machine.current_prediction().unwrap().full.data, vec![1.0]);
        assert_aligned(&machine);
    }

    #[test]
    fn test_first_click_has_no_previous_mask() {
        let mut machine = ready_machine();
        let job = job_of(&machine.handle(Event::AddClick(Click::new(5.0, 5.0))));
        assert!(job.committed.is_empty());
        assert!(job.previous.is_none());
    }

    #[test]
    fn test_clicks_before_embedding_are_queued() {
        let mut machine = SessionMachine::new();
        let scale = ScaleModel::new(640, 480, &ScaleConfig::default()).unwrap();
        machine.handle(Event::ImageLoaded(scale));

        let t = machine.handle(Event::AddClick(Click::new(1.0, 1.0)));
        assert!(t.effects.is_empty());
        assert!(machine.is_undoable());

        let epoch = machine.epoch();
        let t = machine.handle(Event::EmbeddingReady { epoch });
        assert_eq!(job_of(&t).click, Click::new(1.0, 1.0));
    }

    #[test]
    fn test_undo_is_exact() {
        let mut a_only = ready_machine();
        click_and_complete(&mut a_only, Click::new(1.0, 1.0), 1.0);

        let mut machine = ready_machine();
        click_and_complete(&mut machine, Click::new(1.0, 1.0), 1.0);
        click_and_complete(&mut machine, Click::new(2.0, 2.0), 2.0);

        let t = machine.handle(Event::Undo);
        assert!(matches!(t.effects.as_slice(), [Effect::Retrace]));
        assert_eq!(machine.clicks(), a_only.clicks());
        assert_eq!(machine.current_prediction(), a_only.current_prediction());
        assert_aligned(&machine);
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut machine = ready_machine();
        let before = machine.generation();
        assert_eq!(machine.handle(Event::Undo).outcome, Outcome::Ignored);
        assert_eq!(machine.generation(), before);
    }

    #[test]
    fn test_clear_idempotent() {
        let mut machine = ready_machine();
        assert_eq!(machine.handle(Event::Clear).outcome, Outcome::Ignored);

        click_and_complete(&mut machine, Click::new(1.0, 1.0), 1.0);
        click_and_complete(&mut machine, Click::new(2.0, 2.0), 2.0);
        let t = machine.handle(Event::Clear);
        assert_eq!(t.outcome, Outcome::Applied);
        assert!(machine.clicks().is_empty());
        assert!(machine.current_prediction().is_none());
        assert!(!machine.is_undoable());

        assert_eq!(machine.handle(Event::Clear).outcome, Outcome::Ignored);
    }

    #[test]
    fn test_stale_result_after_undo_is_discarded() {
        let mut machine = ready_machine();
        click_and_complete(&mut machine, Click::new(1.0, 1.0), 1.0);

        let job = job_of(&machine.handle(Event::AddClick(Click::new(2.0, 2.0))));
        machine.handle(Event::Undo);
        assert!(machine.generation() > job.generation);

        let t = succeed(&mut machine, &job, 9.0);
        assert_eq!(t.outcome, Outcome::Discarded);
        assert_eq!(machine.clicks().len(), 1);
        assert_eq!(machine.current_prediction().unwrap().full.data, vec![1.0]);
        assert_aligned(&machine);
    }

    #[test]
    fn test_stale_result_after_clear_is_discarded() {
        let mut machine = ready_machine();
        let job = job_of(&machine.handle(Event::AddClick(Click::new(2.0, 2.0))));
        machine.handle(Event::Clear);

        let t = succeed(&mut machine, &job, 9.0);
        assert_eq!(t.outcome, Outcome::Discarded);
        assert!(machine.clicks().is_empty());
        assert!(!machine.is_inferring());
    }

    #[test]
    fn test_rapid_clicks_queue_behind_running_call() {
        let mut machine = ready_machine();
        let first = job_of(&machine.handle(Event::AddClick(Click::new(1.0, 1.0))));
        // Later clicks wait; the running call is not superseded
        assert!(jobs_of(&machine.handle(Event::AddClick(Click::new(2.0, 2.0)))).is_empty());
        assert!(jobs_of(&machine.handle(Event::AddClick(Click::new(3.0, 3.0)))).is_empty());
        assert_eq!(machine.pending().len(), 3);

        let t = succeed(&mut machine, &first, 1.0);
        assert_eq!(t.outcome, Outcome::Applied);
        let second = job_of(&t);
        assert_eq!(second.committed, vec![Click::new(1.0, 1.0)]);
        assert_eq!(second.click, Click::new(2.0, 2.0));
        assert!(second.previous.is_some());
        assert!(second.generation > first.generation);

        let third = job_of(&succeed(&mut machine, &second, 2.0));
        assert_eq!(third.committed.len(), 2);
        assert!(jobs_of(&succeed(&mut machine, &third, 3.0)).is_empty());

        let tags: Vec<f32> = machine.predictions().iter().map(|p| p.full.data[0]).collect();
        assert_eq!(tags, vec![1.0, 2.0, 3.0]);
        assert!(!machine.is_inferring());
        assert_aligned(&machine);
    }

    #[test]
    fn test_each_click_dispatched_once() {
        let mut machine = ready_machine();
        let mut dispatched = Vec::new();
        let mut running = None;

        for i in 0..5 {
            let jobs = jobs_of(&machine.handle(Event::AddClick(Click::new(i as f64, 0.0))));
            dispatched.extend(jobs.iter().map(|j| j.click));
            running = running.or(jobs.into_iter().next());
        }
        while let Some(job) = running.take() {
            let jobs = jobs_of(&succeed(&mut machine, &job, job.click.x as f32));
            dispatched.extend(jobs.iter().map(|j| j.click));
            running = jobs.into_iter().next();
        }

        let expected: Vec<Click> = (0..5).map(|i| Click::new(i as f64, 0.0)).collect();
        assert_eq!(dispatched, expected);
        assert_eq!(machine.clicks(), expected.as_slice());
    }

    #[test]
    fn test_undo_withdraws_queued_click_without_cancelling() {
        let mut machine = ready_machine();
        click_and_complete(&mut machine, Click::new(1.0, 1.0), 1.0);
        let running = job_of(&machine.handle(Event::AddClick(Click::new(2.0, 2.0))));
        machine.handle(Event::AddClick(Click::new(3.0, 3.0)));

        let t = machine.handle(Event::Undo);
        assert!(t.effects.is_empty());
        assert_eq!(machine.pending(), &[Click::new(2.0, 2.0)]);
        assert!(machine.is_inferring());

        // The running call for (2,2) still lands
        let t = succeed(&mut machine, &running, 2.0);
        assert_eq!(t.outcome, Outcome::Applied);
        assert_eq!(machine.clicks(), &[Click::new(1.0, 1.0), Click::new(2.0, 2.0)]);
    }

    #[test]
    fn test_undo_of_running_click_cancels_it() {
        let mut machine = ready_machine();
        let running = job_of(&machine.handle(Event::AddClick(Click::new(2.0, 2.0))));
        machine.handle(Event::Undo);
        assert!(!machine.is_inferring());
        assert_eq!(succeed(&mut machine, &running, 2.0).outcome, Outcome::Discarded);
        assert!(machine.clicks().is_empty());
    }

    #[test]
    fn test_failure_rolls_back_only_failing_click() {
        let mut machine = ready_machine();
        click_and_complete(&mut machine, Click::new(1.0, 1.0), 1.0);
        let job = job_of(&machine.handle(Event::AddClick(Click::new(2.0, 2.0))));

        let t = machine.handle(Event::InferenceFailed {
            generation: job.generation,
        });
        assert_eq!(t.outcome, Outcome::RolledBack { clicks: 1 });
        assert_eq!(machine.clicks().len(), 1);
        assert!(machine.pending().is_empty());
        assert!(!machine.is_inferring());
        assert_aligned(&machine);
    }

    #[test]
    fn test_failure_mid_queue_keeps_earlier_and_later_clicks() {
        let mut machine = ready_machine();
        let a = job_of(&machine.handle(Event::AddClick(Click::new(1.0, 1.0))));
        machine.handle(Event::AddClick(Click::new(2.0, 2.0)));
        machine.handle(Event::AddClick(Click::new(3.0, 3.0)));

        let b = job_of(&succeed(&mut machine, &a, 1.0));
        let t = machine.handle(Event::InferenceFailed { generation: b.generation });
        assert_eq!(t.outcome, Outcome::RolledBack { clicks: 1 });

        // (3,3) goes next, continuing from the committed (1,1) mask
        let c = job_of(&t);
        assert_eq!(c.click, Click::new(3.0, 3.0));
        assert_eq!(c.committed, vec![Click::new(1.0, 1.0)]);
        succeed(&mut machine, &c, 3.0);

        assert_eq!(machine.clicks(), &[Click::new(1.0, 1.0), Click::new(3.0, 3.0)]);
        assert_aligned(&machine);
    }

    #[test]
    fn test_stale_failure_is_discarded() {
        let mut machine = ready_machine();
        let job = job_of(&machine.handle(Event::AddClick(Click::new(1.0, 1.0))));
        machine.handle(Event::Clear);
        let t = machine.handle(Event::InferenceFailed { generation: job.generation });
        assert_eq!(t.outcome, Outcome::Discarded);
    }

    #[test]
    fn test_image_load_retraces_before_fetch() {
        let mut machine = ready_machine();
        let scale = ScaleModel::new(10, 10, &ScaleConfig::default()).unwrap();
        let t = machine.handle(Event::ImageLoaded(scale));
        let retrace = t.effects.iter().position(|e| matches!(e, Effect::Retrace));
        let fetch = t.effects.iter().position(|e| matches!(e, Effect::FetchEmbedding { .. }));
        assert!(retrace.unwrap() < fetch.unwrap());
    }

    #[test]
    fn test_new_image_resets_history_and_discards_old_embedding() {
        let mut machine = ready_machine();
        click_and_complete(&mut machine, Click::new(1.0, 1.0), 1.0);
        let old_epoch = machine.epoch();

        let scale = ScaleModel::new(10, 10, &ScaleConfig::default()).unwrap();
        machine.handle(Event::ImageLoaded(scale));
        assert!(machine.clicks().is_empty());
        assert!(!machine.embedding_ready());

        let t = machine.handle(Event::EmbeddingReady { epoch: old_epoch });
        assert_eq!(t.outcome, Outcome::Discarded);
        assert!(!machine.embedding_ready());
    }

    #[test]
    fn test_alignment_over_mixed_sequence() {
        let mut machine = ready_machine();
        let ops = ["add", "add", "undo", "add", "clear", "add", "add", "add", "undo", "undo", "add", "clear", "undo"];

        for (i, op) in ops.iter().enumerate() {
            match *op {
                "add" => click_and_complete(&mut machine, Click::new(i as f64, i as f64), i as f32),
                "undo" => {
                    machine.handle(Event::Undo);
                }
                _ => {
                    machine.handle(Event::Clear);
                }
            }
            assert_aligned(&machine);
        }
        assert!(machine.clicks().is_empty());
    }
}
