//! Click history with exact undo.

mod history;
mod machine;
mod types;

pub use history::History;
pub use machine::SessionMachine;
pub use types::{Click, Effect, Event, Generation, ImageEpoch, InferenceJob, Outcome, Transition};
