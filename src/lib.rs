//! Click-to-select foreground extraction.
//!
//! Positive clicks on an image are sent, together with a precomputed image
//! embedding, to a prompt-driven mask decoder. The resulting mask is traced
//! into closed polygons in the coordinate space the image is displayed in.

pub mod contour;
pub mod editor;
pub mod embedding;
pub mod error;
pub mod inference;
pub mod render;
pub mod scale;
pub mod segmentation;
pub mod session;

pub use contour::{trace, Contour, TracedPath};
pub use editor::{Editor, EditorConfig, HostNotifier, LogNotifier};
pub use error::EditorError;
pub use scale::{HostViewport, Point, ScaleConfig, ScaleModel, ViewportConfig};
pub use session::{Click, Outcome, SessionMachine};
