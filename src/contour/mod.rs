//! Raster to vector: turns a mask tensor into closed polygon loops.

mod path;
mod simplify;
mod tracer;

pub use path::{BoundingBox, Contour, TracedPath};
pub use simplify::{simplify, simplify_contour};
pub use tracer::{trace, MASK_THRESHOLD};
