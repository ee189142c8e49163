//! Consumer-facing raster outputs: cutouts and lasso clips.

mod raster;

pub use raster::fill_polygons;

use crate::contour::TracedPath;
use crate::scale::Point;
use image::{DynamicImage, GrayImage, RgbaImage};

/// Lasso strokes shorter than this are treated as stray drags
pub const MIN_LASSO_POINTS: usize = 8;

/// Coverage mask of a traced outline at Display resolution
pub fn path_mask(path: &TracedPath, width: u32, height: u32) -> GrayImage {
    fill_polygons(path.iter().map(|c| c.points.as_slice()), width, height)
}

/// Keep the pixels of `rgba` under `coverage` and make the rest transparent
fn apply_coverage(mut rgba: RgbaImage, coverage: &GrayImage) -> RgbaImage {
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        if coverage.get_pixel(x, y)[0] == 0 {
            pixel[3] = 0;
        }
    }
    rgba
}

/// Isolate the foreground: source pixels inside the outline, transparent elsewhere
pub fn cutout(image: &DynamicImage, path: &TracedPath) -> RgbaImage {
    let _span = tracing::debug_span!("cutout").entered();
    let rgba = image.to_rgba8();
    let coverage = path_mask(path, rgba.width(), rgba.height());
    apply_coverage(rgba, &coverage)
}

/// Clip an image to freehand lasso polygons given in Display space.
///
/// Strokes with fewer than [`MIN_LASSO_POINTS`] points are dropped. Returns
/// `None` when nothing usable remains.
pub fn clip_to_lasso(image: &RgbaImage, lassos: &[Vec<Point>]) -> Option<RgbaImage> {
    let usable: Vec<&[Point]> = lassos
        .iter()
        .filter(|l| l.len() >= MIN_LASSO_POINTS)
        .map(|l| l.as_slice())
        .collect();

    if usable.is_empty() {
        tracing::debug!("No lasso stroke long enough to clip with");
        return None;
    }

    let coverage = fill_polygons(usable, image.width(), image.height());
    Some(apply_coverage(image.clone(), &coverage))
}
