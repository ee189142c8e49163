mod viewport;

pub use viewport::{HostViewport, ViewportConfig};

/// A 2-D point. The space it lives in is implied by where it came from.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Fixed caps that define Upload and Model space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleConfig {
    /// Longest side of the image sent to the embedding service
    pub upload_cap: f64,
    /// Target for the shortest side when encoding prompts
    pub prompt_size: f64,
    /// Hard ceiling on the scaled prompt extent
    pub prompt_ceiling: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            upload_cap: 1024.0,
            prompt_size: 500.0,
            prompt_ceiling: 1333.0,
        }
    }
}

/// Scale factors derived from an image's natural size.
///
/// Three spaces are involved:
/// - Display: the image's own pixel grid, where clicks and outlines live
/// - Upload: the image shrunk so its longest side equals `upload_cap`
/// - Model: the prompt encoding space, shortest side normalised to `prompt_size`
///
/// Everything here is a pure function of `(width, height, config)`; no
/// rounding happens except in [`ScaleModel::upload_size`] and
/// [`ScaleModel::model_input_size`], which address pixel buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleModel {
    pub image_width: u32,
    pub image_height: u32,
    /// Display -> Upload
    pub upload_scale: f64,
    /// Display -> Model
    pub prompt_scale: f64,
    /// Upload -> Model
    pub onnx_scale: f64,
}

impl ScaleModel {
    /// Returns `None` for a zero-sized image.
    pub fn new(image_width: u32, image_height: u32, config: &ScaleConfig) -> Option<Self> {
        if image_width == 0 || image_height == 0 {
            return None;
        }

        let w = image_width as f64;
        let h = image_height as f64;

        let upload_scale = config.upload_cap / w.max(h);

        let shortest = w.min(h);
        let mut prompt_scale = config.prompt_size / shortest;
        if shortest * prompt_scale > config.prompt_ceiling {
            prompt_scale = config.prompt_ceiling / shortest;
        }

        Some(Self {
            image_width,
            image_height,
            upload_scale,
            prompt_scale,
            onnx_scale: prompt_scale / upload_scale,
        })
    }

    /// Factor that takes Upload-space (mask tensor) coordinates back to Display space
    pub fn display_scale(&self) -> f64 {
        1.0 / self.upload_scale
    }

    /// Pixel size of the Upload-space image, rounded half away from zero
    pub fn upload_size(&self) -> (u32, u32) {
        (
            round_extent(self.image_width, self.upload_scale),
            round_extent(self.image_height, self.upload_scale),
        )
    }

    /// Pixel size of the image as seen in Model space
    pub fn model_input_size(&self) -> (u32, u32) {
        (
            round_extent(self.image_width, self.prompt_scale),
            round_extent(self.image_height, self.prompt_scale),
        )
    }

    pub fn display_to_upload(&self, p: Point) -> Point {
        p.scaled(self.upload_scale)
    }

    pub fn upload_to_display(&self, p: Point) -> Point {
        Point::new(p.x / self.upload_scale, p.y / self.upload_scale)
    }

    pub fn upload_to_model(&self, p: Point) -> Point {
        p.scaled(self.onnx_scale)
    }

    pub fn model_to_upload(&self, p: Point) -> Point {
        Point::new(p.x / self.onnx_scale, p.y / self.onnx_scale)
    }

    pub fn display_to_model(&self, p: Point) -> Point {
        p.scaled(self.prompt_scale)
    }

    pub fn model_to_display(&self, p: Point) -> Point {
        Point::new(p.x / self.prompt_scale, p.y / self.prompt_scale)
    }
}

fn round_extent(extent: u32, scale: f64) -> u32 {
    // f64::round is half away from zero, which matches Math.round for positives
    ((extent as f64 * scale).round() as u32).max(1)
}
