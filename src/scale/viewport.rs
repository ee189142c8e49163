use super::Point;

/// Bounds the host window is allowed to grow to
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportConfig {
    pub max_width: f64,
    pub max_height: f64,
    /// Height reserved for the toolbar row
    pub toolbar_height: u32,
    /// Height of the optional banner row
    pub banner_height: u32,
    pub show_banner: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            max_width: 800.0,
            max_height: 600.0,
            toolbar_height: 52,
            banner_height: 52,
            show_banner: false,
        }
    }
}

/// Window size requested from the host plus the canvas scale it implies
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HostViewport {
    pub width: u32,
    pub height: u32,
    /// Display -> canvas
    pub scale_to_fit: f64,
}

impl HostViewport {
    /// Scale-to-fit an image of natural size `width x height`
    pub fn fit(width: u32, height: u32, config: &ViewportConfig) -> Self {
        let w = width.max(1) as f64;
        let h = height.max(1) as f64;
        let scale_to_fit = (config.max_width / w).min(config.max_height / h);

        let chrome = config.toolbar_height
            + if config.show_banner {
                config.banner_height
            } else {
                0
            };

        Self {
            width: (w * scale_to_fit).ceil() as u32,
            height: (h * scale_to_fit).ceil() as u32 + chrome,
            scale_to_fit,
        }
    }

    /// Map a pointer position on the canvas into Display space
    pub fn canvas_to_display(&self, p: Point) -> Point {
        Point::new(p.x / self.scale_to_fit, p.y / self.scale_to_fit)
    }

    pub fn display_to_canvas(&self, p: Point) -> Point {
        p.scaled(self.scale_to_fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_wide_image() {
        let vp = HostViewport::fit(1600, 900, &ViewportConfig::default());
        assert!((vp.scale_to_fit - 0.5).abs() < 1e-12);
        assert_eq!(vp.width, 800);
        assert_eq!(vp.height, 450 + 52);
    }

    #[test]
    fn test_fit_tall_image_with_banner() {
        let config = ViewportConfig {
            show_banner: true,
            ..ViewportConfig::default()
        };
        let vp = HostViewport::fit(300, 1200, &config);
        assert!((vp.scale_to_fit - 0.5).abs() < 1e-12);
        assert_eq!(vp.width, 150);
        assert_eq!(vp.height, 600 + 104);
    }

    #[test]
    fn test_small_image_is_enlarged() {
        let vp = HostViewport::fit(3, 6, &ViewportConfig::default());
        // min(800/3, 600/6) = 100
        assert_eq!(vp.width, 300);
        assert_eq!(vp.height, 600 + 52);

        // height-bound: min(800/1, 600/3) = 200
        let vp = HostViewport::fit(1, 3, &ViewportConfig::default());
        assert!((vp.scale_to_fit - 200.0).abs() < 1e-12);
        assert_eq!(vp.width, 200);
    }

    #[test]
    fn test_canvas_round_trip() {
        let vp = HostViewport::fit(1000, 1000, &ViewportConfig::default());
        let p = Point::new(120.0, 33.0);
        let back = vp.display_to_canvas(vp.canvas_to_display(p));
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
    }
}
