use crate::scale::Point;
use std::fmt::Write;

/// One closed loop. The last point connects back to the first implicitly.
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shoelace area in y-down coordinates.
    ///
    /// Outer boundaries come out positive (clockwise on screen), holes negative.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            sum += a.x * b.y - b.x * a.y;
        }
        sum / 2.0
    }

    pub fn is_hole(&self) -> bool {
        self.signed_area() < 0.0
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.points.iter())
    }

    /// SVG path data: `M x,y L x,y ... Z`
    pub fn to_svg_path(&self) -> String {
        let mut path = String::new();
        for (i, p) in self.points.iter().enumerate() {
            let cmd = if i == 0 { 'M' } else { 'L' };
            let _ = write!(path, "{} {:.3},{:.3} ", cmd, p.x, p.y);
        }
        if !path.is_empty() {
            path.push('Z');
        }
        path
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    fn from_points<'a>(mut points: impl Iterator<Item = &'a Point>) -> Option<Self> {
        let first = points.next()?;
        let mut bbox = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in points {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// The traced outline of a mask, in Display space.
///
/// Loops are in discovery order. Outer boundaries wind clockwise on screen and
/// holes counter-clockwise, so either the nonzero or the even-odd rule fills
/// the foreground correctly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TracedPath {
    pub contours: Vec<Contour>,
}

impl TracedPath {
    pub fn new(contours: Vec<Contour>) -> Self {
        Self { contours }
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contours.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contour> {
        self.contours.iter()
    }

    pub fn outer_boundaries(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter().filter(|c| !c.is_hole())
    }

    pub fn holes(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter().filter(|c| c.is_hole())
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.contours.iter().flat_map(|c| c.points.iter()))
    }

    /// One path string per loop
    pub fn svg_paths(&self) -> Vec<String> {
        self.contours.iter().map(Contour::to_svg_path).collect()
    }

    /// Standalone SVG document sized to the Display image
    pub fn to_svg_document(&self, width: u32, height: u32) -> String {
        let mut doc = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
            w = width,
            h = height
        );
        if !self.is_empty() {
            let data = self.svg_paths().join(" ");
            let _ = writeln!(doc, "  <path fill-rule=\"nonzero\" d=\"{}\"/>", data);
        }
        doc.push_str("</svg>\n");
        doc
    }
}

impl<'a> IntoIterator for &'a TracedPath {
    type Item = &'a Contour;
    type IntoIter = std::slice::Iter<'a, Contour>;

    fn into_iter(self) -> Self::IntoIter {
        self.contours.iter()
    }
}
