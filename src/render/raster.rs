use crate::scale::Point;
use image::GrayImage;

/// Rasterise closed polygons with the nonzero winding rule.
///
/// A pixel is covered when its centre lies inside. Returns a 0/255 coverage
/// mask of `width x height`.
pub fn fill_polygons<'a, I>(polygons: I, width: u32, height: u32) -> GrayImage
where
    I: IntoIterator<Item = &'a [Point]>,
{
    let mut coverage = GrayImage::new(width, height);

    // Directed edges with non-zero height: (x0, y0, x1, y1, winding)
    let mut edges: Vec<(f64, f64, f64, f64, i32)> = Vec::new();
    for polygon in polygons {
        let n = polygon.len();
        if n < 3 {
            continue;
        }
        for i in 0..n {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            if a.y == b.y {
                continue;
            }
            let winding = if b.y > a.y { 1 } else { -1 };
            edges.push((a.x, a.y, b.x, b.y, winding));
        }
    }

    if edges.is_empty() {
        return coverage;
    }

    let mut crossings: Vec<(f64, i32)> = Vec::new();
    for py in 0..height {
        let sy = py as f64 + 0.5;
        crossings.clear();

        for &(x0, y0, x1, y1, winding) in &edges {
            let (lo, hi) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
            // Half-open so a shared vertex is counted once
            if sy < lo || sy >= hi {
                continue;
            }
            let t = (sy - y0) / (y1 - y0);
            crossings.push((x0 + t * (x1 - x0), winding));
        }

        if crossings.is_empty() {
            continue;
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            if winding == 0 {
                continue;
            }
            // Pixels whose centre falls in [start, end)
            let start = (pair[0].0 - 0.5).ceil().max(0.0);
            let end = (pair[1].0 - 0.5).ceil().min(width as f64);
            let mut px = start;
            while px < end {
                coverage.put_pixel(px as u32, py, image::Luma([255]));
                px += 1.0;
            }
        }
    }

    coverage
}
