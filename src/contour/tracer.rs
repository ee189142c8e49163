//! Boundary extraction along pixel edges ("crack following").
//!
//! Every side shared by an inside pixel and an outside pixel (or the raster
//! border) becomes a directed unit edge on the pixel-corner lattice, oriented
//! so the inside pixel lies on its right. Following those edges yields closed
//! loops: outer boundaries run clockwise on screen, holes counter-clockwise.
//!
//! Where two inside pixels only touch diagonally, a lattice vertex carries two
//! outgoing edges. The walker always takes the sharpest right turn there, so
//! the loop hugs its own pixel and foreground is 4-connected. Loops may touch
//! at such a vertex but never cross.

use super::path::{Contour, TracedPath};
use crate::scale::Point;
use crate::segmentation::MaskTensor;

/// Logit threshold separating foreground from background
pub const MASK_THRESHOLD: f32 = 0.0;

const RIGHT: u8 = 0;
const DOWN: u8 = 1;
const LEFT: u8 = 2;
const UP: u8 = 3;

#[inline]
fn step(dir: u8) -> (i64, i64) {
    match dir {
        RIGHT => (1, 0),
        DOWN => (0, 1),
        LEFT => (-1, 0),
        _ => (0, -1),
    }
}

/// Outgoing edge bitsets per lattice vertex, `(width + 1) x (height + 1)`
struct EdgeLattice {
    stride: usize,
    outgoing: Vec<u8>,
    visited: Vec<u8>,
}

impl EdgeLattice {
    fn build(mask: &MaskTensor) -> Self {
        let (w, h) = (mask.width, mask.height);
        let stride = w + 1;
        let mut outgoing = vec![0u8; stride * (h + 1)];

        let inside = |x: i64, y: i64| -> bool {
            x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h && mask.get(x as usize, y as usize) > MASK_THRESHOLD
        };

        for y in 0..h {
            for x in 0..w {
                let (xi, yi) = (x as i64, y as i64);
                if !inside(xi, yi) {
                    continue;
                }
                if !inside(xi, yi - 1) {
                    outgoing[y * stride + x] |= 1 << RIGHT;
                }
                if !inside(xi + 1, yi) {
                    outgoing[y * stride + x + 1] |= 1 << DOWN;
                }
                if !inside(xi, yi + 1) {
                    outgoing[(y + 1) * stride + x + 1] |= 1 << LEFT;
                }
                if !inside(xi - 1, yi) {
                    outgoing[(y + 1) * stride + x] |= 1 << UP;
                }
            }
        }

        let visited = vec![0u8; outgoing.len()];
        Self {
            stride,
            outgoing,
            visited,
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }

    #[inline]
    fn has(&self, vertex: usize, dir: u8) -> bool {
        self.outgoing[vertex] & (1 << dir) != 0
    }

    #[inline]
    fn unvisited(&self, vertex: usize, dir: u8) -> bool {
        self.has(vertex, dir) && self.visited[vertex] & (1 << dir) == 0
    }

    /// Edge leaving `vertex` after arriving with heading `heading`.
    ///
    /// Chosen from the lattice alone, never from visit state, so each edge has
    /// exactly one predecessor and loops cannot leak into each other at saddles.
    fn next_dir(&self, vertex: usize, heading: u8) -> Option<u8> {
        let right = (heading + 1) % 4;
        let left = (heading + 3) % 4;
        [right, heading, left]
            .into_iter()
            .find(|&d| self.has(vertex, d))
    }

    /// Walk one loop starting on the unvisited edge `(x, y, dir)`.
    ///
    /// Returns lattice corners only; collinear vertices are dropped.
    fn walk(&mut self, start_x: usize, start_y: usize, start_dir: u8) -> Vec<(usize, usize)> {
        let mut vertices: Vec<(usize, usize, u8)> = Vec::new();
        let (mut x, mut y, mut dir) = (start_x, start_y, start_dir);

        loop {
            let vertex = self.index(x, y);
            self.visited[vertex] |= 1 << dir;
            vertices.push((x, y, dir));

            let (dx, dy) = step(dir);
            x = (x as i64 + dx) as usize;
            y = (y as i64 + dy) as usize;

            let next_vertex = self.index(x, y);
            match self.next_dir(next_vertex, dir) {
                Some(next) if self.unvisited(next_vertex, next) => dir = next,
                // Back on the starting edge
                _ => break,
            }
        }

        // A vertex is a corner when the heading into it differs from the heading out
        let n = vertices.len();
        (0..n)
            .filter(|&i| {
                let incoming = vertices[(i + n - 1) % n].2;
                incoming != vertices[i].2
            })
            .map(|i| (vertices[i].0, vertices[i].1))
            .collect()
    }
}

/// Trace the sign boundary of a mask.
///
/// Lattice coordinates are multiplied by `display_scale`, which maps the
/// tensor's pixel grid into Display space. An all-background mask gives an
/// empty path. Output order is fixed by a raster scan for the first boundary
/// edge of each loop, so identical input always yields identical output.
pub fn trace(mask: &MaskTensor, display_scale: f64) -> TracedPath {
    let _span = tracing::debug_span!("trace", width = mask.width, height = mask.height).entered();

    if mask.width == 0 || mask.height == 0 {
        return TracedPath::default();
    }

    let mut lattice = EdgeLattice::build(mask);
    let mut contours = Vec::new();

    for y in 0..=mask.height {
        for x in 0..=mask.width {
            let vertex = lattice.index(x, y);
            if lattice.outgoing[vertex] == 0 {
                continue;
            }
            for dir in [RIGHT, DOWN, LEFT, UP] {
                if !lattice.unvisited(vertex, dir) {
                    continue;
                }
                let corners = lattice.walk(x, y, dir);
                let points = corners
                    .into_iter()
                    .map(|(cx, cy)| Point::new(cx as f64 * display_scale, cy as f64 * display_scale))
                    .collect();
                contours.push(Contour::new(points));
            }
        }
    }

    tracing::debug!("Traced {} contour(s)", contours.len());
    TracedPath::new(contours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> MaskTensor {
        let height = rows.len();
        let width = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| if c == '#' { 1.0 } else { -1.0 }))
            .collect();
        MaskTensor::new(width, height, data).unwrap()
    }

    fn pts(contour: &Contour) -> Vec<(f64, f64)> {
        contour.points.iter().map(|p| (p.x, p.y)).collect()
    }

    #[test]
    fn test_empty_mask() {
        let mask = MaskTensor::new(100, 100, vec![0.0; 10_000]).unwrap();
        assert!(trace(&mask, 1.0).is_empty());

        let negative = MaskTensor::new(8, 8, vec![-3.5; 64]).unwrap();
        assert!(trace(&negative, 2.0).is_empty());
    }

    #[test]
    fn test_single_square_block() {
        let mut data = vec![0.0; 100 * 100];
        for y in 40..50 {
            for x in 20..30 {
                data[y * 100 + x] = 4.0;
            }
        }
        let mask = MaskTensor::new(100, 100, data).unwrap();
        let traced = trace(&mask, 1.0);

        assert_eq!(traced.len(), 1);
        let bbox = traced.bounding_box().unwrap();
        assert!((bbox.min_x - 20.0).abs() <= 1.0);
        assert!((bbox.min_y - 40.0).abs() <= 1.0);
        assert!((bbox.max_x - 30.0).abs() <= 1.0);
        assert!((bbox.max_y - 50.0).abs() <= 1.0);
        assert_eq!(pts(&traced.contours[0]), vec![(20.0, 40.0), (30.0, 40.0), (30.0, 50.0), (20.0, 50.0)]);
        assert_eq!(traced.contours[0].signed_area(), 100.0);
    }

    #[test]
    fn test_single_pixel() {
        let mask = mask_from_rows(&["...", ".#.", "..."]);
        let traced = trace(&mask, 1.0);
        assert_eq!(traced.len(), 1);
        assert_eq!(pts(&traced.contours[0]), vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0)]);
    }

    #[test]
    fn test_display_scale_applied() {
        let mask = mask_from_rows(&["#."]);
        let traced = trace(&mask, 2.5);
        assert_eq!(pts(&traced.contours[0]), vec![(0.0, 0.0), (2.5, 0.0), (2.5, 2.5), (0.0, 2.5)]);
    }

    #[test]
    fn test_disjoint_regions_in_scan_order() {
        let mask = mask_from_rows(&[
            "......",
            "....##",
            "......",
            ".#....",
        ]);
        let traced = trace(&mask, 1.0);
        assert_eq!(traced.len(), 2);
        assert_eq!(traced.contours[0].bounding_box().unwrap().min_x, 4.0);
        assert_eq!(traced.contours[1].bounding_box().unwrap().min_y, 3.0);
        assert!(traced.iter().all(|c| !c.is_hole()));
    }

    #[test]
    fn test_hole_has_opposite_winding() {
        let mask = mask_from_rows(&[
            "#####",
            "#...#",
            "#...#",
            "#####",
        ]);
        let traced = trace(&mask, 1.0);
        assert_eq!(traced.len(), 2);
        assert_eq!(traced.outer_boundaries().count(), 1);
        assert_eq!(traced.holes().count(), 1);

        let outer = traced.outer_boundaries().next().unwrap();
        let hole = traced.holes().next().unwrap();
        assert_eq!(outer.signed_area(), 20.0);
        assert_eq!(hole.signed_area(), -6.0);
    }

    #[test]
    fn test_diagonal_pixels_are_separate_loops() {
        let mask = mask_from_rows(&["#.", ".#"]);
        let traced = trace(&mask, 1.0);
        assert_eq!(traced.len(), 2);
        for contour in &traced {
            assert_eq!(contour.len(), 4);
            assert_eq!(contour.signed_area(), 1.0);
        }
    }

    #[test]
    fn test_l_shape_corners() {
        let mask = mask_from_rows(&["#.", "##"]);
        let traced = trace(&mask, 1.0);
        assert_eq!(traced.len(), 1);
        assert_eq!(
            pts(&traced.contours[0]),
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (0.0, 2.0)]
        );
        assert_eq!(traced.contours[0].signed_area(), 3.0);
    }

    #[test]
    fn test_full_mask_follows_border() {
        let mask = MaskTensor::new(4, 3, vec![1.0; 12]).unwrap();
        let traced = trace(&mask, 1.0);
        assert_eq!(traced.len(), 1);
        assert_eq!(pts(&traced.contours[0]), vec![(0.0, 0.0), (4.0, 0.0), (4.0, 3.0), (0.0, 3.0)]);
    }

    #[test]
    fn test_deterministic_output() {
        let mask = mask_from_rows(&[
            "#.#.#",
            ".###.",
            "##.##",
            ".###.",
            "#.#.#",
        ]);
        let a = trace(&mask, 1.5);
        let b = trace(&mask, 1.5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_total_area_matches_pixel_count() {
        let mask = mask_from_rows(&[
            "#.#.#",
            ".###.",
            "##.##",
            ".###.",
            "#.#.#",
        ]);
        let traced = trace(&mask, 1.0);
        let area: f64 = traced.iter().map(Contour::signed_area).sum();
        let count = mask.data.iter().filter(|&&v| v > MASK_THRESHOLD).count();
        assert_eq!(area, count as f64);
    }
}
