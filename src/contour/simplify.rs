use super::path::{Contour, TracedPath};
use crate::scale::Point;

/// Perpendicular distance from `p` to the segment `a-b`
fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-12 {
        return p.distance_to(a);
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

fn douglas_peucker(points: &[Point], tolerance: f64, keep: &mut [bool]) {
    if points.len() < 3 {
        return;
    }
    let first = points[0];
    let last = points[points.len() - 1];

    let (index, max_dist) = points[1..points.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, p)| (i + 1, distance_to_segment(p, &first, &last)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if max_dist > tolerance {
        keep[index] = true;
        douglas_peucker(&points[..=index], tolerance, &mut keep[..=index]);
        douglas_peucker(&points[index..], tolerance, &mut keep[index..]);
    }
}

/// Douglas-Peucker on a closed loop.
///
/// The loop is split at its first point and the point farthest from it, so
/// both halves are simplified as open polylines. Loops that would drop below
/// three points are returned unchanged.
pub fn simplify_contour(contour: &Contour, tolerance: f64) -> Contour {
    let points = &contour.points;
    if tolerance <= 0.0 || points.len() <= 4 {
        return contour.clone();
    }

    let anchor = points[0];
    let split = (1..points.len())
        .max_by(|&a, &b| {
            anchor
                .distance_to(&points[a])
                .total_cmp(&anchor.distance_to(&points[b]))
        })
        .unwrap_or(1);

    let mut closed: Vec<Point> = points.clone();
    closed.push(anchor);

    let mut keep = vec![false; closed.len()];
    keep[0] = true;
    keep[split] = true;
    douglas_peucker(&closed[..=split], tolerance, &mut keep[..=split]);
    douglas_peucker(&closed[split..], tolerance, &mut keep[split..]);

    let simplified: Vec<Point> = closed[..points.len()]
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(p, _)| *p)
        .collect();

    if simplified.len() < 3 {
        contour.clone()
    } else {
        Contour::new(simplified)
    }
}

pub fn simplify(path: &TracedPath, tolerance: f64) -> TracedPath {
    if tolerance <= 0.0 {
        return path.clone();
    }
    TracedPath::new(path.iter().map(|c| simplify_contour(c, tolerance)).collect())
}
