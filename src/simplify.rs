//! Ramer–Douglas–Peucker route simplification.
//!
//! Reduces a captured route to a visually equivalent polyline:
//! 1. Take the chord from the first to the last point of a span
//! 2. Find the interior point furthest from that chord
//! 3. If it deviates more than `epsilon`, keep it and split the span there
//! 4. Otherwise the chord endpoints alone represent the span
//!
//! Spans are processed from an explicit work stack. The kept set is the same
//! as the recursive formulation produces.
//!
//! Deviation is measured with [`perpendicular_distance`] on raw degrees, so
//! `epsilon` is a tolerance in degrees (0.0001° is roughly 11 m of latitude).

use log::debug;

use crate::geo_utils::perpendicular_distance;
use crate::LocationPoint;

/// Input/output sizes of a simplification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplifyStats {
    pub input_points: usize,
    pub output_points: usize,
}

impl SimplifyStats {
    /// Fraction of input points removed (0.0 when nothing was dropped).
    pub fn reduction(&self) -> f64 {
        if self.input_points == 0 {
            return 0.0;
        }
        1.0 - self.output_points as f64 / self.input_points as f64
    }
}

/// Simplify a route, keeping its first and last points.
///
/// Routes with fewer than 3 points are returned unchanged. A negative or NaN
/// `epsilon` is treated as 0.
///
/// # Example
/// ```rust
/// use route_tracker::{simplify, LocationPoint};
///
/// let route = vec![
///     LocationPoint::new(0.0, 0.0, Some(0)),
///     LocationPoint::new(0.0, 0.001, Some(1_000)),
///     LocationPoint::new(0.0, 0.002, Some(2_000)),
/// ];
/// let simplified = simplify(&route, 50.0);
/// assert_eq!(simplified, vec![route[0], route[2]]);
/// ```
pub fn simplify(points: &[LocationPoint], epsilon: f64) -> Vec<LocationPoint> {
    simplify_indices(points, epsilon)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

/// Indices of the input points kept by [`simplify`], in ascending order.
pub fn simplify_indices(points: &[LocationPoint], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let epsilon = if epsilon.is_nan() || epsilon < 0.0 { 0.0 } else { epsilon };

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end - start < 2 {
            continue;
        }

        let (index, max_dist) = furthest_from_chord(points, start, end);
        if index != start && max_dist > epsilon {
            keep[index] = true;
            stack.push((index, end));
            stack.push((start, index));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect()
}

/// Run [`simplify`] and report how much it removed.
pub fn simplify_with_stats(points: &[LocationPoint], epsilon: f64) -> (Vec<LocationPoint>, SimplifyStats) {
    let simplified = simplify(points, epsilon);
    let stats = SimplifyStats {
        input_points: points.len(),
        output_points: simplified.len(),
    };
    debug!(
        "[RouteSimplifier] {} -> {} points (epsilon {})",
        stats.input_points, stats.output_points, epsilon
    );
    (simplified, stats)
}

/// First interior index with the largest deviation from the chord
/// `points[start]..points[end]`. Returns `(start, 0.0)` if no interior point
/// deviates at all.
fn furthest_from_chord(points: &[LocationPoint], start: usize, end: usize) -> (usize, f64) {
    let mut index = start;
    let mut max_dist = 0.0;

    for i in (start + 1)..end {
        let dist = perpendicular_distance(&points[i], &points[start], &points[end]);
        if dist > max_dist {
            index = i;
            max_dist = dist;
        }
    }

    (index, max_dist)
}
