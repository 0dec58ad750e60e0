//! # Geographic Utilities
//!
//! Core geographic computations used by the metrics and simplification code.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`polyline_length`] | Total length of a track in meters |
//! | [`perpendicular_distance`] | Planar point-to-chord distance in degrees |
//! | [`compute_bounds`] | Bounding box of a track |
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances assume a spherical Earth with radius 6,371,000 m, matching the
//! distances stored by the save-route collaborator. `geo::Haversine` uses the
//! IUGG mean radius and differs slightly.
//!
//! ### Perpendicular Distance
//!
//! The simplifier measures deviation on raw longitude/latitude degrees
//! (`x = lng`, `y = lat`). This is not a physical distance away from the
//! equator; tolerances are therefore expressed in degrees too.

use geo::{BoundingRect, Coord, LineString};

use crate::{Bounds, LocationPoint};

/// Earth radius used for all distance computations, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points in meters.
///
/// # Example
///
/// ```rust
/// use route_tracker::{LocationPoint, geo_utils};
///
/// let london = LocationPoint::new(51.5074, -0.1278, None);
/// let paris = LocationPoint::new(48.8566, 2.3522, None);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_500.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &LocationPoint, p2: &LocationPoint) -> f64 {
    let phi1 = p1.lat.to_radians();
    let phi2 = p2.lat.to_radians();
    let d_phi = (p2.lat - p1.lat).to_radians();
    let d_lambda = (p2.lng - p1.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Total length of a track in meters. Empty or single-point tracks return 0.0.
pub fn polyline_length(points: &[LocationPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Planar distance from `point` to the line through `start` and `end`,
/// in degrees.
///
/// When the chord has zero length (`start == end`) the radial distance from
/// `start` is returned instead.
pub fn perpendicular_distance(point: &LocationPoint, start: &LocationPoint, end: &LocationPoint) -> f64 {
    let p = Coord { x: point.lng, y: point.lat };
    let a = Coord { x: start.lng, y: start.lat };
    let b = Coord { x: end.lng, y: end.lat };

    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let denominator = (dy * dy + dx * dx).sqrt();

    if denominator == 0.0 {
        let rx = p.x - a.x;
        let ry = p.y - a.y;
        return (rx * rx + ry * ry).sqrt();
    }

    let numerator = (dy * p.x - dx * p.y + b.x * a.y - b.y * a.x).abs();
    numerator / denominator
}

// =============================================================================
// Bounds
// =============================================================================

/// Bounding box of a track, or `None` when it is empty.
pub fn compute_bounds(points: &[LocationPoint]) -> Option<Bounds> {
    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord { x: p.lng, y: p.lat })
        .collect();

    line.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}
