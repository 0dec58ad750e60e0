//! Trip metrics derived from a captured route.
//!
//! - **Distance**: sum of haversine segment lengths
//! - **Duration**: elapsed time between the first and last fix, or an
//!   estimate from distance at walking speed when timestamps are missing

use log::warn;
use serde::{Deserialize, Serialize};

use crate::geo_utils::polyline_length;
use crate::LocationPoint;

/// Average walking speed used when a route carries no usable timestamps.
pub const WALKING_SPEED_MPS: f64 = 1.4;

/// Distance and duration of a route.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteMetrics {
    /// Distance in meters
    pub distance_meters: f64,
    /// Duration in whole seconds
    pub duration_seconds: i64,
}

impl RouteMetrics {
    /// Human-readable distance, e.g. "140m" or "2.35km".
    pub fn distance_label(&self) -> String {
        format_distance(self.distance_meters)
    }

    /// Human-readable duration, e.g. "12min" or "1h 5min".
    pub fn duration_label(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

/// Derive metrics for a route assuming walking speed for the duration fallback.
///
/// # Example
/// ```rust
/// use route_tracker::{derive_metrics, LocationPoint};
///
/// let metrics = derive_metrics(&[
///     LocationPoint::new(28.6139, 77.2090, Some(0)),
///     LocationPoint::new(28.6150, 77.2100, Some(60_000)),
/// ]);
/// assert!(metrics.distance_meters > 100.0 && metrics.distance_meters < 200.0);
/// assert_eq!(metrics.duration_seconds, 60);
/// ```
pub fn derive_metrics(points: &[LocationPoint]) -> RouteMetrics {
    derive_metrics_with_speed(points, WALKING_SPEED_MPS)
}

/// Derive metrics for a route, estimating duration at `fallback_speed_mps`
/// when the endpoints lack timestamps.
pub fn derive_metrics_with_speed(points: &[LocationPoint], fallback_speed_mps: f64) -> RouteMetrics {
    if points.len() < 2 {
        return RouteMetrics::default();
    }

    let distance_meters = polyline_length(points);
    let duration_seconds = elapsed_seconds(points)
        .unwrap_or_else(|| (distance_meters / fallback_speed_mps).floor() as i64);

    RouteMetrics {
        distance_meters,
        duration_seconds,
    }
}

/// Whole seconds between the first and last timestamps.
///
/// `None` when either endpoint is untimed or the last precedes the first.
fn elapsed_seconds(points: &[LocationPoint]) -> Option<i64> {
    let first = points.first()?.timestamp?;
    let last = points.last()?.timestamp?;

    if last < first {
        warn!(
            "[MetricsDeriver] Last fix at {} precedes first fix at {}, estimating duration from distance",
            last, first
        );
        return None;
    }

    Some((last - first) / 1000)
}

/// Format a distance: whole meters below 1 km, kilometers with two decimals above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{}m", meters.round() as i64)
    } else {
        format!("{:.2}km", meters / 1000.0)
    }
}

/// Format a duration: minutes below an hour, hours and minutes above.
pub fn format_duration(seconds: i64) -> String {
    let minutes = seconds.max(0) / 60;
    if minutes < 60 {
        return format!("{}min", minutes);
    }
    format!("{}h {}min", minutes / 60, minutes % 60)
}
