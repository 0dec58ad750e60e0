//! Save-route payload.
//!
//! The engine never talks to the remote route store itself. When the caller
//! decides to keep a route it asks for a [`SaveRouteRequest`] and hands it to
//! whatever implements [`RouteSaver`] (an HTTP client, a queue, a test fake).
//!
//! Wire format (JSON, camelCase):
//!
//! ```json
//! {
//!   "title": "Morning walk",
//!   "routePoints": [{"lat": 28.6139, "lng": 77.209, "timestamp": 1700000000000}],
//!   "activityType": "walking",
//!   "isFavourite": false,
//!   "pins": [{"lat": 28.614, "lng": 77.2095, "title": "Chai stall", "description": ""}],
//!   "metrics": {"distanceMeters": 156.5, "durationSeconds": 95}
//! }
//! ```

use log::info;
use serde::{Deserialize, Serialize};

use crate::metrics::{derive_metrics, RouteMetrics};
use crate::{simplify, LocationPoint, Result, TrackerError};

/// Activity type recorded when the caller does not choose one.
pub const DEFAULT_ACTIVITY_TYPE: &str = "walking";

/// A memory annotation dropped on the map along the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Pin {
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Uploaded image URL, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Body of a save-route request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRouteRequest {
    pub title: String,
    pub route_points: Vec<LocationPoint>,
    pub activity_type: String,
    #[serde(default)]
    pub is_favourite: bool,
    #[serde(default)]
    pub pins: Vec<Pin>,
    /// Metrics of the full captured route, before simplification
    pub metrics: RouteMetrics,
}

impl SaveRouteRequest {
    /// Build a request from a captured route.
    ///
    /// Metrics are always derived from the full route. When `epsilon` is
    /// given, the points sent are the simplified route. An empty route or a
    /// blank title is rejected.
    pub fn build(
        title: &str,
        points: &[LocationPoint],
        activity_type: Option<&str>,
        pins: Vec<Pin>,
        epsilon: Option<f64>,
    ) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TrackerError::InvalidPayload {
                message: "route title is empty".to_string(),
            });
        }
        if points.is_empty() {
            return Err(TrackerError::InvalidPayload {
                message: "no route to save".to_string(),
            });
        }

        let metrics = derive_metrics(points);
        let route_points = match epsilon {
            Some(epsilon) => simplify(points, epsilon),
            None => points.to_vec(),
        };

        let activity_type = activity_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_ACTIVITY_TYPE)
            .to_string();

        info!(
            "[RoutePayload] '{}': {} of {} points, {:.0}m, {}s",
            title,
            route_points.len(),
            points.len(),
            metrics.distance_meters,
            metrics.duration_seconds
        );

        Ok(Self {
            title: title.to_string(),
            route_points,
            activity_type,
            is_favourite: false,
            pins,
            metrics,
        })
    }

    /// Mark the route as a favourite when saving it.
    pub fn with_favourite(mut self, is_favourite: bool) -> Self {
        self.is_favourite = is_favourite;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TrackerError::InvalidPayload {
            message: e.to_string(),
        })
    }
}

/// The remote route store.
pub trait RouteSaver {
    /// Persist the route, returning its identifier.
    fn save_route(&mut self, request: &SaveRouteRequest) -> Result<String>;
}
