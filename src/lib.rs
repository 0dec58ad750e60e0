//! # Route Tracker
//!
//! Crash-safe GPS route capture, simplification and trip metrics.
//!
//! This library provides:
//! - A tracking session that turns a live position stream into a durable,
//!   resumable route buffer
//! - Ramer–Douglas–Peucker route simplification
//! - Haversine distance and trip duration derivation
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite-backed key/value store
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_tracker::{derive_metrics, simplify, LocationPoint};
//!
//! let route = vec![
//!     LocationPoint::new(28.6139, 77.2090, Some(1_700_000_000_000)),
//!     LocationPoint::new(28.6145, 77.2095, Some(1_700_000_050_000)),
//!     LocationPoint::new(28.6150, 77.2100, Some(1_700_000_100_000)),
//! ];
//!
//! let simplified = simplify(&route, 0.0001);
//! assert_eq!(simplified.first(), route.first());
//!
//! let metrics = derive_metrics(&route);
//! assert_eq!(metrics.duration_seconds, 100);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{FixError, Result, TrackerError};

// Tracker configuration
pub mod config;
pub use config::{TrackerConfig, WatchOptions};

// Geographic utilities (haversine, perpendicular distance, bounds)
pub mod geo_utils;

// Route simplification (Ramer–Douglas–Peucker)
pub mod simplify;
pub use simplify::{simplify, simplify_indices, simplify_with_stats, SimplifyStats};

// Trip metrics (distance, duration)
pub mod metrics;
pub use metrics::{derive_metrics, format_distance, format_duration, RouteMetrics};

// Key/value persistence port
pub mod store;
pub use store::{KeyValueStore, MemoryStore};
#[cfg(feature = "persistence")]
pub use store::SqliteStore;

// Durable route buffer
pub mod buffer;
pub use buffer::{Durability, DurableRouteBuffer};

// Position sources
pub mod source;
pub use source::{ChannelSource, FixInjector, PositionEvent, PositionSource, UnsupportedSource, WatchHandle};

// Online/offline observer
pub mod connectivity;
pub use connectivity::ConnectivityMonitor;

// Tracking state machine
pub mod session;
pub use session::{SessionState, TrackingSession};

// Single-consumer tracker task with observables
pub mod service;
pub use service::{TrackerHandle, TrackerService};

// Save-route payload handed to the remote collaborator
pub mod payload;
pub use payload::{Pin, RouteSaver, SaveRouteRequest};

// Synthetic routes and replaying source
pub mod synthetic;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("RouteTrackerRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A single captured fix.
///
/// Points produced by a position source always carry a timestamp in
/// milliseconds since the Unix epoch. Points coming back from a collaborator
/// may not, in which case duration falls back to a distance estimate.
///
/// # Example
/// ```
/// use route_tracker::LocationPoint;
/// let point = LocationPoint::new(51.5074, -0.1278, Some(1_700_000_000_000)); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct LocationPoint {
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl LocationPoint {
    /// Create a new point.
    pub fn new(lat: f64, lng: f64, timestamp: Option<i64>) -> Self {
        Self { lat, lng, timestamp }
    }

    /// Create a point stamped with the current wall-clock time.
    pub fn now(lat: f64, lng: f64) -> Self {
        Self::new(lat, lng, Some(now_millis()))
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }
}

/// Bounding box for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Tests
// ============================================================================
