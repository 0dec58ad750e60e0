//! FFI bindings for mobile platforms (iOS/Android).
//!
//! Stateless helpers (simplification, metrics, formatting) are plain
//! functions. Tracking goes through a process-wide session backed by SQLite:
//! the host app calls `tracker_init` once with its database path, forwards
//! every platform location callback to `tracker_push_fix` /
//! `tracker_push_error`, and reads observables back with the `tracker_*`
//! getters. If the app was killed mid-walk, `tracker_init` resumes tracking
//! with the route captured so far.

use std::sync::{Mutex, PoisonError};

use log::{info, warn};
use once_cell::sync::Lazy;

use crate::geo_utils::compute_bounds;
use crate::{
    derive_metrics, format_distance, format_duration, init_logging, simplify, Bounds, ChannelSource,
    ConnectivityMonitor, Durability, FixError, FixInjector, LocationPoint, Pin, RouteMetrics,
    RouteSaver, SaveRouteRequest, SessionState, SqliteStore, TrackerConfig, TrackerError, TrackingSession,
};

// ============================================================================
// Save Route Callback Interface
// ============================================================================

/// Callback interface the host implements to persist a route remotely.
#[uniffi::export(callback_interface)]
pub trait RouteSaverCallback: Send + Sync {
    /// Persist the JSON save-route body. Returns the new route id, or `None`
    /// if the route was not saved.
    fn save_route_json(&self, body: String) -> Option<String>;
}

struct CallbackSaver(Box<dyn RouteSaverCallback>);

impl RouteSaver for CallbackSaver {
    fn save_route(&mut self, request: &SaveRouteRequest) -> crate::Result<String> {
        let body = request.to_json()?;
        self.0.save_route_json(body).ok_or_else(|| TrackerError::SaveFailed {
            message: format!("host rejected '{}'", request.title),
        })
    }
}

// ============================================================================
// Route Functions
// ============================================================================

/// Simplify a route with the given tolerance (degrees).
#[uniffi::export]
pub fn simplify_route(points: Vec<LocationPoint>, epsilon: f64) -> Vec<LocationPoint> {
    simplify(&points, epsilon)
}

/// Distance and duration of a route.
#[uniffi::export]
pub fn derive_route_metrics(points: Vec<LocationPoint>) -> RouteMetrics {
    derive_metrics(&points)
}

/// "850m" / "2.35km"
#[uniffi::export]
pub fn format_route_distance(meters: f64) -> String {
    format_distance(meters)
}

/// "45min" / "1h 30min"
#[uniffi::export]
pub fn format_route_duration(seconds: i64) -> String {
    format_duration(seconds)
}

// ============================================================================
// Global Tracker
// ============================================================================

struct FfiTracker {
    session: TrackingSession<SqliteStore, ChannelSource>,
    injector: FixInjector,
}

static TRACKER: Lazy<Mutex<Option<FfiTracker>>> = Lazy::new(|| Mutex::new(None));

static CONNECTIVITY: Lazy<ConnectivityMonitor> = Lazy::new(ConnectivityMonitor::default);

/// Run `f` against the initialized tracker, or return `None` before `tracker_init`.
fn with_tracker<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut FfiTracker) -> R,
{
    let mut guard = TRACKER.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_mut() {
        Some(tracker) => Some(f(tracker)),
        None => {
            warn!("[RouteTrackerFfi] Tracker used before tracker_init");
            None
        }
    }
}

/// Open (or create) the tracker database and restore the session.
///
/// Returns false if the database could not be opened. Calling it again
/// replaces the current session.
#[uniffi::export]
pub fn tracker_init(db_path: String) -> bool {
    init_logging();

    let store = match SqliteStore::new(&db_path) {
        Ok(store) => store,
        Err(e) => {
            warn!("[RouteTrackerFfi] Failed to open {}: {}", db_path, e);
            return false;
        }
    };

    let source = ChannelSource::new();
    let injector = source.injector();
    let session = TrackingSession::new(store, source, TrackerConfig::default());
    info!(
        "[RouteTrackerFfi] Initialized with {} points ({:?})",
        session.route_points().len(),
        session.state()
    );

    let mut guard = TRACKER.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(FfiTracker { session, injector });
    true
}

/// Start tracking. Returns false if the tracker is not initialized or the
/// watch could not be armed.
#[uniffi::export]
pub fn tracker_start() -> bool {
    with_tracker(|t| match t.session.start() {
        Ok(()) => true,
        Err(e) => {
            warn!("[RouteTrackerFfi] Start failed: {}", e);
            false
        }
    })
    .unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_stop() {
    with_tracker(|t| t.session.stop());
}

#[uniffi::export]
pub fn tracker_clear() {
    with_tracker(|t| t.session.clear_route());
}

/// Deliver a platform location fix. Ignored unless tracking.
#[uniffi::export]
pub fn tracker_push_fix(lat: f64, lng: f64, timestamp_ms: i64) {
    with_tracker(|t| {
        if t.injector.push_fix(lat, lng, timestamp_ms) {
            t.session.process_pending();
        }
    });
}

/// Deliver a platform location error code (1 denied, 2 unavailable, 3 timeout).
#[uniffi::export]
pub fn tracker_push_error(code: u16) {
    with_tracker(|t| {
        if t.injector.push_error(FixError::from_code(code)) {
            t.session.process_pending();
        }
    });
}

#[uniffi::export]
pub fn tracker_route_points() -> Vec<LocationPoint> {
    with_tracker(|t| t.session.route_points().to_vec()).unwrap_or_default()
}

#[uniffi::export]
pub fn tracker_current_location() -> Option<LocationPoint> {
    with_tracker(|t| t.session.current_location()).flatten()
}

#[uniffi::export]
pub fn tracker_state() -> SessionState {
    with_tracker(|t| t.session.state()).unwrap_or(SessionState::Idle)
}

#[uniffi::export]
pub fn tracker_is_tracking() -> bool {
    with_tracker(|t| t.session.is_tracking()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_last_fix_error() -> Option<FixError> {
    with_tracker(|t| t.session.last_fix_error()).flatten()
}

/// Buffered route simplified with `epsilon` (degrees).
#[uniffi::export]
pub fn tracker_simplified_route(epsilon: f64) -> Vec<LocationPoint> {
    with_tracker(|t| t.session.simplified(epsilon)).unwrap_or_default()
}

/// Bounding box of the buffered route, for fitting the map viewport.
#[uniffi::export]
pub fn tracker_route_bounds() -> Option<Bounds> {
    with_tracker(|t| compute_bounds(t.session.route_points())).flatten()
}

#[uniffi::export]
pub fn tracker_durability() -> Durability {
    with_tracker(|t| t.session.durability()).unwrap_or(Durability::Durable)
}

#[uniffi::export]
pub fn tracker_metrics() -> RouteMetrics {
    with_tracker(|t| t.session.metrics()).unwrap_or_default()
}

/// JSON body for the save-route request, or `None` if there is nothing to
/// save or the title is blank.
#[uniffi::export]
pub fn tracker_save_request_json(title: String, activity_type: Option<String>, pins: Vec<Pin>) -> Option<String> {
    with_tracker(|t| {
        t.session
            .save_request(&title, activity_type.as_deref(), pins)
            .and_then(|request| request.to_json())
    })
    .and_then(|result| match result {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("[RouteTrackerFfi] Cannot build save request: {}", e);
            None
        }
    })
}

/// Build the save-route request and hand it to `saver`. Returns the id the
/// host assigned, or `None` if there was nothing to save or the host refused.
///
/// The tracker lock is released before `saver` is called.
#[uniffi::export]
pub fn tracker_save_route(
    title: String,
    activity_type: Option<String>,
    pins: Vec<Pin>,
    is_favourite: bool,
    saver: Box<dyn RouteSaverCallback>,
) -> Option<String> {
    let request = with_tracker(|t| t.session.save_request(&title, activity_type.as_deref(), pins))?;
    let result = request.and_then(|request| {
        CallbackSaver(saver).save_route(&request.with_favourite(is_favourite))
    });

    match result {
        Ok(id) => {
            info!("[RouteTrackerFfi] Saved route '{}' as {}", title, id);
            Some(id)
        }
        Err(e) => {
            warn!("[RouteTrackerFfi] Route not saved: {}", e);
            None
        }
    }
}

// ============================================================================
// Connectivity
// ============================================================================

#[uniffi::export]
pub fn tracker_set_online(online: bool) {
    CONNECTIVITY.set_online(online);
}

#[uniffi::export]
pub fn tracker_is_online() -> bool {
    CONNECTIVITY.is_online()
}
