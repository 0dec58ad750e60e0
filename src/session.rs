//! # Tracking Session
//!
//! State machine that turns a position stream into a durable route.
//!
//! ```text
//!            start()                 stop()
//!   Idle ───────────────► Tracking ─────────► Stopped
//!    ▲                      ▲  │                 │
//!    │                      │  └── on_fix ──┐    │ start()
//!    │                      └───────────────┘◄───┘
//!    └──────────── clear_route() (from any state)
//! ```
//!
//! On construction the session restores from its store. A snapshot written
//! while tracking re-arms the source immediately, so capture resumes after a
//! crash or restart without a fresh `start()` and without losing the points
//! already buffered.
//!
//! The session itself is single-owner (`&mut self` everywhere). Fixes are
//! queued by the source into a channel and applied only when the owner
//! drains it with [`TrackingSession::process_pending`] or
//! [`TrackingSession::recv_event`], so a fix is always fully appended and
//! persisted before the next one is looked at.

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::buffer::{Durability, DurableRouteBuffer};
use crate::config::TrackerConfig;
use crate::metrics::{derive_metrics_with_speed, RouteMetrics};
use crate::payload::{Pin, SaveRouteRequest};
use crate::source::{EventReceiver, PositionEvent, PositionSource, WatchHandle};
use crate::store::KeyValueStore;
use crate::{simplify, FixError, LocationPoint, Result, TrackerError};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum SessionState {
    /// Nothing captured, not tracking
    Idle,
    /// Source armed, fixes are being appended
    Tracking,
    /// Not tracking, but a captured route is still buffered
    Stopped,
}

struct ActiveWatch {
    handle: WatchHandle,
    events: EventReceiver,
}

/// Coordinates a [`PositionSource`] and a [`DurableRouteBuffer`].
pub struct TrackingSession<S: KeyValueStore, P: PositionSource> {
    buffer: DurableRouteBuffer<S>,
    source: P,
    config: TrackerConfig,
    watch: Option<ActiveWatch>,
    state: SessionState,
    current_location: Option<LocationPoint>,
    last_fix_error: Option<FixError>,
}

impl<S: KeyValueStore, P: PositionSource> TrackingSession<S, P> {
    /// Restore a session from `store`, re-arming `source` if the snapshot
    /// says tracking was active.
    ///
    /// An invalid `config` is replaced by [`TrackerConfig::default`].
    pub fn new(store: S, source: P, config: TrackerConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("[TrackingSession] Invalid configuration, using defaults: {}", e);
                TrackerConfig::default()
            }
        };
        let buffer = DurableRouteBuffer::restore(store, &config);
        let resume = buffer.is_tracking();
        let state = if buffer.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Stopped
        };

        let mut session = Self {
            current_location: buffer.last().copied(),
            buffer,
            source,
            config,
            watch: None,
            state,
            last_fix_error: None,
        };

        if resume {
            match session.arm() {
                Ok(()) => {
                    session.state = SessionState::Tracking;
                    info!(
                        "[TrackingSession] Resumed tracking with {} buffered points",
                        session.buffer.len()
                    );
                }
                Err(e) => {
                    warn!("[TrackingSession] Could not resume tracking: {}", e);
                    session.buffer.set_tracking(false);
                }
            }
        }

        session
    }

    /// Create a session with the default configuration.
    pub fn with_defaults(store: S, source: P) -> Self {
        Self::new(store, source, TrackerConfig::default())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Start capturing. No-op if already tracking.
    ///
    /// Existing buffered points are kept: a stopped route continues where it
    /// left off.
    pub fn start(&mut self) -> Result<()> {
        if self.state == SessionState::Tracking {
            return Ok(());
        }
        if !self.source.is_supported() {
            warn!("[TrackingSession] Geolocation is not supported on this platform");
            return Err(TrackerError::UnsupportedPlatform);
        }

        self.arm()?;
        self.buffer.set_tracking(true);
        self.state = SessionState::Tracking;
        info!(
            "[TrackingSession] Started tracking ({} points already buffered)",
            self.buffer.len()
        );
        Ok(())
    }

    /// Stop capturing, keeping the buffered route. Idempotent.
    ///
    /// Fixes the source delivered before the call are applied first; none are
    /// applied after it returns.
    pub fn stop(&mut self) {
        if self.state != SessionState::Tracking {
            return;
        }

        if let Some(mut watch) = self.watch.take() {
            self.source.unwatch(watch.handle);
            watch.events.close();
            while let Ok(event) = watch.events.try_recv() {
                self.apply(event);
            }
        }

        self.buffer.set_tracking(false);
        self.state = SessionState::Stopped;
        info!(
            "[TrackingSession] Stopped tracking with {} points",
            self.buffer.len()
        );
    }

    /// Discard the route and its persisted snapshot, from any state.
    pub fn clear_route(&mut self) {
        if let Some(watch) = self.watch.take() {
            self.source.unwatch(watch.handle);
        }

        if let Err(e) = self.buffer.clear() {
            warn!("[TrackingSession] Failed to remove persisted route: {}", e);
        }
        self.current_location = None;
        self.last_fix_error = None;
        self.state = SessionState::Idle;
        info!("[TrackingSession] Route cleared");
    }

    /// Apply one event from the source.
    pub fn handle_event(&mut self, event: PositionEvent) {
        if self.state != SessionState::Tracking {
            debug!("[TrackingSession] Ignoring event while not tracking");
            return;
        }
        self.apply(event);
    }

    /// Apply every event already queued by the source. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let event = match self.watch.as_mut() {
                Some(watch) => watch.events.try_recv().ok(),
                None => None,
            };
            let Some(event) = event else { break };
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event from the armed source.
    ///
    /// Returns `None` immediately when not armed, or once the source has
    /// dropped its end of the channel.
    pub async fn recv_event(&mut self) -> Option<PositionEvent> {
        match self.watch.as_mut() {
            Some(watch) => watch.events.recv().await,
            None => None,
        }
    }

    /// Handle the source closing its stream (e.g. a replayed route ran out).
    pub fn on_source_closed(&mut self) {
        if self.state == SessionState::Tracking {
            info!("[TrackingSession] Position source ended");
            self.stop();
        }
    }

    // ========================================================================
    // Observables
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == SessionState::Tracking
    }

    /// Whether a watch is currently armed on the source.
    pub fn is_armed(&self) -> bool {
        self.watch.is_some()
    }

    pub fn route_points(&self) -> &[LocationPoint] {
        self.buffer.points()
    }

    /// Most recent fix (after a restart, the last buffered point).
    pub fn current_location(&self) -> Option<LocationPoint> {
        self.current_location
    }

    /// Most recent fix error, cleared by the next successful fix.
    pub fn last_fix_error(&self) -> Option<FixError> {
        self.last_fix_error
    }

    pub fn durability(&self) -> Durability {
        self.buffer.durability()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    // ========================================================================
    // Derived data
    // ========================================================================

    /// Distance and duration of the buffered route.
    pub fn metrics(&self) -> RouteMetrics {
        derive_metrics_with_speed(self.buffer.points(), self.config.fallback_speed_mps)
    }

    /// Simplified copy of the buffered route.
    pub fn simplified(&self, epsilon: f64) -> Vec<LocationPoint> {
        simplify(self.buffer.points(), epsilon)
    }

    /// Build the payload for the save-route collaborator from the buffered
    /// route, simplified with the configured tolerance.
    pub fn save_request(&self, title: &str, activity_type: Option<&str>, pins: Vec<Pin>) -> Result<SaveRouteRequest> {
        SaveRouteRequest::build(
            title,
            self.buffer.points(),
            activity_type,
            pins,
            Some(self.config.simplify_epsilon),
        )
    }

    /// Give up the session without stopping it, returning the store as a
    /// crashed process would leave it.
    pub fn into_store(self) -> S {
        self.buffer.into_store()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn arm(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.source.watch(tx, &self.config.watch)?;
        self.watch = Some(ActiveWatch { handle, events: rx });
        Ok(())
    }

    fn apply(&mut self, event: PositionEvent) {
        match event {
            PositionEvent::Fix(point) => {
                self.buffer.append(point);
                self.current_location = Some(point);
                self.last_fix_error = None;
            }
            PositionEvent::Error(error) => {
                warn!("[TrackingSession] Unable to retrieve location: {}", error);
                self.last_fix_error = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChannelSource, UnsupportedSource};
    use crate::store::MemoryStore;

    fn session() -> (TrackingSession<MemoryStore, ChannelSource>, crate::FixInjector) {
        let source = ChannelSource::new();
        let injector = source.injector();
        (TrackingSession::with_defaults(MemoryStore::new(), source), injector)
    }

    #[test]
    fn test_starts_idle() {
        let (session, _) = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_tracking());
        assert!(session.current_location().is_none());
    }

    #[test]
    fn test_start_arms_and_persists_flag() {
        let (mut session, injector) = session();
        session.start().unwrap();
        assert!(session.is_tracking());
        assert!(session.is_armed());
        assert_eq!(session.source().last_options(), Some(session.config().watch));

        assert!(injector.push_fix(1.0, 2.0, 1000));
        assert_eq!(session.process_pending(), 1);
        assert_eq!(session.route_points().len(), 1);
        assert_eq!(session.current_location(), Some(LocationPoint::new(1.0, 2.0, Some(1000))));

        let store = session.into_store();
        assert_eq!(store.get("route_tracker.is_tracking").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_start_twice_is_noop() {
        let (mut session, injector) = session();
        session.start().unwrap();
        injector.push_fix(1.0, 1.0, 0);
        session.start().unwrap();
        // The original watch is still armed, so its queued fix is not lost
        assert_eq!(session.process_pending(), 1);
    }

    #[test]
    fn test_unsupported_platform() {
        let mut session = TrackingSession::with_defaults(MemoryStore::new(), UnsupportedSource);
        assert_eq!(session.start(), Err(TrackerError::UnsupportedPlatform));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_fix_error_keeps_tracking() {
        let (mut session, injector) = session();
        session.start().unwrap();

        injector.push_error(FixError::PermissionDenied);
        session.process_pending();
        assert!(session.is_tracking());
        assert_eq!(session.last_fix_error(), Some(FixError::PermissionDenied));

        injector.push_fix(1.0, 1.0, 5);
        session.process_pending();
        assert_eq!(session.last_fix_error(), None);
        assert_eq!(session.route_points().len(), 1);
    }

    #[test]
    fn test_stop_applies_queued_fixes_then_disarms() {
        let (mut session, injector) = session();
        session.start().unwrap();
        injector.push_fix(1.0, 1.0, 1);
        injector.push_fix(1.0, 1.1, 2);

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.route_points().len(), 2);
        assert!(!session.is_armed());

        // Nothing reaches the session after stop
        assert!(!injector.push_fix(1.0, 1.2, 3));
        assert_eq!(session.process_pending(), 0);
        assert_eq!(session.route_points().len(), 2);

        // Idempotent
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_restart_continues_route() {
        let (mut session, injector) = session();
        session.start().unwrap();
        injector.push_fix(1.0, 1.0, 1);
        session.stop();
        session.start().unwrap();
        injector.push_fix(1.0, 1.1, 2);
        session.process_pending();
        assert_eq!(session.route_points().len(), 2);
    }

    #[test]
    fn test_clear_from_tracking() {
        let (mut session, injector) = session();
        session.start().unwrap();
        injector.push_fix(1.0, 1.0, 1);
        session.process_pending();

        session.clear_route();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.route_points().is_empty());
        assert!(session.current_location().is_none());
        assert!(!injector.push_fix(1.0, 1.0, 2));

        let store = session.into_store();
        assert!(store.is_empty());
    }

    #[test]
    fn test_crash_resume() {
        let source = ChannelSource::new();
        let injector = source.injector();
        let mut session = TrackingSession::with_defaults(MemoryStore::new(), source);
        session.start().unwrap();
        for i in 0..4 {
            injector.push_fix(1.0, 1.0 + i as f64 * 0.001, i);
        }
        session.process_pending();
        let store = session.into_store();

        // New process, new platform source
        let source = ChannelSource::new();
        let injector = source.injector();
        let mut resumed = TrackingSession::with_defaults(store, source);
        assert_eq!(resumed.state(), SessionState::Tracking);
        assert!(resumed.is_armed());
        assert_eq!(resumed.route_points().len(), 4);
        assert_eq!(resumed.current_location(), resumed.route_points().last().copied());

        injector.push_fix(1.0, 1.004, 4);
        resumed.process_pending();
        assert_eq!(resumed.route_points().len(), 5);
    }

    #[test]
    fn test_resume_on_unsupported_platform_clears_flag() {
        let mut store = MemoryStore::new();
        store.set("route_tracker.is_tracking", "true").unwrap();
        store.set("route_tracker.route_points", r#"[{"lat":1.0,"lng":1.0,"timestamp":0}]"#).unwrap();

        let session = TrackingSession::with_defaults(store, UnsupportedSource);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.route_points().len(), 1);
        let store = session.into_store();
        assert_eq!(store.get("route_tracker.is_tracking").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn test_stop_on_full_store_does_not_resume() {
        let (mut session, injector) = session();
        session.start().unwrap();
        for i in 0..5 {
            injector.push_fix(1.0, 1.0 + i as f64 * 0.001, i * 1_000);
        }
        session.process_pending();

        let mut store = session.into_store();
        let used = store.used_bytes();
        store.set_quota(Some(used));

        let mut resumed = TrackingSession::with_defaults(store, ChannelSource::new());
        assert_eq!(resumed.state(), SessionState::Tracking);
        resumed.stop();

        let store = resumed.into_store();
        assert_eq!(store.get("route_tracker.is_tracking").unwrap().as_deref(), Some("false"));

        let restarted = TrackingSession::with_defaults(store, ChannelSource::new());
        assert_eq!(restarted.state(), SessionState::Stopped);
        assert!(!restarted.is_armed());
        assert_eq!(restarted.route_points().len(), 4);
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let config = TrackerConfig {
            trim_fraction: f64::NAN,
            fallback_speed_mps: 0.0,
            ..TrackerConfig::default()
        };
        let session = TrackingSession::new(MemoryStore::new(), ChannelSource::new(), config);
        assert_eq!(session.config(), &TrackerConfig::default());
    }

    #[test]
    fn test_source_closed_stops() {
        let (mut session, _injector) = session();
        session.start().unwrap();
        session.on_source_closed();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_metrics_and_save_request() {
        let (mut session, injector) = session();
        session.start().unwrap();
        injector.push_fix(28.6139, 77.2090, 0);
        injector.push_fix(28.6150, 77.2100, 60_000);
        session.stop();

        let metrics = session.metrics();
        assert_eq!(metrics.duration_seconds, 60);
        assert!(metrics.distance_meters > 0.0);

        let request = session.save_request("Morning walk", None, vec![]).unwrap();
        assert_eq!(request.route_points.len(), 2);
        assert_eq!(request.activity_type, "walking");
    }
}
