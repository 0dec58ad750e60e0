//! Synthetic routes for demos and tests.
//!
//! - [`circular_route`] lays out a walking loop around a center point
//! - [`ReplaySource`] plays a fixed route back as a live position stream,
//!   one fix per interval, resuming where it left off after a pause

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;

use crate::config::WatchOptions;
use crate::source::{EventSender, PositionEvent, PositionSource, WatchHandle};
use crate::{now_millis, LocationPoint, Result, TrackerError};

/// WGS84 equatorial radius, used for laying out synthetic loops.
const WGS84_RADIUS_M: f64 = 6_378_137.0;

/// Generate `total_points` evenly spaced points on a circle of
/// `radius_meters` around `(center_lat, center_lng)`.
///
/// Points are untimed; a [`ReplaySource`] stamps them as it plays them.
pub fn circular_route(center_lat: f64, center_lng: f64, radius_meters: f64, total_points: usize) -> Vec<LocationPoint> {
    (0..total_points)
        .map(|i| {
            let angle = (i as f64 / total_points as f64) * 2.0 * std::f64::consts::PI;
            let dx = radius_meters * angle.cos();
            let dy = radius_meters * angle.sin();

            let lat = center_lat + (dy / WGS84_RADIUS_M).to_degrees();
            let lng = center_lng + (dx / WGS84_RADIUS_M).to_degrees() / center_lat.to_radians().cos();
            LocationPoint::new(lat, lng, None)
        })
        .collect()
}

/// How a [`ReplaySource`] stamps the fixes it emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayClock {
    /// Current wall-clock time at emission
    WallClock,
    /// `start_ms + index * interval`, independent of real time
    Synthetic { start_ms: i64 },
}

/// Position source that replays a fixed route on a timer.
///
/// Requires a tokio runtime: `watch` spawns the emitting task on the
/// current one. When the route is exhausted the task ends and drops its
/// sender, which the session sees as the source closing.
pub struct ReplaySource {
    route: Arc<Vec<LocationPoint>>,
    interval: Duration,
    clock: ReplayClock,
    next_index: Arc<AtomicUsize>,
    tasks: HashMap<WatchHandle, JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(route: Vec<LocationPoint>, interval: Duration) -> Self {
        Self {
            route: Arc::new(route),
            interval,
            clock: ReplayClock::WallClock,
            next_index: Arc::new(AtomicUsize::new(0)),
            tasks: HashMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: ReplayClock) -> Self {
        self.clock = clock;
        self
    }

    /// Index of the next point to be played.
    pub fn position(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }

    /// Rewind to the start of the route.
    pub fn reset(&mut self) {
        self.next_index.store(0, Ordering::SeqCst);
    }
}

impl PositionSource for ReplaySource {
    fn is_supported(&self) -> bool {
        !self.route.is_empty()
    }

    fn watch(&mut self, sink: EventSender, _options: &WatchOptions) -> Result<WatchHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TrackerError::Config {
            message: "replay source needs a tokio runtime".to_string(),
        })?;

        let handle = WatchHandle::next();
        let route = Arc::clone(&self.route);
        let next_index = Arc::clone(&self.next_index);
        let interval = self.interval;
        let clock = self.clock;

        let task = runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let index = next_index.load(Ordering::SeqCst);
                let Some(point) = route.get(index) else { break };

                let timestamp = match clock {
                    ReplayClock::WallClock => now_millis(),
                    ReplayClock::Synthetic { start_ms } => start_ms + index as i64 * interval.as_millis() as i64,
                };
                let event = PositionEvent::from_reading(point.lat, point.lng, timestamp);
                if sink.send(event).is_err() {
                    break;
                }
                next_index.store(index + 1, Ordering::SeqCst);
            }
            debug!("[ReplaySource] Replay task finished at point {}", next_index.load(Ordering::SeqCst));
        });

        self.tasks.insert(handle, task);
        debug!("[ReplaySource] Armed watch {} at point {}", handle.id(), self.position());
        Ok(handle)
    }

    fn unwatch(&mut self, handle: WatchHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
            debug!("[ReplaySource] Disarmed watch {}", handle.id());
        }
    }
}
