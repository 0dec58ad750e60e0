//! # Position Sources
//!
//! A [`PositionSource`] wraps the platform's continuous position watch. The
//! session arms it with the sending half of a fresh channel and later
//! disarms it with the [`WatchHandle`] it got back; the source pushes
//! [`PositionEvent`]s into the channel from whatever thread or task the
//! platform calls back on.
//!
//! Sources provided here:
//! - [`ChannelSource`] - the host pushes fixes through a [`FixInjector`]
//!   (mobile callbacks, FFI, tests)
//! - [`UnsupportedSource`] - a platform without geolocation
//! - [`crate::synthetic::ReplaySource`] - replays a fixed route on a timer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::config::WatchOptions;
use crate::{FixError, LocationPoint, Result, TrackerError};

/// Opaque identifier of an armed watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    /// Allocate a process-unique handle.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        WatchHandle(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Something the platform reported for an armed watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionEvent {
    Fix(LocationPoint),
    Error(FixError),
}

impl PositionEvent {
    /// Normalize a raw platform reading into an event.
    ///
    /// Readings outside the valid coordinate range become
    /// [`FixError::PositionUnavailable`].
    pub fn from_reading(lat: f64, lng: f64, timestamp: i64) -> Self {
        let point = LocationPoint::new(lat, lng, Some(timestamp));
        if point.is_valid() {
            PositionEvent::Fix(point)
        } else {
            warn!("[PositionSource] Discarding invalid reading ({}, {})", lat, lng);
            PositionEvent::Error(FixError::PositionUnavailable)
        }
    }
}

/// Sending half handed to a source when it is armed.
pub type EventSender = mpsc::UnboundedSender<PositionEvent>;

/// Receiving half kept by the session.
pub type EventReceiver = mpsc::UnboundedReceiver<PositionEvent>;

/// The platform's continuous position watch.
pub trait PositionSource: Send {
    /// Whether this platform can produce fixes at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Start delivering events into `sink` until [`PositionSource::unwatch`]
    /// is called with the returned handle.
    fn watch(&mut self, sink: EventSender, options: &WatchOptions) -> Result<WatchHandle>;

    /// Stop the watch identified by `handle`. Unknown handles are ignored.
    fn unwatch(&mut self, handle: WatchHandle);
}

impl<P: PositionSource + ?Sized> PositionSource for Box<P> {
    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    fn watch(&mut self, sink: EventSender, options: &WatchOptions) -> Result<WatchHandle> {
        (**self).watch(sink, options)
    }

    fn unwatch(&mut self, handle: WatchHandle) {
        (**self).unwatch(handle)
    }
}

// ============================================================================
// Host-pushed source
// ============================================================================

type ArmedSink = Arc<Mutex<Option<(WatchHandle, EventSender)>>>;

/// Source fed by the host through a [`FixInjector`].
///
/// Readings pushed while no watch is armed are dropped.
#[derive(Debug, Default)]
pub struct ChannelSource {
    armed: ArmedSink,
    last_options: Option<WatchOptions>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an injector the host can push readings through.
    pub fn injector(&self) -> FixInjector {
        FixInjector {
            armed: Arc::clone(&self.armed),
        }
    }

    /// Options passed to the most recent watch.
    pub fn last_options(&self) -> Option<WatchOptions> {
        self.last_options
    }

    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl PositionSource for ChannelSource {
    fn watch(&mut self, sink: EventSender, options: &WatchOptions) -> Result<WatchHandle> {
        let handle = WatchHandle::next();
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = Some((handle, sink));
        self.last_options = Some(*options);
        debug!("[ChannelSource] Armed watch {}", handle.id());
        Ok(handle)
    }

    fn unwatch(&mut self, handle: WatchHandle) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*armed, Some((current, _)) if current == handle) {
            *armed = None;
            debug!("[ChannelSource] Disarmed watch {}", handle.id());
        }
    }
}

/// Host-side handle for pushing readings into a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct FixInjector {
    armed: ArmedSink,
}

impl FixInjector {
    /// Push a reading. Returns `false` if no watch is armed.
    pub fn push_fix(&self, lat: f64, lng: f64, timestamp: i64) -> bool {
        self.send(PositionEvent::from_reading(lat, lng, timestamp))
    }

    /// Push a reading stamped with the current time.
    pub fn push_fix_now(&self, lat: f64, lng: f64) -> bool {
        self.push_fix(lat, lng, crate::now_millis())
    }

    /// Report a failed fix. Returns `false` if no watch is armed.
    pub fn push_error(&self, error: FixError) -> bool {
        self.send(PositionEvent::Error(error))
    }

    fn send(&self, event: PositionEvent) -> bool {
        let armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        match armed.as_ref() {
            Some((_, sink)) => sink.send(event).is_ok(),
            None => false,
        }
    }
}

// ============================================================================
// Unsupported platform
// ============================================================================

/// Source for a platform without geolocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSource;

impl PositionSource for UnsupportedSource {
    fn is_supported(&self) -> bool {
        false
    }

    fn watch(&mut self, _sink: EventSender, _options: &WatchOptions) -> Result<WatchHandle> {
        Err(TrackerError::UnsupportedPlatform)
    }

    fn unwatch(&mut self, _handle: WatchHandle) {}
}
