//! # Durable Route Buffer
//!
//! Append-only sequence of captured points plus the tracking-active flag,
//! mirrored to a [`KeyValueStore`] under two independent keys:
//!
//! | Key (default) | Value |
//! |---------------|-------|
//! | `route_tracker.route_points` | JSON array of [`LocationPoint`] |
//! | `route_tracker.is_tracking` | JSON boolean |
//!
//! Every append rewrites the point array before returning, so a crash loses
//! at most the fix being appended.
//!
//! ## Quota Pressure
//!
//! When the store reports its quota is exhausted, the oldest
//! `trim_fraction` of the buffer (rounded up) is dropped and the write is
//! retried once. If that also fails the buffer becomes
//! [`Durability::Degraded`]: it keeps growing in memory and each later append
//! retries a plain write, without trimming again, until one succeeds.

use log::{debug, error, info, warn};

use crate::config::TrackerConfig;
use crate::store::KeyValueStore;
use crate::{LocationPoint, Result, TrackerError};

/// Whether the in-memory buffer currently matches what is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Durability {
    Durable,
    Degraded,
}

/// Route buffer mirrored to a key/value store.
pub struct DurableRouteBuffer<S: KeyValueStore> {
    store: S,
    points_key: String,
    tracking_key: String,
    trim_fraction: f64,
    points: Vec<LocationPoint>,
    is_tracking: bool,
    durability: Durability,
}

impl<S: KeyValueStore> DurableRouteBuffer<S> {
    /// Restore the buffer from `store`.
    ///
    /// A missing or unparseable value restores as empty (points) or `false`
    /// (flag); restoring never fails.
    pub fn restore(store: S, config: &TrackerConfig) -> Self {
        let points = read_json::<Vec<LocationPoint>>(&store, &config.points_key).unwrap_or_default();
        let is_tracking = read_json::<bool>(&store, &config.tracking_key).unwrap_or(false);

        if !points.is_empty() || is_tracking {
            info!(
                "[RouteBuffer] Restored {} points (tracking: {})",
                points.len(),
                is_tracking
            );
        }

        Self {
            store,
            points_key: config.points_key.clone(),
            tracking_key: config.tracking_key.clone(),
            trim_fraction: config.trim_fraction,
            points,
            is_tracking,
            durability: Durability::Durable,
        }
    }

    /// Append a point and persist the buffer.
    ///
    /// Returns the durability after the write. Storage failures never
    /// propagate; they are absorbed by the quota policy described in the
    /// module docs.
    pub fn append(&mut self, point: LocationPoint) -> Durability {
        self.points.push(point);

        match self.write_points() {
            Ok(()) => self.mark_durable(),
            Err(TrackerError::QuotaExceeded) if self.durability == Durability::Durable => {
                let dropped = self.trim_oldest();
                warn!(
                    "[RouteBuffer] Storage quota exceeded, dropped {} oldest points and retrying",
                    dropped
                );
                match self.write_points() {
                    Ok(()) => self.mark_durable(),
                    Err(e) => self.mark_degraded(&e),
                }
            }
            Err(e) => self.mark_degraded(&e),
        }

        debug!(
            "[RouteBuffer] Appended fix ({:.6}, {:.6}), {} points buffered",
            point.lat,
            point.lng,
            self.points.len()
        );
        self.durability
    }

    /// Set and persist the tracking-active flag.
    ///
    /// On a quota failure the oldest `trim_fraction` of points is shed, the
    /// point array rewritten and the flag retried once. A `false` flag that
    /// still cannot be written is removed instead, which restores as `false`.
    pub fn set_tracking(&mut self, is_tracking: bool) {
        self.is_tracking = is_tracking;

        let err = match self.write_flag() {
            Ok(()) => return,
            Err(TrackerError::QuotaExceeded) if !self.points.is_empty() => {
                let dropped = self.trim_oldest();
                warn!(
                    "[RouteBuffer] Storage quota exceeded writing tracking flag, dropped {} oldest points",
                    dropped
                );
                match self.write_points() {
                    Ok(()) => self.mark_durable(),
                    Err(e) => self.mark_degraded(&e),
                }
                match self.write_flag() {
                    Ok(()) => return,
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        if !is_tracking {
            if let Err(e) = self.store.remove(&self.tracking_key) {
                error!("[RouteBuffer] Failed to clear tracking flag: {}", e);
            }
            warn!("[RouteBuffer] Tracking flag removed after failed write: {}", err);
            return;
        }
        error!("[RouteBuffer] Failed to persist tracking flag: {}", err);
    }

    /// Wipe the buffer and both persisted keys.
    pub fn clear(&mut self) -> Result<()> {
        self.points.clear();
        self.is_tracking = false;
        self.durability = Durability::Durable;

        let points_result = self.store.remove(&self.points_key);
        let tracking_result = self.store.remove(&self.tracking_key);
        points_result.and(tracking_result)
    }

    pub fn points(&self) -> &[LocationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&LocationPoint> {
        self.points.last()
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutably borrow the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the buffer, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn write_points(&mut self) -> Result<()> {
        write_json(&mut self.store, &self.points_key, &self.points)
    }

    fn write_flag(&mut self) -> Result<()> {
        write_json(&mut self.store, &self.tracking_key, &self.is_tracking)
    }

    /// Drop the oldest `trim_fraction` of points, rounded up. Returns how many were dropped.
    fn trim_oldest(&mut self) -> usize {
        let count = ((self.points.len() as f64) * self.trim_fraction).ceil() as usize;
        let count = count.min(self.points.len());
        self.points.drain(..count);
        count
    }

    fn mark_durable(&mut self) {
        if self.durability == Durability::Degraded {
            info!(
                "[RouteBuffer] Storage recovered, {} points durable again",
                self.points.len()
            );
        }
        self.durability = Durability::Durable;
    }

    fn mark_degraded(&mut self, err: &TrackerError) {
        if self.durability == Durability::Durable {
            error!(
                "[RouteBuffer] Route no longer durable ({} points in memory): {}",
                self.points.len(),
                err
            );
        }
        self.durability = Durability::Degraded;
    }
}

fn read_json<T: serde::de::DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            error!("[RouteBuffer] Failed to read '{}': {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = TrackerError::MalformedSnapshot {
                key: key.to_string(),
                message: e.to_string(),
            };
            warn!("[RouteBuffer] Ignoring {}", err);
            None
        }
    }
}

fn write_json<T: serde::Serialize + ?Sized>(store: &mut impl KeyValueStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).map_err(|e| TrackerError::Storage {
        message: e.to_string(),
    })?;
    store.set(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn point(i: i64) -> LocationPoint {
        LocationPoint::new(10.0 + i as f64, -0.5, Some(i * 1000))
    }

    fn config() -> TrackerConfig {
        TrackerConfig::default()
    }

    #[test]
    fn test_append_persists_every_point() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config());
        for i in 0..3 {
            assert_eq!(buffer.append(point(i)), Durability::Durable);
        }

        let raw = buffer.store().get("route_tracker.route_points").unwrap().unwrap();
        let persisted: Vec<LocationPoint> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted, buffer.points());
    }

    #[test]
    fn test_restore_roundtrip() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config());
        buffer.append(point(0));
        buffer.append(point(1));
        buffer.set_tracking(true);

        let restored = DurableRouteBuffer::restore(buffer.into_store(), &config());
        assert_eq!(restored.len(), 2);
        assert!(restored.is_tracking());
        assert_eq!(restored.last(), Some(&point(1)));
    }

    #[test]
    fn test_malformed_snapshot_restores_empty() {
        let mut store = MemoryStore::new();
        store.set("route_tracker.route_points", "{not json").unwrap();
        store.set("route_tracker.is_tracking", "\"yes\"").unwrap();

        let buffer = DurableRouteBuffer::restore(store, &config());
        assert!(buffer.is_empty());
        assert!(!buffer.is_tracking());
    }

    #[test]
    fn test_corrupt_points_keep_flag() {
        let mut store = MemoryStore::new();
        store.set("route_tracker.route_points", "[{\"lat\":").unwrap();
        store.set("route_tracker.is_tracking", "true").unwrap();

        let buffer = DurableRouteBuffer::restore(store, &config());
        assert!(buffer.is_empty());
        assert!(buffer.is_tracking());
    }

    #[test]
    fn test_clear_removes_keys() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config());
        buffer.append(point(0));
        buffer.set_tracking(true);
        buffer.clear().unwrap();

        assert!(buffer.is_empty());
        assert!(!buffer.is_tracking());
        assert!(buffer.store().is_empty());
    }

    #[test]
    fn test_quota_trims_oldest_and_retries() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config());
        for i in 0..10 {
            buffer.append(point(i));
        }

        // Allow exactly what the current array costs, so the next append overflows
        let used = buffer.store().used_bytes();
        buffer.store_mut().set_quota(Some(used));

        assert_eq!(buffer.append(point(10)), Durability::Durable);
        // 11 points, ceil(11 * 0.2) = 3 dropped
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.points()[0], point(3));
        assert_eq!(buffer.last(), Some(&point(10)));

        let raw = buffer.store().get("route_tracker.route_points").unwrap().unwrap();
        let persisted: Vec<LocationPoint> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.len(), 8);
    }

    #[test]
    fn test_degraded_keeps_growing_then_recovers() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::with_quota(0), &config());

        // Even an empty array cannot be written
        assert_eq!(buffer.append(point(0)), Durability::Degraded);
        // ceil(1 * 0.2) = 1 point was shed before the retry failed
        assert_eq!(buffer.len(), 0);

        for i in 1..=5 {
            assert_eq!(buffer.append(point(i)), Durability::Degraded);
        }
        // No further trimming while degraded
        assert_eq!(buffer.len(), 5);

        buffer.store_mut().set_quota(None);
        assert_eq!(buffer.append(point(6)), Durability::Durable);
        assert_eq!(buffer.len(), 6);

        let raw = buffer.store().get("route_tracker.route_points").unwrap().unwrap();
        let persisted: Vec<LocationPoint> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.len(), 6);
    }

    #[test]
    fn test_clearing_flag_under_quota_sheds_points() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config());
        buffer.set_tracking(true);
        for i in 0..5 {
            buffer.append(point(i));
        }

        // "false" is one byte longer than "true", so the flag alone no longer fits
        let used = buffer.store().used_bytes();
        buffer.store_mut().set_quota(Some(used));
        buffer.set_tracking(false);

        assert_eq!(buffer.store().get("route_tracker.is_tracking").unwrap().as_deref(), Some("false"));
        // ceil(5 * 0.2) = 1 point dropped
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.points()[0], point(1));
        assert_eq!(buffer.durability(), Durability::Durable);

        let restored = DurableRouteBuffer::restore(buffer.into_store(), &config());
        assert!(!restored.is_tracking());
        assert_eq!(restored.len(), 4);
    }

    #[test]
    fn test_unwritable_false_flag_is_removed() {
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config());
        buffer.set_tracking(true);
        buffer.store_mut().set_quota(Some(0));

        buffer.set_tracking(false);
        assert_eq!(buffer.store().get("route_tracker.is_tracking").unwrap(), None);

        let restored = DurableRouteBuffer::restore(buffer.into_store(), &config());
        assert!(!restored.is_tracking());
    }

    #[test]
    fn test_custom_keys() {
        let config = TrackerConfig {
            points_key: "p".to_string(),
            tracking_key: "t".to_string(),
            ..TrackerConfig::default()
        };
        let mut buffer = DurableRouteBuffer::restore(MemoryStore::new(), &config);
        buffer.append(point(0));
        buffer.set_tracking(true);
        assert!(buffer.store().get("p").unwrap().is_some());
        assert_eq!(buffer.store().get("t").unwrap().as_deref(), Some("true"));
    }
}
