//! Tracker configuration.

use serde::{Deserialize, Serialize};

use crate::{Result, TrackerError};

/// Options passed to the platform position watch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WatchOptions {
    /// Ask the platform for its most precise fix source.
    /// Default: true
    pub enable_high_accuracy: bool,

    /// Maximum age of a cached fix the platform may hand back.
    /// Default: 0 (always a fresh fix)
    pub maximum_age_ms: u32,

    /// Time the platform may spend on a single fix before reporting a timeout.
    /// Default: 10000 ms
    pub timeout_ms: u32,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: 10_000,
        }
    }
}

/// Configuration for the tracking session and derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Store key holding the JSON array of captured points.
    /// Default: "route_tracker.route_points"
    pub points_key: String,

    /// Store key holding the JSON tracking-active flag.
    /// Default: "route_tracker.is_tracking"
    pub tracking_key: String,

    /// Options for the platform position watch.
    pub watch: WatchOptions,

    /// Fraction of the oldest points dropped when the store reports its quota
    /// is exhausted. Default: 0.2
    pub trim_fraction: f64,

    /// Simplification tolerance (in degrees) used when building save-route payloads.
    /// Default: 0.0001 (~11 meters)
    pub simplify_epsilon: f64,

    /// Average speed assumed when a route has no usable timestamps.
    /// Default: 1.4 m/s (walking)
    pub fallback_speed_mps: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            points_key: "route_tracker.route_points".to_string(),
            tracking_key: "route_tracker.is_tracking".to_string(),
            watch: WatchOptions::default(),
            trim_fraction: 0.2,
            simplify_epsilon: 0.0001,
            fallback_speed_mps: 1.4,
        }
    }
}

impl TrackerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.points_key.is_empty() || self.tracking_key.is_empty() {
            return Err(TrackerError::Config {
                message: "store keys must not be empty".to_string(),
            });
        }
        if self.points_key == self.tracking_key {
            return Err(TrackerError::Config {
                message: "points and tracking keys must differ".to_string(),
            });
        }
        if !(self.trim_fraction > 0.0 && self.trim_fraction <= 1.0) {
            return Err(TrackerError::Config {
                message: format!("trim fraction {} outside (0, 1]", self.trim_fraction),
            });
        }
        if !(self.fallback_speed_mps.is_finite() && self.fallback_speed_mps > 0.0) {
            return Err(TrackerError::Config {
                message: "fallback speed must be positive".to_string(),
            });
        }
        Ok(())
    }
}
