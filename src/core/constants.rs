//! Thresholds and defaults shared across the wayfinding core

use std::f64::consts::PI;

/// Sightings below this confidence are ignored by the solver
pub const MIN_SIGHTING_CONFIDENCE: f64 = 0.6;

/// Cross-product magnitude below which two sighting rays count as parallel
pub const PARALLEL_EPSILON: f64 = 0.001;

/// Mean bearing error at which multilateration confidence reaches zero (30 degrees)
pub const ZERO_CONFIDENCE_ANGLE: f64 = PI / 6.0;

/// Calibration beacon cap and minimum measurement count
pub const MAX_CALIBRATION_BEACONS: usize = 5;
pub const MIN_CALIBRATION_MEASUREMENTS: usize = 3;

/// Alignment score a measurement must exceed before it can be confirmed
pub const CALIBRATION_ALIGNMENT_THRESHOLD: f64 = 0.7;

/// Failsafe for tracking quality that never stabilizes (milliseconds)
pub const TRACKING_READY_TIMEOUT_MS: u64 = 8000;

/// Navigation tick period (milliseconds)
pub const NAVIGATION_TICK_MS: u64 = 100;

/// Waypoint arrival radius (meters) and debounce window (milliseconds)
pub const ARRIVAL_THRESHOLD_M: f64 = 0.5;
pub const ARRIVAL_COOLDOWN_MS: u64 = 700;

/// Distance band that triggers the one-shot approach announcement (meters)
pub const APPROACH_MIN_M: f64 = 1.0;
pub const APPROACH_MAX_M: f64 = 2.5;

/// Average walking step used to turn meters into step counts
pub const STEP_LENGTH_M: f64 = 0.70;

/// Doorway announcement radius (meters)
pub const DOORWAY_ANNOUNCE_M: f64 = 1.8;

/// Policy thresholds for the coordinate transform helpers (meters)
pub const HAS_ARRIVED_THRESHOLD_M: f64 = 1.5;
pub const RECALCULATION_THRESHOLD_M: f64 = 2.0;
