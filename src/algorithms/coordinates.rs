//! Floorplan <-> tracking frame conversion
//!
//! The conversion is a rigid 2D transform, the [`RigidAlignment`] of the
//! active [`CalibrationData`]:
//! - map -> tracking: subtract the calibrated user position, rotate by the
//!   calibrated heading
//! - tracking -> map: the exact inverse
//!
//! Rotations act in the heading sense (clockwise), so a direction with map
//! bearing `b` has tracking bearing `b + heading_map_to_tracking`, the same
//! relation the heading conversions use. Vertical coordinates pass through.

use crate::algorithms::geometry::{bearing, normalize_angle, rotate_compass};
use crate::core::{CalibrationData, RigidAlignment};
use crate::utils::config::TransformConfig;
use nalgebra::{Vector2, Vector3};
use std::sync::Arc;

/// Per-session holder of the single active calibration
///
/// Written by the calibration procedure before navigation starts, shared
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct CalibrationContext {
    active: Option<Arc<CalibrationData>>,
}

impl CalibrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calibration(data: CalibrationData) -> Self {
        Self {
            active: Some(Arc::new(data)),
        }
    }

    /// Replace the active calibration
    pub fn install(&mut self, data: CalibrationData) {
        self.active = Some(Arc::new(data));
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&Arc<CalibrationData>> {
        self.active.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.active.is_some()
    }

    /// Transform bound to the active calibration, if there is one
    pub fn transform(&self, config: TransformConfig) -> Option<CoordinateTransform> {
        self.active
            .as_ref()
            .map(|data| CoordinateTransform::from_calibration(data, config))
    }
}

/// Map/tracking conversion for one calibration
#[derive(Debug, Clone)]
pub struct CoordinateTransform {
    alignment: RigidAlignment,
    config: TransformConfig,
}

impl CoordinateTransform {
    pub fn new(alignment: RigidAlignment, config: TransformConfig) -> Self {
        Self { alignment, config }
    }

    pub fn from_calibration(calibration: &CalibrationData, config: TransformConfig) -> Self {
        Self::new(calibration.alignment(), config)
    }

    /// Frames that coincide
    #[cfg(test)]
    pub(crate) fn identity() -> Self {
        Self::new(RigidAlignment::new(Vector2::zeros(), 0.0), TransformConfig::default())
    }

    pub fn alignment(&self) -> &RigidAlignment {
        &self.alignment
    }

    fn heading(&self) -> f64 {
        self.alignment.heading_map_to_tracking
    }

    pub fn map_to_tracking(&self, p: &Vector2<f64>) -> Vector2<f64> {
        rotate_compass(&(p - self.alignment.user_position_map), self.heading())
    }

    pub fn tracking_to_map(&self, p: &Vector2<f64>) -> Vector2<f64> {
        rotate_compass(p, -self.heading()) + self.alignment.user_position_map
    }

    /// Map point into the tracking frame, keeping the vertical coordinate
    pub fn map_to_tracking_3d(&self, p: &Vector3<f64>) -> Vector3<f64> {
        let flat = self.map_to_tracking(&Vector2::new(p.x, p.y));
        Vector3::new(flat.x, flat.y, p.z)
    }

    pub fn tracking_to_map_3d(&self, p: &Vector3<f64>) -> Vector3<f64> {
        let flat = self.tracking_to_map(&Vector2::new(p.x, p.y));
        Vector3::new(flat.x, flat.y, p.z)
    }

    /// Directions rotate like points but without the translation
    pub fn map_direction_to_tracking(&self, d: &Vector2<f64>) -> Vector2<f64> {
        rotate_compass(d, self.heading())
    }

    pub fn tracking_direction_to_map(&self, d: &Vector2<f64>) -> Vector2<f64> {
        rotate_compass(d, -self.heading())
    }

    pub fn map_heading_to_tracking(&self, heading: f64) -> f64 {
        normalize_angle(heading + self.heading())
    }

    pub fn tracking_heading_to_map(&self, heading: f64) -> f64 {
        normalize_angle(heading - self.heading())
    }

    pub fn bearing(&self, from: &Vector2<f64>, to: &Vector2<f64>) -> f64 {
        bearing(from, to)
    }

    /// Turn needed to face `to`: positive means turn right, negative turn left
    pub fn relative_bearing(&self, from: &Vector2<f64>, to: &Vector2<f64>, current_heading: f64) -> f64 {
        normalize_angle(bearing(from, to) - current_heading)
    }

    pub fn has_arrived(&self, position: &Vector2<f64>, destination: &Vector2<f64>) -> bool {
        self.has_arrived_within(position, destination, self.config.arrival_threshold_m)
    }

    pub fn has_arrived_within(&self, position: &Vector2<f64>, destination: &Vector2<f64>, threshold: f64) -> bool {
        (destination - position).norm() <= threshold
    }

    pub fn should_recalculate(&self, position: &Vector2<f64>, expected: &Vector2<f64>) -> bool {
        self.should_recalculate_beyond(position, expected, self.config.recalculation_threshold_m)
    }

    pub fn should_recalculate_beyond(&self, position: &Vector2<f64>, expected: &Vector2<f64>, threshold: f64) -> bool {
        (expected - position).norm() > threshold
    }

    pub fn is_aligned(&self, current_heading: f64, target_heading: f64) -> bool {
        self.is_aligned_within(current_heading, target_heading, self.config.alignment_tolerance_rad)
    }

    pub fn is_aligned_within(&self, current_heading: f64, target_heading: f64, tolerance: f64) -> bool {
        normalize_angle(target_heading - current_heading).abs() <= tolerance
    }
}
