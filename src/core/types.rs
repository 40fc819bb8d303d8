//! Core data types for the wayfinding system
//!
//! Map frame: x/y horizontal with +y as map north, z vertical.
//! Headings are compass style, measured clockwise from +y.

use crate::core::constants::MIN_CALIBRATION_MEASUREMENTS;
use crate::error::{Result, WayfindingError};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// One directional (and optionally ranged) observation of a beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconSighting {
    pub beacon_id: String,
    /// Beacon position in the map frame
    pub beacon_position: Vector3<f64>,
    /// Unit direction from the device towards the beacon, device frame
    /// (x right, y forward, z up)
    pub direction_local: Vector3<f64>,
    /// Measured range to the beacon, if the sensor reports one
    pub distance: Option<f64>,
    /// 0.0 to 1.0
    pub confidence: f64,
}

impl BeaconSighting {
    pub fn new(
        beacon_id: impl Into<String>,
        beacon_position: Vector3<f64>,
        direction_local: Vector3<f64>,
        confidence: f64,
    ) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            beacon_position,
            direction_local: direction_local.try_normalize(1e-12).unwrap_or(direction_local),
            distance: None,
            confidence,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// How a position estimate was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    Triangulation,
    Multilateration,
    KalmanFiltered,
}

/// 2D position estimate in the map frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub position: Vector2<f64>,
    pub confidence: f64,
    pub heading: f64,
    pub method: EstimationMethod,
    pub timestamp_ms: u64,
}

impl PositionEstimate {
    /// Reinsert a vertical coordinate (floor height or 0)
    pub fn position_3d(&self, floor_height: f64) -> Vector3<f64> {
        Vector3::new(self.position.x, self.position.y, floor_height)
    }
}

/// A beacon observed and confirmed during calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconMeasurement {
    pub beacon_id: String,
    pub map_position: Vector3<f64>,
    pub observed_direction_local: Vector3<f64>,
    pub distance: Option<f64>,
    pub confidence: f64,
    /// Device pose in the tracking frame when the measurement was confirmed
    pub device_position_tracking: Vector2<f64>,
    pub device_heading_tracking: f64,
}

/// Rigid alignment between the floorplan frame and the live tracking frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Map-frame position of the tracking origin (where the user stood)
    pub user_position_map: Vector2<f64>,
    /// Rotation from map headings to tracking headings (radians)
    pub heading_map_to_tracking: f64,
    pub measurements: Vec<BeaconMeasurement>,
    pub confidence: f64,
    /// Weighted RMS residual of the fit (meters)
    pub residual_error: f64,
    /// Set when tracking readiness was forced by the failsafe timeout
    pub degraded: bool,
}

impl CalibrationData {
    /// Build a calibration record from a fitted alignment.
    ///
    /// Fails with `CalibrationInsufficientMeasurements` when fewer than
    /// [`MIN_CALIBRATION_MEASUREMENTS`] measurements back the fit.
    pub fn new(
        alignment: RigidAlignment,
        measurements: Vec<BeaconMeasurement>,
        confidence: f64,
        residual_error: f64,
        degraded: bool,
    ) -> Result<Self> {
        if measurements.len() < MIN_CALIBRATION_MEASUREMENTS {
            return Err(WayfindingError::CalibrationInsufficientMeasurements {
                recorded: measurements.len(),
            });
        }
        Ok(Self {
            user_position_map: alignment.user_position_map,
            heading_map_to_tracking: alignment.heading_map_to_tracking,
            measurements,
            confidence,
            residual_error,
            degraded,
        })
    }

    pub fn alignment(&self) -> RigidAlignment {
        RigidAlignment::new(self.user_position_map, self.heading_map_to_tracking)
    }
}

/// Rotation and translation between the floorplan and tracking frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidAlignment {
    /// Map-frame position of the tracking origin
    pub user_position_map: Vector2<f64>,
    /// Rotation from map headings to tracking headings (radians)
    pub heading_map_to_tracking: f64,
}

impl RigidAlignment {
    pub fn new(user_position_map: Vector2<f64>, heading_map_to_tracking: f64) -> Self {
        Self {
            user_position_map,
            heading_map_to_tracking,
        }
    }
}

/// Beacon category, used to rank calibration candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeaconCategory {
    Destination,
    Landmark,
    Furniture,
    Other,
}

impl BeaconCategory {
    /// Lower is preferred
    pub fn calibration_priority(&self) -> u8 {
        match self {
            BeaconCategory::Destination | BeaconCategory::Landmark => 0,
            BeaconCategory::Furniture => 1,
            BeaconCategory::Other => 2,
        }
    }
}

/// A fixed, named landmark with a known map position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub id: String,
    pub name: String,
    pub position: Vector3<f64>,
    pub room_id: String,
    pub category: BeaconCategory,
    pub accessible: bool,
    pub obstacle: bool,
}

impl Beacon {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: Vector3<f64>,
        room_id: impl Into<String>,
        category: BeaconCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            room_id: room_id.into(),
            category,
            accessible: true,
            obstacle: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// Doorway joining two rooms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doorway {
    pub id: String,
    pub name: String,
    pub position: Vector3<f64>,
    pub room_a: String,
    pub room_b: String,
}

impl Doorway {
    /// The room on the other side, if `room_id` is one of the two sides
    pub fn other_side(&self, room_id: &str) -> Option<&str> {
        if self.room_a == room_id {
            Some(&self.room_b)
        } else if self.room_b == room_id {
            Some(&self.room_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaypointKind {
    Start,
    Intermediate,
    Doorway,
    Destination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationWaypoint {
    pub id: String,
    pub name: String,
    pub kind: WaypointKind,
    pub position: Vector3<f64>,
    pub room_id: Option<String>,
    pub doorway_id: Option<String>,
}

impl NavigationWaypoint {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: WaypointKind,
        position: Vector3<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            position,
            room_id: None,
            doorway_id: None,
        }
    }

    pub fn in_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn through_doorway(mut self, doorway_id: impl Into<String>) -> Self {
        self.doorway_id = Some(doorway_id.into());
        self
    }

    pub fn position_2d(&self) -> Vector2<f64> {
        self.position.xy()
    }
}

/// Ordered route returned by the path planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPath {
    waypoints: Vec<NavigationWaypoint>,
    total_distance: f64,
}

impl NavigationPath {
    /// Build a path; the total distance is the sum of consecutive horizontal legs
    pub fn new(waypoints: Vec<NavigationWaypoint>) -> Self {
        let total_distance = waypoints
            .windows(2)
            .map(|leg| (leg[1].position_2d() - leg[0].position_2d()).norm())
            .sum();
        Self {
            waypoints,
            total_distance,
        }
    }

    pub fn waypoints(&self) -> &[NavigationWaypoint] {
        &self.waypoints
    }

    pub fn waypoint(&self, index: usize) -> Option<&NavigationWaypoint> {
        self.waypoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn destination(&self) -> Option<&NavigationWaypoint> {
        self.waypoints.last()
    }

    /// Length of the legs after `index`
    pub fn remaining_after(&self, index: usize) -> f64 {
        if index + 1 >= self.waypoints.len() {
            return 0.0;
        }
        self.waypoints[index..]
            .windows(2)
            .map(|leg| (leg[1].position_2d() - leg[0].position_2d()).norm())
            .sum()
    }
}

/// Reported quality of the live tracking source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingQuality {
    NotAvailable,
    Limited,
    Normal,
}

/// One frame from the tracking source, tracking frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingSample {
    pub position: Vector3<f64>,
    pub heading_radians: f64,
    pub quality: TrackingQuality,
}

impl TrackingSample {
    pub fn new(position: Vector3<f64>, heading_radians: f64) -> Self {
        Self {
            position,
            heading_radians,
            quality: TrackingQuality::Normal,
        }
    }

    pub fn with_quality(mut self, quality: TrackingQuality) -> Self {
        self.quality = quality;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn waypoint(id: &str, x: f64, y: f64) -> NavigationWaypoint {
        NavigationWaypoint::new(id, id, WaypointKind::Intermediate, Vector3::new(x, y, 0.0))
    }

    #[test]
    fn test_path_total_distance_is_sum_of_legs() {
        let path = NavigationPath::new(vec![
            waypoint("a", 0.0, 0.0),
            waypoint("b", 3.0, 4.0),
            waypoint("c", 3.0, 10.0),
        ]);
        assert_relative_eq!(path.total_distance(), 11.0, epsilon = 1e-12);
        assert_relative_eq!(path.remaining_after(1), 6.0, epsilon = 1e-12);
        assert_eq!(path.remaining_after(2), 0.0);
    }

    #[test]
    fn test_path_distance_ignores_height() {
        let mut upper = waypoint("b", 0.0, 2.0);
        upper.position.z = 3.0;
        let path = NavigationPath::new(vec![waypoint("a", 0.0, 0.0), upper]);
        assert_relative_eq!(path.total_distance(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sighting_direction_is_normalized() {
        let sighting = BeaconSighting::new("b1", Vector3::zeros(), Vector3::new(0.0, 3.0, 0.0), 0.9);
        assert_relative_eq!(sighting.direction_local.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_category_priority_order() {
        assert!(
            BeaconCategory::Landmark.calibration_priority()
                < BeaconCategory::Furniture.calibration_priority()
        );
        assert!(
            BeaconCategory::Furniture.calibration_priority()
                < BeaconCategory::Other.calibration_priority()
        );
    }

    fn measurement(id: &str) -> BeaconMeasurement {
        BeaconMeasurement {
            beacon_id: id.to_string(),
            map_position: Vector3::new(1.0, 2.0, 0.0),
            observed_direction_local: Vector3::new(0.0, 1.0, 0.0),
            distance: None,
            confidence: 0.9,
            device_position_tracking: Vector2::zeros(),
            device_heading_tracking: 0.0,
        }
    }

    #[test]
    fn test_calibration_needs_three_measurements() {
        let alignment = RigidAlignment::new(Vector2::new(1.0, 2.0), 0.4);
        let err = CalibrationData::new(alignment, vec![measurement("a"), measurement("b")], 0.9, 0.0, false)
            .unwrap_err();
        assert!(matches!(err, WayfindingError::CalibrationInsufficientMeasurements { recorded: 2 }));

        let data = CalibrationData::new(
            alignment,
            vec![measurement("a"), measurement("b"), measurement("c")],
            0.9,
            0.01,
            true,
        )
        .unwrap();
        assert_eq!(data.alignment(), alignment);
        assert!(data.degraded);
    }

    #[test]
    fn test_doorway_other_side() {
        let doorway = Doorway {
            id: "d1".to_string(),
            name: "Main Door".to_string(),
            position: Vector3::zeros(),
            room_a: "hall".to_string(),
            room_b: "lab".to_string(),
        };
        assert_eq!(doorway.other_side("hall"), Some("lab"));
        assert_eq!(doorway.other_side("kitchen"), None);
    }
}
