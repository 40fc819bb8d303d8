//! Indoor Beacon Wayfinding
//!
//! Geometry and navigation core for guiding a user through a building using
//! fixed, named beacons. It triangulates a position from beacon sightings,
//! calibrates the live tracking frame against the floorplan, and follows a
//! planned route waypoint by waypoint while emitting narration events.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod navigation;
pub mod external;
pub mod utils;
pub mod error;

// Re-export commonly used types
pub use core::{
    Beacon, BeaconCategory, BeaconSighting, CalibrationData, NavigationPath, NavigationWaypoint,
    PositionEstimate, Room, TrackingSample, WaypointKind,
};
pub use algorithms::{
    CalibrationContext, CalibrationEngine, CalibrationState, CoordinateTransform, TriangulationSolver,
};
pub use processing::{resolve, MatchResult, PositionSmoother};
pub use navigation::{
    NavigationEvent, NavigationProgress, NavigationProgressEngine, NavigationSession, NavigationState,
    SessionHandle,
};
pub use external::{DescriptionGenerator, FloorplanStore, Narrator, PathPlanner, TrackingSource};
pub use utils::config::WayfindingConfig;
pub use error::{Result, WayfindingError};
