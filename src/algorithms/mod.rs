//! Positioning, transform and calibration algorithms

pub mod geometry;
pub mod triangulation;
pub mod coordinates;
pub mod calibration;

pub use triangulation::{PairwiseFix, TriangulationSolver};
pub use coordinates::{CalibrationContext, CoordinateTransform};
pub use calibration::{CalibrationEngine, CalibrationState, MeasurementInput, MeasurementOutcome, TrackingReadiness};
