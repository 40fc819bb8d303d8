//! Error types for the wayfinding core

use thiserror::Error;

/// Wayfinding error type
///
/// None of these are fatal to the process. Each one is either retried by the
/// caller or downgraded to a user-visible status; see [`WayfindingError::recovery`].
#[derive(Error, Debug)]
pub enum WayfindingError {
    #[error("Insufficient sightings: {available} available, {required} required")]
    InsufficientSightings { available: usize, required: usize },

    #[error("Insufficient high-confidence sightings: {available} available, {required} required")]
    InsufficientHighConfidenceSightings { available: usize, required: usize },

    #[error("Sighting rays do not intersect (parallel or degenerate)")]
    NoIntersection,

    #[error("No beacon pair produced a valid intersection")]
    NoValidPairs,

    #[error("No path found to {destination}")]
    PathNotFound { destination: String },

    #[error("Calibration needs at least 3 usable beacons in the room, found {available}")]
    CalibrationInsufficientBeacons { available: usize },

    #[error("Calibration needs at least 3 confirmed measurements, recorded {recorded}")]
    CalibrationInsufficientMeasurements { recorded: usize },

    #[error("Tracking unavailable")]
    TrackingUnavailable,

    #[error("Description generation failed: {0}")]
    DescriptionGenerationFailed(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WayfindingError>;

/// How a caller is expected to react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Collect a new sighting set and estimate again
    RetryWithFreshSightings,
    /// Show the failure to the user, do not retry automatically
    SurfaceToUser,
    /// Ask the user to move or re-aim, then restart calibration
    Reposition,
    /// Keep running with a "waiting" status
    DegradeStatus,
    /// Substitute deterministic output and log
    UseFallback,
    /// Caller bug or bad input that retrying will not fix
    Fail,
}

impl WayfindingError {
    /// Get the recommended recovery strategy for this error
    pub fn recovery(&self) -> RecoveryStrategy {
        match self {
            WayfindingError::InsufficientSightings { .. }
            | WayfindingError::InsufficientHighConfidenceSightings { .. }
            | WayfindingError::NoIntersection
            | WayfindingError::NoValidPairs => RecoveryStrategy::RetryWithFreshSightings,
            WayfindingError::PathNotFound { .. } => RecoveryStrategy::SurfaceToUser,
            WayfindingError::CalibrationInsufficientBeacons { .. }
            | WayfindingError::CalibrationInsufficientMeasurements { .. } => {
                RecoveryStrategy::Reposition
            }
            WayfindingError::TrackingUnavailable => RecoveryStrategy::DegradeStatus,
            WayfindingError::DescriptionGenerationFailed(_) => RecoveryStrategy::UseFallback,
            WayfindingError::InvalidState { .. }
            | WayfindingError::Config(_)
            | WayfindingError::Io(_)
            | WayfindingError::Json(_) => RecoveryStrategy::Fail,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery(), RecoveryStrategy::Fail)
    }

    /// Short guidance line for the user, where one makes sense
    pub fn user_guidance(&self) -> Option<&'static str> {
        match self.recovery() {
            RecoveryStrategy::Reposition => {
                Some("Move to an open spot in the room and try calibrating again")
            }
            RecoveryStrategy::SurfaceToUser => Some("No route to that destination"),
            RecoveryStrategy::DegradeStatus => Some("Waiting for tracking"),
            _ => None,
        }
    }
}
