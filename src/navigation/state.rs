//! Navigation state machine shape and per-tick progress

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a navigation session stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationState {
    NotStarted,
    ComputingPath,
    Navigating { waypoint_index: usize, total: usize },
    Paused,
    Arrived,
    Failed { reason: String },
}

impl NavigationState {
    pub fn is_navigating(&self) -> bool {
        matches!(self, NavigationState::Navigating { .. })
    }

    /// Index of the waypoint being walked to, while navigating
    pub fn waypoint_index(&self) -> Option<usize> {
        match self {
            NavigationState::Navigating { waypoint_index, .. } => Some(*waypoint_index),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NavigationState::NotStarted => "not started",
            NavigationState::ComputingPath => "computing path",
            NavigationState::Navigating { .. } => "navigating",
            NavigationState::Paused => "paused",
            NavigationState::Arrived => "arrived",
            NavigationState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationState::Navigating { waypoint_index, total } => {
                write!(f, "navigating (waypoint {} of {})", waypoint_index + 1, total)
            }
            NavigationState::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Derived every tick, never stored beyond the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationProgress {
    pub current_waypoint_index: usize,
    /// Meters to the current waypoint
    pub distance_to_next_waypoint: f64,
    /// Meters to the destination along the route
    pub total_distance_remaining: f64,
    /// Seconds at the configured walking speed
    pub estimated_time_remaining: f64,
    /// Map-frame headings (radians)
    pub current_heading: f64,
    pub target_heading: f64,
    /// Positive when the target lies to the left
    pub heading_error: f64,
    pub total_path_distance: f64,
}

impl NavigationProgress {
    /// Share of the route already walked, in [0, 1]
    pub fn fraction_complete(&self) -> f64 {
        if self.total_path_distance <= 0.0 {
            return 1.0;
        }
        (1.0 - self.total_distance_remaining / self.total_path_distance).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_helpers() {
        let state = NavigationState::Navigating { waypoint_index: 1, total: 3 };
        assert!(state.is_navigating());
        assert_eq!(state.waypoint_index(), Some(1));
        assert_eq!(state.to_string(), "navigating (waypoint 2 of 3)");
        assert_eq!(NavigationState::Paused.waypoint_index(), None);
        assert_eq!(
            NavigationState::Failed { reason: "no route".to_string() }.to_string(),
            "failed: no route"
        );
    }

    #[test]
    fn test_fraction_complete() {
        let mut progress = NavigationProgress {
            current_waypoint_index: 1,
            distance_to_next_waypoint: 2.0,
            total_distance_remaining: 5.0,
            estimated_time_remaining: 5.0,
            current_heading: 0.0,
            target_heading: 0.0,
            heading_error: 0.0,
            total_path_distance: 20.0,
        };
        assert_eq!(progress.fraction_complete(), 0.75);
        progress.total_distance_remaining = 30.0;
        assert_eq!(progress.fraction_complete(), 0.0);
    }
}
