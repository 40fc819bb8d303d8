//! Route computation contract

use crate::core::{Beacon, NavigationPath};
use nalgebra::Vector3;

/// Black-box path planner
pub trait PathPlanner: Send + Sync {
    /// Ordered route from `from` (map frame) to the destination beacon
    fn find_path(&self, from: Vector3<f64>, to: &Beacon) -> Option<NavigationPath>;

    /// The user drifted away from the route near `waypoint_index`.
    /// Recalculation is up to the planner.
    fn report_off_route(&self, _position: Vector3<f64>, _waypoint_index: usize) {}
}
