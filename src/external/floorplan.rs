//! Read-only floorplan queries

use crate::algorithms::geometry::horizontal;
use crate::core::{Beacon, BeaconCategory, Doorway, Room};
use nalgebra::Vector2;

/// Beacon list filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeaconFilter {
    pub accessible_only: bool,
    pub exclude_obstacles: bool,
    /// `None` accepts every category
    pub categories: Option<Vec<BeaconCategory>>,
}

impl BeaconFilter {
    pub fn any() -> Self {
        Self::default()
    }

    /// Accessible beacons that are not obstacles
    pub fn usable() -> Self {
        Self {
            accessible_only: true,
            exclude_obstacles: true,
            categories: None,
        }
    }

    pub fn with_categories(mut self, categories: &[BeaconCategory]) -> Self {
        self.categories = Some(categories.to_vec());
        self
    }

    pub fn matches(&self, beacon: &Beacon) -> bool {
        if self.accessible_only && !beacon.accessible {
            return false;
        }
        if self.exclude_obstacles && beacon.obstacle {
            return false;
        }
        match &self.categories {
            Some(categories) => categories.contains(&beacon.category),
            None => true,
        }
    }
}

/// Floorplan data store
pub trait FloorplanStore: Send + Sync {
    fn room(&self, room_id: &str) -> Option<Room>;

    fn beacons_in_room(&self, room_id: &str) -> Vec<Beacon>;

    fn doorway(&self, doorway_id: &str) -> Option<Doorway>;

    fn doorways(&self) -> Vec<Doorway>;

    fn beacons(&self, filter: &BeaconFilter) -> Vec<Beacon>;

    /// Room of the beacon closest to `position`
    fn nearest_room(&self, position: &Vector2<f64>) -> Option<String> {
        self.beacons(&BeaconFilter::any())
            .into_iter()
            .map(|b| ((horizontal(&b.position) - position).norm(), b.room_id))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, room_id)| room_id)
    }

    /// Mean horizontal position of the room's beacons
    fn beacon_centroid(&self, room_id: &str) -> Option<Vector2<f64>> {
        let beacons = self.beacons_in_room(room_id);
        if beacons.is_empty() {
            return None;
        }
        let sum = beacons
            .iter()
            .fold(Vector2::zeros(), |acc, b| acc + horizontal(&b.position));
        Some(sum / beacons.len() as f64)
    }
}
