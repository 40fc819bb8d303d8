//! Which room a doorway crossing leads from and into

use crate::core::{Doorway, NavigationPath, Room};
use crate::external::floorplan::FloorplanStore;
use nalgebra::Vector2;

/// Resolve the rooms on either side of the doorway waypoint at `index`.
///
/// The neighbouring waypoints' rooms win when both are known. Otherwise the
/// doorway's own room pair is ordered by the user's side: the room nearest the
/// user if it is one of the pair, else the side whose beacon centroid is
/// closer.
pub fn resolve_crossing_rooms(
    path: &NavigationPath,
    index: usize,
    doorway: &Doorway,
    user_position: &Vector2<f64>,
    floorplan: &dyn FloorplanStore,
) -> (Room, Room) {
    let before = index
        .checked_sub(1)
        .and_then(|i| path.waypoint(i))
        .and_then(|w| w.room_id.clone());
    let after = path.waypoint(index + 1).and_then(|w| w.room_id.clone());

    let (from, to) = match (before, after) {
        (Some(from), Some(to)) => (from, to),
        _ => side_of_doorway(doorway, user_position, floorplan),
    };
    (lookup_room(&from, floorplan), lookup_room(&to, floorplan))
}

fn side_of_doorway(
    doorway: &Doorway,
    user_position: &Vector2<f64>,
    floorplan: &dyn FloorplanStore,
) -> (String, String) {
    let forward = (doorway.room_a.clone(), doorway.room_b.clone());
    let backward = (doorway.room_b.clone(), doorway.room_a.clone());

    if let Some(nearest) = floorplan.nearest_room(user_position) {
        if nearest == doorway.room_a {
            return forward;
        }
        if nearest == doorway.room_b {
            return backward;
        }
    }

    let distance_to = |room: &str| {
        floorplan
            .beacon_centroid(room)
            .map(|c| (c - user_position).norm())
            .unwrap_or(f64::INFINITY)
    };
    if distance_to(&doorway.room_b) < distance_to(&doorway.room_a) {
        backward
    } else {
        forward
    }
}

/// Room by id, or a placeholder named after the id
fn lookup_room(room_id: &str, floorplan: &dyn FloorplanStore) -> Room {
    floorplan.room(room_id).unwrap_or_else(|| Room {
        id: room_id.to_string(),
        name: room_id.to_string(),
    })
}
