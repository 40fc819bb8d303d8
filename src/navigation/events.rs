//! Events emitted to the narrator and the session's event stream

use crate::core::{Room, WaypointKind};
use crate::navigation::state::NavigationState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationEvent {
    StateChanged {
        state: NavigationState,
    },
    Approaching {
        waypoint_index: usize,
        waypoint_name: String,
        steps: u32,
        distance: f64,
    },
    Arrived {
        waypoint_index: usize,
        waypoint_name: String,
        kind: WaypointKind,
    },
    DestinationReached {
        destination_name: String,
    },
    DoorwayCrossing {
        doorway_id: String,
        doorway_name: String,
        from_room: Option<Room>,
        to_room: Option<Room>,
    },
    OffRoute {
        waypoint_index: usize,
        /// Meters from the expected position on the current leg
        deviation: f64,
    },
    Description {
        waypoint_index: usize,
        text: String,
        /// False when the deterministic fallback text was used
        generated: bool,
    },
}

impl NavigationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NavigationEvent::StateChanged { .. } => "state_changed",
            NavigationEvent::Approaching { .. } => "approaching",
            NavigationEvent::Arrived { .. } => "arrived",
            NavigationEvent::DestinationReached { .. } => "destination_reached",
            NavigationEvent::DoorwayCrossing { .. } => "doorway_crossing",
            NavigationEvent::OffRoute { .. } => "off_route",
            NavigationEvent::Description { .. } => "description",
        }
    }
}
