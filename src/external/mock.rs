//! In-memory collaborators for tests and the demo binary

use crate::algorithms::geometry::horizontal;
use crate::core::{
    Beacon, Doorway, NavigationPath, NavigationWaypoint, Room, TrackingSample, WaypointKind,
};
use crate::error::{Result, WayfindingError};
use crate::external::description::{DescriptionContext, DescriptionGenerator};
use crate::external::floorplan::{BeaconFilter, FloorplanStore};
use crate::external::narrator::Narrator;
use crate::external::planner::PathPlanner;
use crate::external::tracking::TrackingSource;
use crate::navigation::events::NavigationEvent;
use crate::navigation::guidance::describe_event;
use async_trait::async_trait;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Floorplan held entirely in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryFloorplan {
    pub rooms: Vec<Room>,
    pub beacons: Vec<Beacon>,
    pub doorways: Vec<Doorway>,
}

impl InMemoryFloorplan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn add_room(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.rooms.push(Room {
            id: id.into(),
            name: name.into(),
        });
    }

    pub fn add_beacon(&mut self, beacon: Beacon) {
        self.beacons.push(beacon);
    }

    pub fn add_doorway(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        position: Vector3<f64>,
        room_a: impl Into<String>,
        room_b: impl Into<String>,
    ) {
        self.doorways.push(Doorway {
            id: id.into(),
            name: name.into(),
            position,
            room_a: room_a.into(),
            room_b: room_b.into(),
        });
    }

    pub fn beacon(&self, id: &str) -> Option<&Beacon> {
        self.beacons.iter().find(|b| b.id == id)
    }
}

impl FloorplanStore for InMemoryFloorplan {
    fn room(&self, room_id: &str) -> Option<Room> {
        self.rooms.iter().find(|r| r.id == room_id).cloned()
    }

    fn beacons_in_room(&self, room_id: &str) -> Vec<Beacon> {
        self.beacons
            .iter()
            .filter(|b| b.room_id == room_id)
            .cloned()
            .collect()
    }

    fn doorway(&self, doorway_id: &str) -> Option<Doorway> {
        self.doorways.iter().find(|d| d.id == doorway_id).cloned()
    }

    fn doorways(&self) -> Vec<Doorway> {
        self.doorways.clone()
    }

    fn beacons(&self, filter: &BeaconFilter) -> Vec<Beacon> {
        self.beacons
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect()
    }
}

/// Planner that walks straight lines: start, each doorway on the way, then
/// the destination. Rooms are connected only through doorways.
pub struct StraightLinePlanner {
    floorplan: Arc<dyn FloorplanStore>,
    off_route_reports: Mutex<Vec<(Vector3<f64>, usize)>>,
}

impl StraightLinePlanner {
    pub fn new(floorplan: Arc<dyn FloorplanStore>) -> Self {
        Self {
            floorplan,
            off_route_reports: Mutex::new(Vec::new()),
        }
    }

    /// Off-route reports received so far
    pub fn off_route_reports(&self) -> Vec<(Vector3<f64>, usize)> {
        self.off_route_reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Breadth-first search over the room graph
    fn doorway_route(&self, from_room: &str, to_room: &str) -> Option<Vec<Doorway>> {
        if from_room == to_room {
            return Some(Vec::new());
        }
        let doorways = self.floorplan.doorways();
        let mut reached_by: HashMap<String, (String, usize)> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([from_room.to_string()]);
        let mut queue = VecDeque::from([from_room.to_string()]);

        while let Some(room) = queue.pop_front() {
            for (i, doorway) in doorways.iter().enumerate() {
                let Some(next) = doorway.other_side(&room) else {
                    continue;
                };
                if !visited.insert(next.to_string()) {
                    continue;
                }
                reached_by.insert(next.to_string(), (room.clone(), i));
                if next == to_room {
                    let mut route = Vec::new();
                    let mut cursor = to_room.to_string();
                    while let Some((previous, doorway_index)) = reached_by.get(&cursor) {
                        route.push(doorways[*doorway_index].clone());
                        cursor = previous.clone();
                    }
                    route.reverse();
                    return Some(route);
                }
                queue.push_back(next.to_string());
            }
        }
        None
    }
}

impl PathPlanner for StraightLinePlanner {
    fn find_path(&self, from: Vector3<f64>, to: &Beacon) -> Option<NavigationPath> {
        if !to.accessible {
            debug!(beacon = %to.id, "destination is not accessible");
            return None;
        }
        let start_room = self.floorplan.nearest_room(&horizontal(&from))?;
        let route = self.doorway_route(&start_room, &to.room_id)?;

        let mut waypoints = Vec::with_capacity(route.len() + 2);
        waypoints.push(NavigationWaypoint::new("start", "Start", WaypointKind::Start, from).in_room(start_room));
        for doorway in route {
            waypoints.push(
                NavigationWaypoint::new(
                    format!("door-{}", doorway.id),
                    doorway.name.clone(),
                    WaypointKind::Doorway,
                    doorway.position,
                )
                .through_doorway(doorway.id),
            );
        }
        waypoints.push(
            NavigationWaypoint::new(to.id.clone(), to.name.clone(), WaypointKind::Destination, to.position)
                .in_room(to.room_id.clone()),
        );

        let path = NavigationPath::new(waypoints);
        debug!(waypoints = path.len(), distance = path.total_distance(), "straight-line path");
        Some(path)
    }

    fn report_off_route(&self, position: Vector3<f64>, waypoint_index: usize) {
        self.off_route_reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((position, waypoint_index));
    }
}

/// Replays a fixed sequence of frames; `None` entries are dropped frames
#[derive(Debug, Clone, Default)]
pub struct ScriptedTrackingSource {
    frames: VecDeque<Option<TrackingSample>>,
}

impl ScriptedTrackingSource {
    pub fn new<I: IntoIterator<Item = TrackingSample>>(samples: I) -> Self {
        Self {
            frames: samples.into_iter().map(Some).collect(),
        }
    }

    pub fn push(&mut self, sample: TrackingSample) {
        self.frames.push_back(Some(sample));
    }

    pub fn push_gap(&mut self) {
        self.frames.push_back(None);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl TrackingSource for ScriptedTrackingSource {
    fn latest_sample(&mut self) -> Option<TrackingSample> {
        self.frames.pop_front().flatten()
    }
}

/// Keeps every announced event
#[derive(Debug, Default)]
pub struct RecordingNarrator {
    events: Mutex<Vec<NavigationEvent>>,
}

impl RecordingNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Narrator for RecordingNarrator {
    fn announce(&self, event: &NavigationEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Writes each announcement to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNarrator;

impl Narrator for TracingNarrator {
    fn announce(&self, event: &NavigationEvent) {
        info!(kind = event.kind(), "{}", describe_event(event));
    }
}

/// Generator that is never reachable
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDescriptionGenerator;

#[async_trait]
impl DescriptionGenerator for UnavailableDescriptionGenerator {
    async fn generate_description(&self, _context: &DescriptionContext) -> Result<String> {
        Err(WayfindingError::DescriptionGenerationFailed(
            "description service unavailable".to_string(),
        ))
    }
}

/// Generator that answers after a fixed delay with a templated sentence
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoDescriptionGenerator {
    pub delay: Duration,
}

impl EchoDescriptionGenerator {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DescriptionGenerator for EchoDescriptionGenerator {
    async fn generate_description(&self, context: &DescriptionContext) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(match &context.room_name {
            Some(room) => format!("Next up: {} in the {}.", context.waypoint_name, room),
            None => format!("Next up: {}.", context.waypoint_name),
        })
    }
}
