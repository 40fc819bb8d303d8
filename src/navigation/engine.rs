//! Waypoint-following state machine
//!
//! The engine is ticked with the latest tracking frame. Each tick converts
//! the frame into the map frame, measures the distance to the current
//! waypoint and fires at most one of each latched event:
//! - approach: once per waypoint index, when entering the approach band
//! - arrival: debounced by an explicit cooldown, then the index advances
//! - doorway: once per doorway id for the lifetime of the path
//! - off-route: once per excursion, re-armed when the user closes in again
//!
//! Events queue up inside the engine and are taken with
//! [`NavigationProgressEngine::drain_events`].

use crate::algorithms::coordinates::CoordinateTransform;
use crate::algorithms::geometry::{bearing, horizontal, project_onto_segment};
use crate::core::{Beacon, NavigationPath, TrackingQuality, TrackingSample, WaypointKind};
use crate::error::{Result, WayfindingError};
use crate::external::description::DescriptionContext;
use crate::external::floorplan::{BeaconFilter, FloorplanStore};
use crate::external::planner::PathPlanner;
use crate::navigation::doorway::resolve_crossing_rooms;
use crate::navigation::events::NavigationEvent;
use crate::navigation::state::{NavigationProgress, NavigationState};
use crate::utils::config::NavigationConfig;
use nalgebra::{Vector2, Vector3};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Nearby beacon names offered to the description generator
const DESCRIPTION_NEARBY_LIMIT: usize = 3;

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Not navigating
    Inactive,
    /// No usable tracking frame this tick
    WaitingForTracking,
    /// Inside the arrival cooldown
    CoolingDown,
    Updated,
}

pub struct NavigationProgressEngine {
    config: NavigationConfig,
    transform: CoordinateTransform,
    floorplan: Arc<dyn FloorplanStore>,
    planner: Arc<dyn PathPlanner>,
    state: NavigationState,
    path: Option<NavigationPath>,
    destination: Option<Beacon>,
    progress: Option<NavigationProgress>,
    paused_index: Option<usize>,
    last_position: Option<Vector2<f64>>,
    last_distance: Option<f64>,
    approach_announced: HashSet<usize>,
    doorways_announced: HashSet<String>,
    off_route: bool,
    cooldown_until: Option<Instant>,
    outbox: Vec<NavigationEvent>,
}

impl NavigationProgressEngine {
    pub fn new(
        config: NavigationConfig,
        transform: CoordinateTransform,
        floorplan: Arc<dyn FloorplanStore>,
        planner: Arc<dyn PathPlanner>,
    ) -> Self {
        Self {
            config,
            transform,
            floorplan,
            planner,
            state: NavigationState::NotStarted,
            path: None,
            destination: None,
            progress: None,
            paused_index: None,
            last_position: None,
            last_distance: None,
            approach_announced: HashSet::new(),
            doorways_announced: HashSet::new(),
            off_route: false,
            cooldown_until: None,
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn path(&self) -> Option<&NavigationPath> {
        self.path.as_ref()
    }

    pub fn destination(&self) -> Option<&Beacon> {
        self.destination.as_ref()
    }

    pub fn progress(&self) -> Option<&NavigationProgress> {
        self.progress.as_ref()
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    /// Events emitted since the last drain, oldest first
    pub fn drain_events(&mut self) -> Vec<NavigationEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn is_in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }

    fn emit(&mut self, event: NavigationEvent) {
        info!(kind = event.kind(), "navigation event");
        self.outbox.push(event);
    }

    fn transition(&mut self, state: NavigationState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "navigation state changed");
        self.state = state.clone();
        self.emit(NavigationEvent::StateChanged { state });
    }

    fn clear_route_state(&mut self) {
        self.progress = None;
        self.paused_index = None;
        self.last_position = None;
        self.last_distance = None;
        self.approach_announced.clear();
        self.doorways_announced.clear();
        self.off_route = false;
        self.cooldown_until = None;
    }

    /// Plan a route from `current_position` (map frame) and start following it
    pub fn select_destination(&mut self, destination: &Beacon, current_position: Vector3<f64>) -> Result<&NavigationState> {
        self.transition(NavigationState::ComputingPath);
        self.path = None;
        self.destination = None;
        self.clear_route_state();

        let path = self
            .planner
            .find_path(current_position, destination)
            .filter(|p| !p.is_empty());
        let Some(path) = path else {
            warn!(destination = %destination.name, "no path to destination");
            self.transition(NavigationState::Failed {
                reason: format!("no path to {}", destination.name),
            });
            return Err(WayfindingError::PathNotFound {
                destination: destination.name.clone(),
            });
        };

        info!(
            destination = %destination.name,
            waypoints = path.len(),
            distance = path.total_distance(),
            "route ready"
        );
        let total = path.len();
        self.path = Some(path);
        self.destination = Some(destination.clone());
        self.transition(NavigationState::Navigating { waypoint_index: 0, total });
        Ok(&self.state)
    }

    /// Process one tracking frame.
    ///
    /// Takes `&mut self`, so a tick always runs to completion before the next
    /// one starts. Frames reporting `TrackingQuality::NotAvailable` carry no
    /// real pose and are treated like a missing frame.
    pub fn tick(&mut self, sample: Option<TrackingSample>, now: Instant) -> TickStatus {
        let NavigationState::Navigating { waypoint_index, total } = self.state else {
            return TickStatus::Inactive;
        };
        if self.is_in_cooldown(now) {
            return TickStatus::CoolingDown;
        }
        let Some(sample) = sample.filter(|s| s.quality != TrackingQuality::NotAvailable) else {
            debug!("{}", WayfindingError::TrackingUnavailable);
            return TickStatus::WaitingForTracking;
        };

        self.process_sample(&sample, waypoint_index, total, now);
        TickStatus::Updated
    }

    fn process_sample(&mut self, sample: &TrackingSample, index: usize, total: usize, now: Instant) {
        let Some((target, kind, name, remaining_after, total_path)) = self.path.as_ref().and_then(|path| {
            path.waypoint(index).map(|w| {
                (w.position_2d(), w.kind, w.name.clone(), path.remaining_after(index), path.total_distance())
            })
        }) else {
            return;
        };

        let position_3d = self.transform.tracking_to_map_3d(&sample.position);
        let position = horizontal(&position_3d);
        let heading = self.transform.tracking_heading_to_map(sample.heading_radians);

        let distance = (target - position).norm();
        let target_heading = bearing(&position, &target);
        let heading_error = -self.transform.relative_bearing(&position, &target, heading);
        let remaining = distance + remaining_after;
        self.progress = Some(NavigationProgress {
            current_waypoint_index: index,
            distance_to_next_waypoint: distance,
            total_distance_remaining: remaining,
            estimated_time_remaining: remaining / self.config.walking_speed_mps,
            current_heading: heading,
            target_heading,
            heading_error,
            total_path_distance: total_path,
        });
        debug!(index, distance, heading_error, "tick");

        self.check_doorways(index, &position);

        if distance >= self.config.approach_min_m
            && distance <= self.config.approach_max_m
            && self.approach_announced.insert(index)
        {
            let steps = ((distance / self.config.step_length_m).round() as u32).max(1);
            self.emit(NavigationEvent::Approaching {
                waypoint_index: index,
                waypoint_name: name.clone(),
                steps,
                distance,
            });
        }

        if distance < self.config.arrival_threshold_m {
            self.arrive(index, total, name, kind, now);
            self.last_position = Some(position);
            return;
        }

        self.check_deviation(index, &position, &position_3d, distance);
        self.last_position = Some(position);
        self.last_distance = Some(distance);
    }

    fn arrive(&mut self, index: usize, total: usize, name: String, kind: WaypointKind, now: Instant) {
        self.cooldown_until = Some(now + self.config.arrival_cooldown());
        self.emit(NavigationEvent::Arrived {
            waypoint_index: index,
            waypoint_name: name,
            kind,
        });

        let next = index + 1;
        if next >= total {
            let destination_name = self
                .destination
                .as_ref()
                .map(|b| b.name.clone())
                .or_else(|| self.path.as_ref().and_then(|p| p.destination()).map(|w| w.name.clone()))
                .unwrap_or_default();
            self.emit(NavigationEvent::DestinationReached { destination_name });
            self.transition(NavigationState::Arrived);
        } else {
            self.transition(NavigationState::Navigating { waypoint_index: next, total });
            self.last_distance = None;
            self.off_route = false;
        }
    }

    /// Announce the current or next doorway once the user is close to it
    fn check_doorways(&mut self, index: usize, position: &Vector2<f64>) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        let mut crossings = Vec::new();
        for candidate in [index, index + 1] {
            let Some(waypoint) = path.waypoint(candidate) else {
                continue;
            };
            if waypoint.kind != WaypointKind::Doorway {
                continue;
            }
            let Some(doorway) = waypoint.doorway_id.as_deref().and_then(|id| self.floorplan.doorway(id)) else {
                continue;
            };
            if self.doorways_announced.contains(&doorway.id) {
                continue;
            }
            if (horizontal(&doorway.position) - position).norm() > self.config.doorway_announce_m {
                continue;
            }
            let (from_room, to_room) =
                resolve_crossing_rooms(path, candidate, &doorway, position, self.floorplan.as_ref());
            crossings.push(NavigationEvent::DoorwayCrossing {
                doorway_id: doorway.id.clone(),
                doorway_name: doorway.name.clone(),
                from_room: Some(from_room),
                to_room: Some(to_room),
            });
        }
        for crossing in crossings {
            if let NavigationEvent::DoorwayCrossing { doorway_id, .. } = &crossing {
                self.doorways_announced.insert(doorway_id.clone());
            }
            self.emit(crossing);
        }
    }

    /// Distance grew and the user is too far from where the route expects them
    fn check_deviation(&mut self, index: usize, position: &Vector2<f64>, position_3d: &Vector3<f64>, distance: f64) {
        let Some(last) = self.last_distance else {
            return;
        };
        if distance < last {
            self.off_route = false;
            return;
        }
        if distance == last || self.off_route {
            return;
        }

        let Some(path) = self.path.as_ref() else {
            return;
        };
        let Some(target) = path.waypoint(index).map(|w| w.position_2d()) else {
            return;
        };
        let leg_start = index
            .checked_sub(1)
            .and_then(|i| path.waypoint(i))
            .map(|w| w.position_2d())
            .unwrap_or(target);
        let expected = project_onto_segment(position, &leg_start, &target);

        if self.transform.should_recalculate_beyond(position, &expected, self.config.recalculation_threshold_m) {
            let deviation = (expected - position).norm();
            warn!(index, deviation, "user is off route");
            self.off_route = true;
            self.emit(NavigationEvent::OffRoute {
                waypoint_index: index,
                deviation,
            });
            self.planner.report_off_route(*position_3d, index);
        }
    }

    pub fn pause(&mut self) -> Result<&NavigationState> {
        let NavigationState::Navigating { waypoint_index, .. } = self.state else {
            return Err(self.invalid("pause"));
        };
        self.paused_index = Some(waypoint_index);
        self.transition(NavigationState::Paused);
        Ok(&self.state)
    }

    /// Continue from the waypoint that was current when pausing
    pub fn resume(&mut self) -> Result<&NavigationState> {
        let (NavigationState::Paused, Some(index), Some(path)) = (&self.state, self.paused_index, &self.path) else {
            return Err(self.invalid("resume"));
        };
        let total = path.len();
        self.paused_index = None;
        self.last_distance = None;
        self.off_route = false;
        self.transition(NavigationState::Navigating { waypoint_index: index, total });
        Ok(&self.state)
    }

    /// Drop the route and everything derived from it
    pub fn cancel(&mut self) -> &NavigationState {
        self.path = None;
        self.destination = None;
        self.clear_route_state();
        self.transition(NavigationState::NotStarted);
        &self.state
    }

    fn invalid(&self, operation: &'static str) -> WayfindingError {
        WayfindingError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    /// Context for describing the current waypoint
    pub fn description_context(&self) -> Option<DescriptionContext> {
        let index = self.state.waypoint_index()?;
        let waypoint = self.path.as_ref()?.waypoint(index)?;
        let room = waypoint
            .room_id
            .as_deref()
            .or_else(|| self.destination.as_ref().filter(|_| waypoint.kind == WaypointKind::Destination).map(|b| b.room_id.as_str()));
        let room_name = room.and_then(|id| self.floorplan.room(id)).map(|r| r.name);
        let nearby_beacons = room
            .map(|id| {
                self.floorplan
                    .beacons_in_room(id)
                    .into_iter()
                    .filter(|b| BeaconFilter::usable().matches(b) && b.name != waypoint.name)
                    .take(DESCRIPTION_NEARBY_LIMIT)
                    .map(|b| b.name)
                    .collect()
            })
            .unwrap_or_default();

        let (distance, heading_error) = match (&self.progress, self.last_position) {
            (Some(p), _) if p.current_waypoint_index == index => (p.distance_to_next_waypoint, p.heading_error),
            (_, Some(position)) => ((waypoint.position_2d() - position).norm(), 0.0),
            _ => (0.0, 0.0),
        };

        Some(DescriptionContext {
            waypoint_index: index,
            waypoint_name: waypoint.name.clone(),
            waypoint_kind: waypoint.kind,
            room_name,
            nearby_beacons,
            distance,
            heading_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BeaconCategory, NavigationWaypoint, RigidAlignment};
    use crate::external::mock::{InMemoryFloorplan, StraightLinePlanner};
    use crate::utils::config::TransformConfig;
    use std::f64::consts::FRAC_PI_2;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Planner returning a fixed path and recording off-route reports
    struct FixedPlanner {
        path: Option<NavigationPath>,
        reports: Mutex<Vec<usize>>,
    }

    impl FixedPlanner {
        fn new(path: Option<NavigationPath>) -> Arc<Self> {
            Arc::new(Self {
                path,
                reports: Mutex::new(Vec::new()),
            })
        }
    }

    impl PathPlanner for FixedPlanner {
        fn find_path(&self, _from: Vector3<f64>, _to: &Beacon) -> Option<NavigationPath> {
            self.path.clone()
        }

        fn report_off_route(&self, _position: Vector3<f64>, waypoint_index: usize) {
            self.reports.lock().unwrap().push(waypoint_index);
        }
    }

    fn waypoint(id: &str, kind: WaypointKind, x: f64, y: f64) -> NavigationWaypoint {
        NavigationWaypoint::new(id, id, kind, Vector3::new(x, y, 0.0))
    }

    fn destination() -> Beacon {
        Beacon::new("dest", "Kitchen", Vector3::new(0.0, 10.0, 0.0), "kitchen", BeaconCategory::Destination)
    }

    fn floorplan() -> InMemoryFloorplan {
        let mut plan = InMemoryFloorplan::new();
        plan.add_room("hall", "Hall");
        plan.add_room("kitchen", "Kitchen");
        plan.add_beacon(Beacon::new("h1", "Bench", Vector3::new(0.0, 0.0, 0.0), "hall", BeaconCategory::Furniture));
        plan.add_beacon(destination());
        plan.add_doorway("d1", "Kitchen Door", Vector3::new(0.0, 5.0, 0.0), "hall", "kitchen");
        plan
    }

    fn engine_with(path: Option<NavigationPath>, transform: CoordinateTransform) -> (NavigationProgressEngine, Arc<FixedPlanner>) {
        let planner = FixedPlanner::new(path);
        let engine = NavigationProgressEngine::new(
            NavigationConfig::default(),
            transform,
            Arc::new(floorplan()),
            planner.clone(),
        );
        (engine, planner)
    }

    fn started(path: NavigationPath) -> (NavigationProgressEngine, Arc<FixedPlanner>) {
        let (mut engine, planner) = engine_with(Some(path), CoordinateTransform::identity());
        engine.select_destination(&destination(), Vector3::zeros()).unwrap();
        engine.drain_events();
        (engine, planner)
    }

    fn at(x: f64, y: f64) -> Option<TrackingSample> {
        Some(TrackingSample::new(Vector3::new(x, y, 0.0), 0.0))
    }

    fn count(events: &[NavigationEvent], kind: &str) -> usize {
        events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Single-leg route north: intermediate at 5 m, destination at 10 m
    fn straight_path() -> NavigationPath {
        NavigationPath::new(vec![
            waypoint("mid", WaypointKind::Intermediate, 0.0, 5.0),
            waypoint("end", WaypointKind::Destination, 0.0, 10.0),
        ])
    }

    #[test]
    fn test_select_destination_starts_at_first_waypoint() {
        let (mut engine, _) = engine_with(Some(straight_path()), CoordinateTransform::identity());
        let state = engine.select_destination(&destination(), Vector3::zeros()).unwrap().clone();
        assert_eq!(state, NavigationState::Navigating { waypoint_index: 0, total: 2 });
        let states: Vec<NavigationState> = engine
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NavigationEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![NavigationState::ComputingPath, NavigationState::Navigating { waypoint_index: 0, total: 2 }]
        );
    }

    #[test]
    fn test_missing_path_fails() {
        let (mut engine, _) = engine_with(None, CoordinateTransform::identity());
        let err = engine.select_destination(&destination(), Vector3::zeros()).unwrap_err();
        assert!(matches!(err, WayfindingError::PathNotFound { .. }));
        assert!(matches!(engine.state(), NavigationState::Failed { .. }));
        assert_eq!(engine.tick(at(0.0, 0.0), Instant::now()), TickStatus::Inactive);
    }

    #[test]
    fn test_progress_fields() {
        let (mut engine, _) = started(straight_path());
        assert_eq!(engine.tick(at(0.0, 1.0), Instant::now()), TickStatus::Updated);
        let progress = engine.progress().unwrap();
        assert!((progress.distance_to_next_waypoint - 4.0).abs() < 1e-9);
        assert!((progress.total_distance_remaining - 9.0).abs() < 1e-9);
        assert!((progress.estimated_time_remaining - 9.0).abs() < 1e-9);
        assert!((progress.total_path_distance - 5.0).abs() < 1e-9);
        assert!(progress.heading_error.abs() < 1e-9);
    }

    #[test]
    fn test_heading_error_sign() {
        let (mut engine, _) = started(straight_path());
        // Facing east while the waypoint is north: target on the left
        engine.tick(Some(TrackingSample::new(Vector3::new(0.0, 1.0, 0.0), FRAC_PI_2)), Instant::now());
        let progress = engine.progress().unwrap();
        assert!((progress.heading_error - FRAC_PI_2).abs() < 1e-9);
        assert!((progress.target_heading - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_frame_is_waiting() {
        let (mut engine, _) = started(straight_path());
        assert_eq!(engine.tick(None, Instant::now()), TickStatus::WaitingForTracking);
        assert!(engine.progress().is_none());
    }

    #[test]
    fn test_unavailable_tracking_frame_is_ignored() {
        let (mut engine, _) = started(NavigationPath::new(vec![waypoint("end", WaypointKind::Destination, 0.0, 0.0)]));
        let lost = TrackingSample::new(Vector3::zeros(), 0.0).with_quality(TrackingQuality::NotAvailable);
        assert_eq!(engine.tick(Some(lost), Instant::now()), TickStatus::WaitingForTracking);
        assert!(engine.drain_events().is_empty());
        assert!(engine.progress().is_none());
        assert_eq!(engine.state(), &NavigationState::Navigating { waypoint_index: 0, total: 1 });

        // Limited tracking still carries a pose
        let limited = TrackingSample::new(Vector3::zeros(), 0.0).with_quality(TrackingQuality::Limited);
        assert_eq!(engine.tick(Some(limited), Instant::now()), TickStatus::Updated);
        assert_eq!(engine.state(), &NavigationState::Arrived);
    }

    #[test]
    fn test_oscillation_inside_cooldown_arrives_once() {
        let (mut engine, _) = started(NavigationPath::new(vec![
            waypoint("desk", WaypointKind::Intermediate, 0.0, 0.0),
            waypoint("far", WaypointKind::Destination, 0.0, 30.0),
        ]));
        let start = Instant::now();
        for i in 0..10u64 {
            let distance = if i % 2 == 0 { 0.45 } else { 0.55 };
            engine.tick(at(distance, 0.0), start + Duration::from_millis(i * 60));
        }
        let events = engine.drain_events();
        assert_eq!(count(&events, "arrived"), 1);
        assert_eq!(engine.state(), &NavigationState::Navigating { waypoint_index: 1, total: 2 });
    }

    #[test]
    fn test_cooldown_blocks_ticks() {
        let (mut engine, _) = started(NavigationPath::new(vec![
            waypoint("a", WaypointKind::Intermediate, 0.0, 0.0),
            waypoint("b", WaypointKind::Intermediate, 0.0, 0.3),
            waypoint("c", WaypointKind::Destination, 0.0, 20.0),
        ]));
        let start = Instant::now();
        engine.tick(at(0.0, 0.1), start);
        assert!(engine.is_in_cooldown(start + Duration::from_millis(699)));
        assert_eq!(engine.tick(at(0.0, 0.3), start + Duration::from_millis(300)), TickStatus::CoolingDown);
        assert_eq!(engine.state().waypoint_index(), Some(1));
        assert!(!engine.is_in_cooldown(start + Duration::from_millis(700)));
        engine.tick(at(0.0, 0.3), start + Duration::from_millis(700));
        assert_eq!(engine.state().waypoint_index(), Some(2));
    }

    #[test]
    fn test_approach_fires_once_while_descending() {
        let (mut engine, _) = started(NavigationPath::new(vec![waypoint(
            "end",
            WaypointKind::Destination,
            0.0,
            10.0,
        )]));
        let start = Instant::now();
        let mut approaching = Vec::new();
        let mut distance: f64 = 3.0;
        let mut i = 0u64;
        while distance >= 0.3 - 1e-9 {
            engine.tick(at(0.0, 10.0 - distance), start + Duration::from_millis(i * 100));
            for event in engine.drain_events() {
                if let NavigationEvent::Approaching { steps, distance: d, .. } = event {
                    approaching.push((steps, d));
                }
            }
            distance -= 0.1;
            i += 1;
        }
        assert_eq!(approaching.len(), 1);
        let (steps, d) = approaching[0];
        assert!(d <= 2.5 + 1e-9 && d > 2.3);
        // round(2.5 / 0.7)
        assert_eq!(steps, 4);
        assert_eq!(engine.state(), &NavigationState::Arrived);
    }

    #[test]
    fn test_final_arrival_reports_destination() {
        let (mut engine, _) = started(NavigationPath::new(vec![waypoint("end", WaypointKind::Destination, 0.0, 1.0)]));
        engine.tick(at(0.0, 0.8), Instant::now());
        let events = engine.drain_events();
        assert!(events.contains(&NavigationEvent::DestinationReached {
            destination_name: "Kitchen".to_string()
        }));
        assert!(events.contains(&NavigationEvent::StateChanged {
            state: NavigationState::Arrived
        }));
        assert_eq!(engine.tick(at(0.0, 1.0), Instant::now()), TickStatus::Inactive);
    }

    #[test]
    fn test_doorway_announced_once() {
        let mut door = waypoint("door", WaypointKind::Doorway, 0.0, 5.0);
        door.doorway_id = Some("d1".to_string());
        let path = NavigationPath::new(vec![
            waypoint("start", WaypointKind::Start, 0.0, 0.0).in_room("hall"),
            door,
            waypoint("end", WaypointKind::Destination, 0.0, 10.0).in_room("kitchen"),
        ]);
        let (mut engine, _) = started(path);
        let mut t = Instant::now();
        let mut events = Vec::new();
        for step in 0..=20 {
            engine.tick(at(0.0, step as f64 * 0.5), t);
            events.extend(engine.drain_events());
            t += Duration::from_millis(800);
        }
        let crossings: Vec<&NavigationEvent> =
            events.iter().filter(|e| e.kind() == "doorway_crossing").collect();
        assert_eq!(crossings.len(), 1);
        match crossings[0] {
            NavigationEvent::DoorwayCrossing { doorway_id, from_room, to_room, .. } => {
                assert_eq!(doorway_id, "d1");
                assert_eq!(from_room.as_ref().map(|r| r.name.as_str()), Some("Hall"));
                assert_eq!(to_room.as_ref().map(|r| r.name.as_str()), Some("Kitchen"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.state(), &NavigationState::Arrived);
    }

    #[test]
    fn test_off_route_latched_per_excursion() {
        let (mut engine, planner) = started(NavigationPath::new(vec![
            waypoint("start", WaypointKind::Start, 0.0, 0.0),
            waypoint("end", WaypointKind::Destination, 0.0, 20.0),
        ]));
        let mut t = Instant::now();
        engine.tick(at(0.0, 0.0), t);
        t += Duration::from_secs(1);
        engine.drain_events();

        // Walk along the leg, then drift east while moving away
        for (x, y) in [(0.0, 5.0), (1.0, 4.0), (3.0, 3.5), (5.0, 3.0), (7.0, 2.5)] {
            engine.tick(at(x, y), t);
            t += Duration::from_millis(100);
        }
        let events = engine.drain_events();
        assert_eq!(count(&events, "off_route"), 1);
        assert_eq!(*planner.reports.lock().unwrap(), vec![1]);

        // Closing in re-arms, a second excursion fires again
        for (x, y) in [(5.0, 6.0), (6.0, 5.0), (8.0, 4.0)] {
            engine.tick(at(x, y), t);
            t += Duration::from_millis(100);
        }
        assert_eq!(count(&engine.drain_events(), "off_route"), 1);
    }

    #[test]
    fn test_pause_resume_keeps_index() {
        let (mut engine, _) = started(straight_path());
        engine.tick(at(0.0, 4.8), Instant::now());
        assert_eq!(engine.state().waypoint_index(), Some(1));
        engine.pause().unwrap();
        assert_eq!(engine.tick(at(0.0, 10.0), Instant::now()), TickStatus::Inactive);
        assert!(engine.pause().is_err());
        let state = engine.resume().unwrap().clone();
        assert_eq!(state, NavigationState::Navigating { waypoint_index: 1, total: 2 });
        assert!(engine.resume().is_err());
    }

    #[test]
    fn test_cancel_clears_latches() {
        let (mut engine, _) = started(NavigationPath::new(vec![waypoint("end", WaypointKind::Destination, 0.0, 10.0)]));
        let start = Instant::now();
        engine.tick(at(0.0, 8.0), start);
        assert_eq!(count(&engine.drain_events(), "approaching"), 1);

        assert_eq!(engine.cancel(), &NavigationState::NotStarted);
        assert!(engine.path().is_none());
        assert!(engine.progress().is_none());
        assert_eq!(engine.tick(at(0.0, 8.0), start), TickStatus::Inactive);

        // A fresh route announces again
        engine.select_destination(&destination(), Vector3::zeros()).unwrap();
        engine.tick(at(0.0, 8.0), start);
        assert_eq!(count(&engine.drain_events(), "approaching"), 1);
    }

    #[test]
    fn test_ticks_use_calibrated_frame() {
        // Tracking origin sits at map (0, 5), tracking north is map east
        let transform = CoordinateTransform::new(
            RigidAlignment::new(Vector2::new(0.0, 5.0), -FRAC_PI_2),
            TransformConfig::default(),
        );
        let (mut engine, _) = engine_with(
            Some(NavigationPath::new(vec![waypoint("end", WaypointKind::Destination, 0.0, 10.0)])),
            transform,
        );
        engine.select_destination(&destination(), Vector3::new(0.0, 5.0, 0.0)).unwrap();
        // Tracking (-5, 0) is map (0, 10)
        let map = engine.transform().tracking_to_map(&Vector2::new(-5.0, 0.0));
        assert!((map - Vector2::new(0.0, 10.0)).norm() < 1e-9);
        engine.tick(Some(TrackingSample::new(Vector3::new(-4.8, 0.0, 0.0), 0.0)), Instant::now());
        assert_eq!(engine.state(), &NavigationState::Arrived);
    }

    #[test]
    fn test_description_context_with_planner_route() {
        let plan = Arc::new(floorplan());
        let planner = Arc::new(StraightLinePlanner::new(plan.clone()));
        let mut engine = NavigationProgressEngine::new(
            NavigationConfig::default(),
            CoordinateTransform::identity(),
            plan,
            planner,
        );
        engine.select_destination(&destination(), Vector3::new(0.0, 0.5, 0.0)).unwrap();
        let context = engine.description_context().unwrap();
        assert_eq!(context.waypoint_index, 0);
        assert_eq!(context.waypoint_kind, WaypointKind::Start);
        assert_eq!(context.room_name.as_deref(), Some("Hall"));
        assert_eq!(context.nearby_beacons, vec!["Bench".to_string()]);
        assert_eq!(engine.path().unwrap().len(), 3);
    }
}
