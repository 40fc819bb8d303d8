//! Guided calibration between the floorplan and the tracking frame
//!
//! The user stands in a room and aims the device at a handful of known
//! beacons. Each confirmed aim records where the beacon appears in the
//! tracking frame; a weighted least-squares rigid fit over those records gives
//! the rotation and translation stored in [`CalibrationData`].
//!
//! State flow:
//! `WaitingForTracking -> MeasuringBeacon { index, total } -> Completed | Failed`

use crate::algorithms::coordinates::CalibrationContext;
use crate::algorithms::geometry::{heading_vector, horizontal, normalize_angle, rotate_compass};
use crate::core::{
    Beacon, BeaconMeasurement, CalibrationData, RigidAlignment, TrackingQuality, TrackingSample,
};
use crate::error::{Result, WayfindingError};
use crate::external::floorplan::{BeaconFilter, FloorplanStore};
use crate::utils::config::CalibrationConfig;
use nalgebra::{Matrix2, Vector2, Vector3};
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const INSUFFICIENT_BEACONS: &str = "insufficient beacons";
pub const INSUFFICIENT_MEASUREMENTS: &str = "insufficient measurements";

/// Calibration procedure state
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationState {
    WaitingForTracking,
    MeasuringBeacon { index: usize, total: usize },
    Completed(CalibrationData),
    Failed { reason: String },
}

impl CalibrationState {
    pub fn name(&self) -> &'static str {
        match self {
            CalibrationState::WaitingForTracking => "waiting for tracking",
            CalibrationState::MeasuringBeacon { .. } => "measuring beacons",
            CalibrationState::Completed(_) => "completed",
            CalibrationState::Failed { .. } => "failed",
        }
    }
}

/// Outcome of polling the tracking source while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingReadiness {
    Waiting,
    Ready,
    /// The failsafe timeout fired; results are flagged as degraded
    Forced,
}

/// Everything captured at the moment the user confirms an aim
#[derive(Debug, Clone)]
pub struct MeasurementInput {
    /// Device heading in the map frame (compass)
    pub device_heading_map: f64,
    /// Live pose in the tracking frame
    pub sample: TrackingSample,
    /// Device-frame direction towards the beacon
    pub observed_direction_local: Vector3<f64>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementOutcome {
    Recorded { alignment: f64 },
    NotAligned { alignment: f64 },
}

/// Rotation and translation recovered from the measurements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidFit {
    pub user_position_map: Vector2<f64>,
    pub heading_map_to_tracking: f64,
    /// Weighted RMS residual (meters)
    pub residual: f64,
}

impl RigidFit {
    pub fn alignment(&self) -> RigidAlignment {
        RigidAlignment::new(self.user_position_map, self.heading_map_to_tracking)
    }
}

/// Calibration procedure driver
pub struct CalibrationEngine {
    config: CalibrationConfig,
    state: CalibrationState,
    started_at: Option<Instant>,
    tracking_ready: bool,
    degraded: bool,
    user_position_map: Vector2<f64>,
    room_id: Option<String>,
    candidates: Vec<Beacon>,
    measurements: Vec<BeaconMeasurement>,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            state: CalibrationState::WaitingForTracking,
            started_at: None,
            tracking_ready: false,
            degraded: false,
            user_position_map: Vector2::zeros(),
            room_id: None,
            candidates: Vec::new(),
            measurements: Vec::new(),
        }
    }

    /// Reset and start the tracking-ready wait
    pub fn begin(&mut self, now: Instant) {
        self.state = CalibrationState::WaitingForTracking;
        self.started_at = Some(now);
        self.tracking_ready = false;
        self.degraded = false;
        self.room_id = None;
        self.candidates.clear();
        self.measurements.clear();
        info!("calibration started");
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn measurements(&self) -> &[BeaconMeasurement] {
        &self.measurements
    }

    pub fn candidates(&self) -> &[Beacon] {
        &self.candidates
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Feed the latest tracking frame while waiting for stable tracking
    pub fn poll_tracking(&mut self, sample: Option<&TrackingSample>, now: Instant) -> TrackingReadiness {
        if self.tracking_ready {
            return if self.degraded {
                TrackingReadiness::Forced
            } else {
                TrackingReadiness::Ready
            };
        }

        if matches!(sample, Some(s) if s.quality == TrackingQuality::Normal) {
            self.tracking_ready = true;
            info!("tracking ready");
            return TrackingReadiness::Ready;
        }

        let started_at = *self.started_at.get_or_insert(now);
        let waited = now.saturating_duration_since(started_at);
        if waited >= self.config.tracking_timeout() {
            self.tracking_ready = true;
            self.degraded = true;
            warn!(
                waited_ms = waited.as_millis() as u64,
                "tracking never stabilized, continuing with degraded confidence"
            );
            return TrackingReadiness::Forced;
        }

        TrackingReadiness::Waiting
    }

    /// Pick the beacons to aim at, from the room nearest to the user
    pub fn start_measuring(
        &mut self,
        floorplan: &dyn FloorplanStore,
        user_position_map: Vector2<f64>,
    ) -> Result<&CalibrationState> {
        if !self.tracking_ready || self.state != CalibrationState::WaitingForTracking {
            return Err(WayfindingError::InvalidState {
                operation: "start measuring",
                state: self.state.name().to_string(),
            });
        }

        self.user_position_map = user_position_map;
        let room_id = floorplan.nearest_room(&user_position_map);
        let mut candidates: Vec<Beacon> = match &room_id {
            Some(room) => floorplan
                .beacons_in_room(room)
                .into_iter()
                .filter(|b| BeaconFilter::usable().matches(b))
                .collect(),
            None => Vec::new(),
        };
        candidates.sort_by(|a, b| {
            a.category
                .calibration_priority()
                .cmp(&b.category.calibration_priority())
                .then_with(|| a.name.cmp(&b.name))
        });
        candidates.truncate(self.config.max_candidates);
        self.room_id = room_id;

        if candidates.len() < self.config.min_measurements {
            warn!(room = ?self.room_id, found = candidates.len(), "not enough calibration beacons");
            self.state = CalibrationState::Failed {
                reason: INSUFFICIENT_BEACONS.to_string(),
            };
            return Err(WayfindingError::CalibrationInsufficientBeacons {
                available: candidates.len(),
            });
        }

        info!(
            room = ?self.room_id,
            beacons = ?candidates.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            "calibration candidates selected"
        );
        self.state = CalibrationState::MeasuringBeacon {
            index: 0,
            total: candidates.len(),
        };
        self.candidates = candidates;
        Ok(&self.state)
    }

    pub fn current_candidate(&self) -> Option<&Beacon> {
        match self.state {
            CalibrationState::MeasuringBeacon { index, .. } => self.candidates.get(index),
            _ => None,
        }
    }

    /// How well the device points at the current candidate, in [0, 1]
    pub fn alignment_score(&self, device_heading_map: f64) -> Option<f64> {
        let beacon = self.current_candidate()?;
        let to_beacon = (horizontal(&beacon.position) - self.user_position_map).try_normalize(1e-9)?;
        Some(alignment(&heading_vector(device_heading_map), &to_beacon))
    }

    /// Record the current candidate if the device is aimed well enough
    pub fn confirm_measurement(&mut self, input: MeasurementInput) -> Result<MeasurementOutcome> {
        let Some(beacon) = self.current_candidate().cloned() else {
            return Err(WayfindingError::InvalidState {
                operation: "confirm measurement",
                state: self.state.name().to_string(),
            });
        };
        let score = self.alignment_score(input.device_heading_map).unwrap_or(0.0);
        if score <= self.config.alignment_threshold {
            debug!(beacon = %beacon.id, score, "aim not good enough to confirm");
            return Ok(MeasurementOutcome::NotAligned { alignment: score });
        }

        let direction = input
            .observed_direction_local
            .try_normalize(1e-12)
            .unwrap_or(input.observed_direction_local);
        self.measurements.push(BeaconMeasurement {
            beacon_id: beacon.id.clone(),
            map_position: beacon.position,
            observed_direction_local: direction,
            distance: input.distance,
            confidence: score,
            device_position_tracking: horizontal(&input.sample.position),
            device_heading_tracking: normalize_angle(input.sample.heading_radians),
        });
        info!(beacon = %beacon.id, alignment = score, "calibration measurement recorded");

        self.advance()?;
        Ok(MeasurementOutcome::Recorded { alignment: score })
    }

    /// Move past the current candidate without recording it
    pub fn skip_current(&mut self) -> Result<&CalibrationState> {
        if self.current_candidate().is_none() {
            return Err(WayfindingError::InvalidState {
                operation: "skip beacon",
                state: self.state.name().to_string(),
            });
        }
        self.advance()?;
        Ok(&self.state)
    }

    fn advance(&mut self) -> Result<()> {
        let CalibrationState::MeasuringBeacon { index, total } = self.state else {
            return Ok(());
        };
        let next = index + 1;
        let remaining = total.saturating_sub(next);

        if self.measurements.len() + remaining < self.config.min_measurements {
            return self.fail_insufficient_measurements();
        }
        if next < total {
            self.state = CalibrationState::MeasuringBeacon { index: next, total };
            return Ok(());
        }
        self.finish()
    }

    fn fail_insufficient_measurements(&mut self) -> Result<()> {
        warn!(recorded = self.measurements.len(), "calibration failed");
        self.state = CalibrationState::Failed {
            reason: INSUFFICIENT_MEASUREMENTS.to_string(),
        };
        Err(WayfindingError::CalibrationInsufficientMeasurements {
            recorded: self.measurements.len(),
        })
    }

    fn finish(&mut self) -> Result<()> {
        if self.measurements.len() < self.config.min_measurements {
            return self.fail_insufficient_measurements();
        }
        let Some(fit) = fit_rigid_transform(&self.measurements) else {
            return self.fail_insufficient_measurements();
        };

        let mean_confidence =
            self.measurements.iter().map(|m| m.confidence).sum::<f64>() / self.measurements.len() as f64;
        let fit_quality = (1.0 - fit.residual / self.config.residual_limit_m).max(0.0);
        let data = match CalibrationData::new(
            fit.alignment(),
            self.measurements.clone(),
            mean_confidence * fit_quality,
            fit.residual,
            self.degraded,
        ) {
            Ok(data) => data,
            Err(_) => return self.fail_insufficient_measurements(),
        };
        info!(
            x = data.user_position_map.x,
            y = data.user_position_map.y,
            heading = data.heading_map_to_tracking,
            residual = data.residual_error,
            confidence = data.confidence,
            degraded = data.degraded,
            "calibration completed"
        );
        self.state = CalibrationState::Completed(data);
        Ok(())
    }

    /// Hand the finished calibration to the session context
    pub fn install_into(&self, context: &mut CalibrationContext) -> Result<()> {
        match &self.state {
            CalibrationState::Completed(data) => {
                context.install(data.clone());
                Ok(())
            }
            other => Err(WayfindingError::InvalidState {
                operation: "install calibration",
                state: other.name().to_string(),
            }),
        }
    }
}

/// `(dot(forward, to_beacon) + 1) / 2` for unit vectors
pub fn alignment(device_forward: &Vector2<f64>, direction_to_beacon: &Vector2<f64>) -> f64 {
    ((device_forward.dot(direction_to_beacon) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Fit map->tracking rotation and translation to the measurements
///
/// With a range on every measurement the beacons' tracking-frame positions
/// are known and a weighted 2D Kabsch fit solves the problem in closed form.
/// Otherwise the bearings are resected: the rotation is searched and, for each
/// candidate rotation, the translation is the weighted least-squares meeting
/// point of the bearing lines.
pub fn fit_rigid_transform(measurements: &[BeaconMeasurement]) -> Option<RigidFit> {
    if measurements.len() < 2 {
        return None;
    }
    if measurements.iter().all(|m| m.distance.is_some()) {
        fit_with_ranges(measurements)
    } else {
        fit_with_bearings(measurements)
    }
}

/// Tracking-frame unit direction from the device towards the beacon
fn tracking_direction(m: &BeaconMeasurement) -> Option<Vector2<f64>> {
    let flat = horizontal(&m.observed_direction_local).try_normalize(1e-9)?;
    Some(rotate_compass(&flat, m.device_heading_tracking))
}

fn weight(m: &BeaconMeasurement) -> f64 {
    m.confidence.max(1e-6)
}

fn fit_with_ranges(measurements: &[BeaconMeasurement]) -> Option<RigidFit> {
    let mut map_points = Vec::with_capacity(measurements.len());
    let mut observed = Vec::with_capacity(measurements.len());
    let mut weights = Vec::with_capacity(measurements.len());

    for m in measurements {
        let distance = m.distance?;
        let unit = m.observed_direction_local.try_normalize(1e-12)?;
        // Horizontal share of the slant range
        let offset = rotate_compass(&horizontal(&unit), m.device_heading_tracking) * distance;
        map_points.push(horizontal(&m.map_position));
        observed.push(m.device_position_tracking + offset);
        weights.push(weight(m));
    }

    let total: f64 = weights.iter().sum();
    let map_centroid = weighted_centroid(&map_points, &weights, total);
    let observed_centroid = weighted_centroid(&observed, &weights, total);

    let mut dot = 0.0;
    let mut cross = 0.0;
    for ((m, o), w) in map_points.iter().zip(&observed).zip(&weights) {
        let a = m - map_centroid;
        let b = o - observed_centroid;
        dot += w * a.dot(&b);
        cross += w * (a.x * b.y - a.y * b.x);
    }
    if dot.abs() < 1e-12 && cross.abs() < 1e-12 {
        return None;
    }

    // Counter-clockwise angle taking map offsets onto tracking offsets
    let ccw = cross.atan2(dot);
    let heading = normalize_angle(-ccw);
    let user_position_map = map_centroid - rotate_compass(&observed_centroid, -heading);

    let residual_sq: f64 = map_points
        .iter()
        .zip(&observed)
        .zip(&weights)
        .map(|((m, o), w)| w * (rotate_compass(&(m - user_position_map), heading) - o).norm_squared())
        .sum();

    Some(RigidFit {
        user_position_map,
        heading_map_to_tracking: heading,
        residual: (residual_sq / total).sqrt(),
    })
}

fn weighted_centroid(points: &[Vector2<f64>], weights: &[f64], total: f64) -> Vector2<f64> {
    points
        .iter()
        .zip(weights)
        .fold(Vector2::zeros(), |acc, (p, w)| acc + p * *w)
        / total
}

/// Bearing line for one measurement, expressed for a trial rotation
struct BearingLine {
    /// Point the translation must lie on
    anchor: Vector2<f64>,
    /// Unit direction from the device towards the beacon, map frame
    direction: Vector2<f64>,
    weight: f64,
    range: Option<f64>,
}

fn bearing_lines(measurements: &[BeaconMeasurement], heading: f64) -> Option<Vec<BearingLine>> {
    measurements
        .iter()
        .map(|m| {
            let direction = rotate_compass(&tracking_direction(m)?, -heading);
            let device_offset = rotate_compass(&m.device_position_tracking, -heading);
            let range = match (m.distance, m.observed_direction_local.try_normalize(1e-12)) {
                (Some(d), Some(unit)) => Some(d * horizontal(&unit).norm()),
                _ => None,
            };
            Some(BearingLine {
                anchor: horizontal(&m.map_position) - device_offset,
                direction,
                weight: weight(m),
                range,
            })
        })
        .collect()
}

/// Least-squares translation for one trial rotation and its cost
fn resect(measurements: &[BeaconMeasurement], heading: f64) -> Option<(Vector2<f64>, f64)> {
    let lines = bearing_lines(measurements, heading)?;

    let mut normal = Matrix2::zeros();
    let mut rhs = Vector2::zeros();
    for line in &lines {
        let e = line.direction;
        let projector = Matrix2::identity() - e * e.transpose();
        normal += projector * line.weight;
        rhs += projector * line.anchor * line.weight;
    }
    let translation = normal.try_inverse()? * rhs;

    let mut cost = 0.0;
    for line in &lines {
        let to_anchor = line.anchor - translation;
        let along = to_anchor.dot(&line.direction);
        let perpendicular = to_anchor - line.direction * along;
        cost += line.weight * perpendicular.norm_squared();
        if along <= 0.0 {
            // Beacon would sit behind the device
            cost += line.weight * (1.0 + along * along);
        }
        if let Some(range) = line.range {
            cost += line.weight * (along - range).powi(2);
        }
    }
    Some((translation, cost))
}

fn fit_with_bearings(measurements: &[BeaconMeasurement]) -> Option<RigidFit> {
    let total: f64 = measurements.iter().map(weight).sum();

    let mut best: Option<(f64, Vector2<f64>, f64)> = None;
    let consider = |heading: f64, best: &mut Option<(f64, Vector2<f64>, f64)>| {
        if let Some((translation, cost)) = resect(measurements, heading) {
            if best.map_or(true, |(_, _, c)| cost < c) {
                *best = Some((heading, translation, cost));
            }
        }
    };

    // Coarse sweep in 1 degree steps, then two refinement passes
    let coarse = PI / 180.0;
    for step in 0..360 {
        consider(-PI + step as f64 * coarse, &mut best);
    }
    for span in [coarse, coarse / 100.0] {
        let (center, _, _) = best?;
        for step in -100..=100 {
            consider(center + step as f64 * span / 100.0, &mut best);
        }
    }

    let (heading, user_position_map, cost) = best?;
    Some(RigidFit {
        user_position_map,
        heading_map_to_tracking: normalize_angle(heading),
        residual: (cost / total).sqrt(),
    })
}
