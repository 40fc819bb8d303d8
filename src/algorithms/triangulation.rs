//! Position estimation from beacon sightings
//!
//! Two usable sightings are intersected directly (pairwise triangulation).
//! Three or more are combined by triangulating every pair and taking the
//! confidence-weighted mean (multilateration), with the final confidence taken
//! from how well the fused position explains each individual bearing.

use crate::algorithms::geometry::{angle_between, clamp_unit, local_to_map_direction, normalize_angle};
use crate::core::{BeaconSighting, EstimationMethod, PositionEstimate};
use crate::error::{Result, WayfindingError};
use crate::utils::config::TriangulationConfig;
use nalgebra::{Vector2, Vector3};
use std::f64::consts::FRAC_PI_2;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const MIN_SIGHTINGS: usize = 2;

/// Result of intersecting two sighting rays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairwiseFix {
    pub position: Vector3<f64>,
    pub confidence: f64,
    pub angle_quality: f64,
    pub distance_quality: f64,
}

/// Triangulation / multilateration engine
#[derive(Debug, Clone, Default)]
pub struct TriangulationSolver {
    config: TriangulationConfig,
}

impl TriangulationSolver {
    pub fn new(config: TriangulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TriangulationConfig {
        &self.config
    }

    /// Estimate the device position, stamped with the current wall clock
    pub fn estimate(&self, sightings: &[BeaconSighting], heading: f64) -> Result<PositionEstimate> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.estimate_at(sightings, heading, timestamp_ms)
    }

    /// Estimate the device position from sightings taken while facing `heading`
    pub fn estimate_at(
        &self,
        sightings: &[BeaconSighting],
        heading: f64,
        timestamp_ms: u64,
    ) -> Result<PositionEstimate> {
        if sightings.len() < MIN_SIGHTINGS {
            return Err(WayfindingError::InsufficientSightings {
                available: sightings.len(),
                required: MIN_SIGHTINGS,
            });
        }

        let valid: Vec<&BeaconSighting> = sightings
            .iter()
            .filter(|s| s.confidence >= self.config.min_confidence)
            .collect();
        if valid.len() < MIN_SIGHTINGS {
            return Err(WayfindingError::InsufficientHighConfidenceSightings {
                available: valid.len(),
                required: MIN_SIGHTINGS,
            });
        }

        let (position, confidence, method) = if valid.len() == 2 {
            let fix = self.triangulate_pair(valid[0], valid[1], heading)?;
            (
                Vector2::new(fix.position.x, fix.position.y),
                fix.confidence,
                EstimationMethod::Triangulation,
            )
        } else {
            let (position, confidence) = self.multilaterate(&valid, heading)?;
            (position, confidence, EstimationMethod::Multilateration)
        };

        debug!(
            sightings = valid.len(),
            x = position.x,
            y = position.y,
            confidence,
            ?method,
            "position estimated"
        );

        Ok(PositionEstimate {
            position,
            confidence,
            heading: normalize_angle(heading),
            method,
            timestamp_ms,
        })
    }

    /// Intersect the beacon-to-device rays of two sightings
    pub fn triangulate_pair(
        &self,
        a: &BeaconSighting,
        b: &BeaconSighting,
        heading: f64,
    ) -> Result<PairwiseFix> {
        let d1 = local_to_map_direction(&a.direction_local, heading)
            .ok_or(WayfindingError::NoIntersection)?;
        let d2 = local_to_map_direction(&b.direction_local, heading)
            .ok_or(WayfindingError::NoIntersection)?;

        // Sightings point device->beacon, the rays run beacon->device
        let r1 = -d1;
        let r2 = -d2;
        let cross = r1.x * r2.y - r1.y * r2.x;
        if cross.abs() < self.config.parallel_epsilon {
            return Err(WayfindingError::NoIntersection);
        }

        let p1 = Vector2::new(a.beacon_position.x, a.beacon_position.y);
        let p2 = Vector2::new(b.beacon_position.x, b.beacon_position.y);
        let delta = p2 - p1;
        let t = (delta.x * r2.y - delta.y * r2.x) / cross;
        let xy = p1 + r1 * t;
        let z = (a.beacon_position.z + b.beacon_position.z) / 2.0;
        let position = Vector3::new(xy.x, xy.y, z);

        let angle = angle_between(&d1, &d2);
        let angle_quality = (1.0 - (angle - FRAC_PI_2).abs() / FRAC_PI_2).max(0.0);
        let distance_quality = match (a.distance, b.distance) {
            (Some(da), Some(db)) => {
                let err_a = relative_error(da, (a.beacon_position - position).norm());
                let err_b = relative_error(db, (b.beacon_position - position).norm());
                (1.0 - (err_a + err_b) / 2.0).max(0.0)
            }
            _ => 1.0,
        };

        let confidence = 0.5 * (a.confidence + b.confidence) / 2.0
            + 0.3 * angle_quality
            + 0.2 * distance_quality;

        Ok(PairwiseFix {
            position,
            confidence,
            angle_quality,
            distance_quality,
        })
    }

    fn multilaterate(&self, valid: &[&BeaconSighting], heading: f64) -> Result<(Vector2<f64>, f64)> {
        let mut weighted_sum = Vector2::zeros();
        let mut total_weight = 0.0;

        for i in 0..valid.len() {
            for j in (i + 1)..valid.len() {
                match self.triangulate_pair(valid[i], valid[j], heading) {
                    Ok(fix) => {
                        weighted_sum += Vector2::new(fix.position.x, fix.position.y) * fix.confidence;
                        total_weight += fix.confidence;
                    }
                    Err(e) => {
                        debug!(a = %valid[i].beacon_id, b = %valid[j].beacon_id, "skipping pair: {}", e);
                    }
                }
            }
        }

        if total_weight <= 0.0 {
            return Err(WayfindingError::NoValidPairs);
        }
        let position = weighted_sum / total_weight;

        let mut error_sum = 0.0;
        let mut counted = 0usize;
        for sighting in valid {
            let Some(observed) = local_to_map_direction(&sighting.direction_local, heading) else {
                continue;
            };
            let to_beacon = Vector2::new(sighting.beacon_position.x, sighting.beacon_position.y) - position;
            let Some(expected) = to_beacon.try_normalize(1e-9) else {
                continue;
            };
            error_sum += clamp_unit(expected.dot(&observed)).acos();
            counted += 1;
        }
        let confidence = if counted == 0 {
            0.0
        } else {
            let avg_error = error_sum / counted as f64;
            (1.0 - avg_error / self.config.zero_confidence_angle).max(0.0)
        };

        Ok((position, confidence))
    }
}

fn relative_error(measured: f64, implied: f64) -> f64 {
    if implied < 1e-9 {
        return if measured < 1e-9 { 0.0 } else { 1.0 };
    }
    (measured - implied).abs() / implied
}
