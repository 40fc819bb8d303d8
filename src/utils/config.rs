//! Runtime configuration for the wayfinding engines
//!
//! Every section falls back to its defaults, so a partial JSON file only has
//! to name the values it changes.

use crate::core::constants::*;
use crate::error::{Result, WayfindingError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfindingConfig {
    pub triangulation: TriangulationConfig,
    pub calibration: CalibrationConfig,
    pub navigation: NavigationConfig,
    pub transform: TransformConfig,
}

/// Position solver thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Sightings below this confidence are dropped
    pub min_confidence: f64,
    /// Ray cross-product magnitude treated as parallel
    pub parallel_epsilon: f64,
    /// Mean bearing error (radians) mapped to zero confidence
    pub zero_confidence_angle: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            min_confidence: MIN_SIGHTING_CONFIDENCE,
            parallel_epsilon: PARALLEL_EPSILON,
            zero_confidence_angle: ZERO_CONFIDENCE_ANGLE,
        }
    }
}

/// Calibration procedure parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub max_candidates: usize,
    pub min_measurements: usize,
    /// Alignment score a measurement must exceed to be confirmed
    pub alignment_threshold: f64,
    /// Failsafe before tracking readiness is forced (milliseconds)
    pub tracking_timeout_ms: u64,
    /// Fit residual (meters) at which calibration confidence reaches zero
    pub residual_limit_m: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_candidates: MAX_CALIBRATION_BEACONS,
            min_measurements: MIN_CALIBRATION_MEASUREMENTS,
            alignment_threshold: CALIBRATION_ALIGNMENT_THRESHOLD,
            tracking_timeout_ms: TRACKING_READY_TIMEOUT_MS,
            residual_limit_m: 1.0,
        }
    }
}

impl CalibrationConfig {
    pub fn tracking_timeout(&self) -> Duration {
        Duration::from_millis(self.tracking_timeout_ms)
    }
}

/// Navigation progress engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub tick_interval_ms: u64,
    pub arrival_threshold_m: f64,
    pub arrival_cooldown_ms: u64,
    pub approach_min_m: f64,
    pub approach_max_m: f64,
    pub step_length_m: f64,
    pub doorway_announce_m: f64,
    /// Distance from the expected route position that counts as off-route
    pub recalculation_threshold_m: f64,
    /// Used for the time-remaining estimate
    pub walking_speed_mps: f64,
    /// Upper bound on one description request (milliseconds)
    pub description_timeout_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: NAVIGATION_TICK_MS,
            arrival_threshold_m: ARRIVAL_THRESHOLD_M,
            arrival_cooldown_ms: ARRIVAL_COOLDOWN_MS,
            approach_min_m: APPROACH_MIN_M,
            approach_max_m: APPROACH_MAX_M,
            step_length_m: STEP_LENGTH_M,
            doorway_announce_m: DOORWAY_ANNOUNCE_M,
            recalculation_threshold_m: RECALCULATION_THRESHOLD_M,
            walking_speed_mps: 1.0,
            description_timeout_ms: 1500,
        }
    }
}

impl NavigationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn arrival_cooldown(&self) -> Duration {
        Duration::from_millis(self.arrival_cooldown_ms)
    }

    pub fn description_timeout(&self) -> Duration {
        Duration::from_millis(self.description_timeout_ms)
    }
}

/// Policy thresholds for the coordinate transform helpers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub arrival_threshold_m: f64,
    pub recalculation_threshold_m: f64,
    /// Heading tolerance for `is_aligned` (radians)
    pub alignment_tolerance_rad: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            arrival_threshold_m: HAS_ARRIVED_THRESHOLD_M,
            recalculation_threshold_m: RECALCULATION_THRESHOLD_M,
            alignment_tolerance_rad: 15f64.to_radians(),
        }
    }
}

impl WayfindingConfig {
    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&content)?;
        info!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reject values the engines cannot work with
    pub fn validate(&self) -> Result<()> {
        let t = &self.triangulation;
        check_range("triangulation.min_confidence", t.min_confidence, 0.0, 1.0)?;
        check_positive("triangulation.parallel_epsilon", t.parallel_epsilon)?;
        check_positive("triangulation.zero_confidence_angle", t.zero_confidence_angle)?;

        let c = &self.calibration;
        if c.min_measurements < MIN_CALIBRATION_MEASUREMENTS {
            return Err(WayfindingError::Config(format!(
                "calibration.min_measurements must be at least {}, got {}",
                MIN_CALIBRATION_MEASUREMENTS, c.min_measurements
            )));
        }
        if c.max_candidates < c.min_measurements {
            return Err(WayfindingError::Config(format!(
                "calibration.max_candidates ({}) is below min_measurements ({})",
                c.max_candidates, c.min_measurements
            )));
        }
        check_range("calibration.alignment_threshold", c.alignment_threshold, 0.0, 1.0)?;
        check_positive("calibration.residual_limit_m", c.residual_limit_m)?;

        let n = &self.navigation;
        if n.tick_interval_ms == 0 {
            return Err(WayfindingError::Config(
                "navigation.tick_interval_ms must be positive".to_string(),
            ));
        }
        check_positive("navigation.arrival_threshold_m", n.arrival_threshold_m)?;
        check_positive("navigation.step_length_m", n.step_length_m)?;
        check_positive("navigation.doorway_announce_m", n.doorway_announce_m)?;
        check_positive("navigation.recalculation_threshold_m", n.recalculation_threshold_m)?;
        check_positive("navigation.walking_speed_mps", n.walking_speed_mps)?;
        if n.approach_min_m > n.approach_max_m {
            return Err(WayfindingError::Config(format!(
                "navigation approach band is inverted: {} > {}",
                n.approach_min_m, n.approach_max_m
            )));
        }
        if n.approach_min_m <= n.arrival_threshold_m {
            return Err(WayfindingError::Config(format!(
                "navigation.approach_min_m ({}) must exceed arrival_threshold_m ({})",
                n.approach_min_m, n.arrival_threshold_m
            )));
        }

        let tr = &self.transform;
        check_positive("transform.arrival_threshold_m", tr.arrival_threshold_m)?;
        check_positive("transform.recalculation_threshold_m", tr.recalculation_threshold_m)?;
        check_positive("transform.alignment_tolerance_rad", tr.alignment_tolerance_rad)?;

        Ok(())
    }
}

fn check_positive(parameter: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(WayfindingError::Config(format!(
            "{} must be positive, got {}",
            parameter, value
        )))
    }
}

fn check_range(parameter: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(WayfindingError::Config(format!(
            "{} must be within [{}, {}], got {}",
            parameter, min, max, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_configuration_is_valid() {
        let config = WayfindingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.navigation.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.navigation.arrival_cooldown(), Duration::from_millis(700));
        assert_eq!(config.calibration.max_candidates, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = WayfindingConfig::from_json(
            r#"{ "navigation": { "arrival_threshold_m": 0.4, "step_length_m": 0.65 } }"#,
        )
        .unwrap();
        assert_eq!(config.navigation.arrival_threshold_m, 0.4);
        assert_eq!(config.navigation.step_length_m, 0.65);
        assert_eq!(config.navigation.arrival_cooldown_ms, 700);
        assert_eq!(config.triangulation, TriangulationConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = WayfindingConfig::default();
        config.calibration.tracking_timeout_ms = 5000;
        let json = config.to_json().unwrap();
        let parsed = WayfindingConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_inverted_approach_band() {
        let mut config = WayfindingConfig::default();
        config.navigation.approach_min_m = 3.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, WayfindingError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = WayfindingConfig::default();
        config.triangulation.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = WayfindingConfig::default();
        config.calibration.min_measurements = 2;
        assert!(config.validate().is_err());

        let mut config = WayfindingConfig::default();
        config.navigation.walking_speed_mps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "calibration": {{ "alignment_threshold": 0.8 }} }}"#).unwrap();
        let config = WayfindingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.calibration.alignment_threshold, 0.8);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wayfinding.json");
        let config = WayfindingConfig::default();
        config.save_to_file(&path).unwrap();
        assert_eq!(WayfindingConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = WayfindingConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, WayfindingError::Json(_)));
    }
}
