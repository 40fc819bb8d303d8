use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use crate::core::{EstimationMethod, PositionEstimate};
use tracing::debug;

/// Gap after which the filter restarts from the next estimate (milliseconds)
pub const DEFAULT_MAX_GAP_MS: u64 = 5000;

/// Kalman filter for smoothing successive position estimates
/// State vector: [x, y, vx, vy] (map-frame position and velocity)
#[derive(Debug, Clone)]
pub struct PositionSmoother {
    /// Current state estimate [position, velocity]
    state: Vector4<f64>,
    /// State covariance matrix
    covariance: Matrix4<f64>,
    /// Process noise per second of prediction
    process_noise: Matrix4<f64>,
    /// Measurement variance for a fully confident estimate (m^2)
    measurement_noise: f64,
    last_timestamp_ms: Option<u64>,
    max_gap_ms: u64,
}

impl Default for PositionSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSmoother {
    pub fn new() -> Self {
        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity() * 100.0,
            process_noise: Self::create_process_noise(0.1, 0.01),
            measurement_noise: 0.25,
            last_timestamp_ms: None,
            max_gap_ms: DEFAULT_MAX_GAP_MS,
        }
    }

    /// Create a smoother with custom noise parameters
    pub fn with_noise_parameters(position_noise: f64, velocity_noise: f64, measurement_noise: f64) -> Self {
        Self {
            process_noise: Self::create_process_noise(position_noise, velocity_noise),
            measurement_noise,
            ..Self::new()
        }
    }

    pub fn with_max_gap_ms(mut self, max_gap_ms: u64) -> Self {
        self.max_gap_ms = max_gap_ms;
        self
    }

    fn initialize(&mut self, position: &Vector2<f64>, timestamp_ms: u64) {
        self.state = Vector4::new(position.x, position.y, 0.0, 0.0);
        self.covariance = Matrix4::identity();
        self.covariance[(2, 2)] = 0.1;
        self.covariance[(3, 3)] = 0.1;
        self.last_timestamp_ms = Some(timestamp_ms);
    }

    /// Advance the state by `dt` seconds under constant velocity
    pub fn predict(&mut self, dt: f64) -> Vector2<f64> {
        if dt <= 0.0 {
            return self.position();
        }
        let f = Self::state_transition(dt);
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise * dt;
        self.position()
    }

    /// Fold in a new estimate and return the smoothed one
    pub fn update(&mut self, estimate: &PositionEstimate) -> PositionEstimate {
        let measurement = estimate.position;

        let Some(last) = self.last_timestamp_ms else {
            self.initialize(&measurement, estimate.timestamp_ms);
            return self.filtered(estimate);
        };
        let gap = estimate.timestamp_ms.saturating_sub(last);
        if gap > self.max_gap_ms {
            debug!(gap_ms = gap, "position smoother restarted after gap");
            self.initialize(&measurement, estimate.timestamp_ms);
            return self.filtered(estimate);
        }
        self.predict(gap as f64 / 1000.0);

        let h = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );
        // Less confident estimates are trusted less
        let r = Matrix2::identity() * (self.measurement_noise / estimate.confidence.max(0.05));

        let innovation = measurement - h * self.state;
        let s = h * self.covariance * h.transpose() + r;
        if let Some(s_inv) = s.try_inverse() {
            let k = self.covariance * h.transpose() * s_inv;
            self.state += k * innovation;
            // Joseph form
            let i_kh = Matrix4::identity() - k * h;
            self.covariance = i_kh * self.covariance * i_kh.transpose() + k * r * k.transpose();
        }

        self.last_timestamp_ms = Some(last.max(estimate.timestamp_ms));
        self.filtered(estimate)
    }

    fn filtered(&self, estimate: &PositionEstimate) -> PositionEstimate {
        PositionEstimate {
            position: self.position(),
            method: EstimationMethod::KalmanFiltered,
            ..*estimate
        }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[2], self.state[3])
    }

    /// Position standard deviations
    pub fn position_uncertainty(&self) -> Vector2<f64> {
        Vector2::new(self.covariance[(0, 0)].sqrt(), self.covariance[(1, 1)].sqrt())
    }

    pub fn is_initialized(&self) -> bool {
        self.last_timestamp_ms.is_some()
    }

    pub fn reset(&mut self) {
        self.state = Vector4::zeros();
        self.covariance = Matrix4::identity() * 100.0;
        self.last_timestamp_ms = None;
    }

    fn state_transition(dt: f64) -> Matrix4<f64> {
        Matrix4::new(
            1.0, 0.0, dt,  0.0,
            0.0, 1.0, 0.0, dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn create_process_noise(position_noise: f64, velocity_noise: f64) -> Matrix4<f64> {
        Matrix4::from_diagonal(&Vector4::new(position_noise, position_noise, velocity_noise, velocity_noise))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(x: f64, y: f64, timestamp_ms: u64) -> PositionEstimate {
        PositionEstimate {
            position: Vector2::new(x, y),
            confidence: 0.9,
            heading: 0.3,
            method: EstimationMethod::Multilateration,
            timestamp_ms,
        }
    }

    #[test]
    fn test_first_estimate_passes_through() {
        let mut smoother = PositionSmoother::new();
        assert!(!smoother.is_initialized());
        let out = smoother.update(&estimate(3.0, 4.0, 1000));
        assert!(smoother.is_initialized());
        assert!((out.position - Vector2::new(3.0, 4.0)).norm() < 1e-12);
        assert_eq!(out.method, EstimationMethod::KalmanFiltered);
        assert_eq!(out.confidence, 0.9);
        assert_eq!(out.heading, 0.3);
    }

    #[test]
    fn test_prediction_follows_velocity() {
        let mut smoother = PositionSmoother::new();
        smoother.update(&estimate(0.0, 0.0, 0));
        smoother.state[2] = 1.0;
        let predicted = smoother.predict(2.0);
        assert!((predicted - Vector2::new(2.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_noise_is_attenuated() {
        let mut smoother = PositionSmoother::new();
        let mut last = estimate(3.0, 4.0, 0);
        for i in 0..50u64 {
            let jitter = if i % 2 == 0 { 0.3 } else { -0.3 };
            last = smoother.update(&estimate(3.0 + jitter, 4.0, i * 100));
        }
        assert!((last.position - Vector2::new(3.0, 4.0)).norm() < 0.15);
    }

    #[test]
    fn test_tracks_steady_walk() {
        let mut smoother = PositionSmoother::new();
        let mut last = estimate(0.0, 0.0, 0);
        for i in 0..100u64 {
            let t = i as f64 * 0.1;
            last = smoother.update(&estimate(t, 0.0, i * 100));
        }
        assert!((last.position.x - 9.9).abs() < 1.0);
        assert!(last.position.y.abs() < 1e-9);
        assert!(smoother.velocity().x > 0.0);
    }

    #[test]
    fn test_restarts_after_gap() {
        let mut smoother = PositionSmoother::new();
        smoother.update(&estimate(3.0, 4.0, 0));
        smoother.update(&estimate(3.1, 4.0, 100));
        let out = smoother.update(&estimate(20.0, 20.0, 100 + DEFAULT_MAX_GAP_MS + 1));
        assert!((out.position - Vector2::new(20.0, 20.0)).norm() < 1e-12);
        assert_eq!(smoother.velocity(), Vector2::zeros());
    }

    #[test]
    fn test_low_confidence_moves_less() {
        let mut confident = PositionSmoother::new();
        let mut doubtful = PositionSmoother::new();
        confident.update(&estimate(0.0, 0.0, 0));
        doubtful.update(&estimate(0.0, 0.0, 0));

        let a = confident.update(&estimate(1.0, 0.0, 100));
        let mut weak = estimate(1.0, 0.0, 100);
        weak.confidence = 0.1;
        let b = doubtful.update(&weak);
        assert!(b.position.x < a.position.x);
        assert!(b.position.x > 0.0);
    }

    #[test]
    fn test_reset() {
        let mut smoother = PositionSmoother::new();
        smoother.update(&estimate(1.0, 1.0, 0));
        smoother.reset();
        assert!(!smoother.is_initialized());
        assert!(smoother.position_uncertainty().x > 1.0);
    }
}
