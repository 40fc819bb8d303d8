//! Live pose source

use crate::core::TrackingSample;

/// Device pose provider (visual-inertial tracking or similar)
pub trait TrackingSource: Send {
    /// Most recent frame, or `None` when no frame is available.
    /// Must not block; missing frames are treated as no-op ticks.
    fn latest_sample(&mut self) -> Option<TrackingSample>;
}

impl<T: TrackingSource + ?Sized> TrackingSource for Box<T> {
    fn latest_sample(&mut self) -> Option<TrackingSample> {
        (**self).latest_sample()
    }
}
