//! Estimate smoothing and destination matching

pub mod kalman;
pub mod matcher;

pub use kalman::PositionSmoother;
pub use matcher::{resolve, MatchResult};
