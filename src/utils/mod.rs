//! Configuration utilities

pub mod config;

pub use config::{
    CalibrationConfig, NavigationConfig, TransformConfig, TriangulationConfig, WayfindingConfig,
};
