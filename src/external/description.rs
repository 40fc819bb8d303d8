//! Optional natural-language description source

use crate::core::WaypointKind;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the user is heading towards, handed to the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionContext {
    pub waypoint_index: usize,
    pub waypoint_name: String,
    pub waypoint_kind: WaypointKind,
    pub room_name: Option<String>,
    /// Names of notable beacons in the waypoint's room
    pub nearby_beacons: Vec<String>,
    pub distance: f64,
    pub heading_error: f64,
}

/// Asynchronous text generator. May fail; callers fall back to fixed text.
#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn generate_description(&self, context: &DescriptionContext) -> Result<String>;
}
