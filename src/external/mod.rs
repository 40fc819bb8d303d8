//! Collaborator interfaces consumed by the engines
//!
//! The tracking source, floorplan store, path planner, narrator and
//! description generator live outside this crate. Each is a trait here, with
//! in-memory implementations in [`mock`] for tests and the demo binary.

pub mod tracking;
pub mod floorplan;
pub mod planner;
pub mod narrator;
pub mod description;
pub mod mock;

pub use tracking::TrackingSource;
pub use floorplan::{BeaconFilter, FloorplanStore};
pub use planner::PathPlanner;
pub use narrator::Narrator;
pub use description::{DescriptionContext, DescriptionGenerator};
pub use mock::{
    EchoDescriptionGenerator, InMemoryFloorplan, RecordingNarrator, ScriptedTrackingSource,
    StraightLinePlanner, TracingNarrator, UnavailableDescriptionGenerator,
};
