//! Guidance text and progress formatting
//!
//! Everything here is deterministic: the same event always produces the same
//! sentence, so narration still works when no description generator is
//! available.

use crate::core::WaypointKind;
use crate::external::description::DescriptionContext;
use crate::navigation::events::NavigationEvent;
use crate::navigation::state::NavigationProgress;
use serde::{Deserialize, Serialize};

const STRAIGHT_AHEAD_DEG: f64 = 15.0;
const SLIGHT_TURN_DEG: f64 = 45.0;
const TURN_DEG: f64 = 135.0;

/// Spoken direction for a heading error (positive means the target is left)
pub fn turn_instruction(heading_error: f64) -> &'static str {
    let degrees = heading_error.to_degrees();
    let magnitude = degrees.abs();
    if magnitude <= STRAIGHT_AHEAD_DEG {
        "straight ahead"
    } else if magnitude <= SLIGHT_TURN_DEG {
        if degrees > 0.0 { "slightly left" } else { "slightly right" }
    } else if magnitude <= TURN_DEG {
        if degrees > 0.0 { "turn left" } else { "turn right" }
    } else {
        "turn around"
    }
}

fn plural(count: u32, word: &str) -> String {
    if count == 1 {
        format!("1 {}", word)
    } else {
        format!("{} {}s", count, word)
    }
}

/// Human-readable distance, rounded to whole meters past ten
pub fn format_distance(meters: f64) -> String {
    if meters < 10.0 {
        format!("{:.1} meters", meters)
    } else {
        format!("{:.0} meters", meters)
    }
}

/// Narration for one event
pub fn describe_event(event: &NavigationEvent) -> String {
    match event {
        NavigationEvent::StateChanged { state } => format!("Navigation {}", state),
        NavigationEvent::Approaching { waypoint_name, steps, .. } => {
            format!("Approaching {} in {}", waypoint_name, plural(*steps, "step"))
        }
        NavigationEvent::Arrived { waypoint_name, kind, .. } => match kind {
            WaypointKind::Start => "Starting route".to_string(),
            WaypointKind::Doorway => format!("Through {}", waypoint_name),
            _ => format!("Arrived at {}", waypoint_name),
        },
        NavigationEvent::DestinationReached { destination_name } => {
            format!("You have reached {}", destination_name)
        }
        NavigationEvent::DoorwayCrossing { doorway_name, from_room, to_room, .. } => {
            match (from_room, to_room) {
                (Some(from), Some(to)) => {
                    format!("Passing through {} from {} into {}", doorway_name, from.name, to.name)
                }
                (_, Some(to)) => format!("Passing through {} into {}", doorway_name, to.name),
                _ => format!("Passing through {}", doorway_name),
            }
        }
        NavigationEvent::OffRoute { .. } => "You seem to be off route".to_string(),
        NavigationEvent::Description { text, .. } => text.clone(),
    }
}

/// Description used whenever the generator fails or is absent
pub fn fallback_description(context: &DescriptionContext) -> String {
    let mut text = match &context.room_name {
        Some(room) => format!("{} in the {}", context.waypoint_name, room),
        None => context.waypoint_name.clone(),
    };
    text.push_str(&format!(
        ", {}, {}.",
        format_distance(context.distance),
        turn_instruction(context.heading_error)
    ));
    if !context.nearby_beacons.is_empty() {
        text.push_str(&format!(" Nearby: {}.", context.nearby_beacons.join(", ")));
    }
    text
}

/// Output format for progress reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Compact,
    Json,
}

/// Renders [`NavigationProgress`] for logs and the demo binary
#[derive(Debug, Clone, Copy)]
pub struct ProgressFormatter {
    pub format: OutputFormat,
}

impl Default for ProgressFormatter {
    fn default() -> Self {
        Self {
            format: OutputFormat::Compact,
        }
    }
}

impl ProgressFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self, progress: &NavigationProgress) -> Result<String, serde_json::Error> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(progress),
            OutputFormat::Compact => Ok(format!(
                "wp {} | next {:.1}m | left {:.1}m | eta {:.0}s | {}",
                progress.current_waypoint_index,
                progress.distance_to_next_waypoint,
                progress.total_distance_remaining,
                progress.estimated_time_remaining,
                turn_instruction(progress.heading_error)
            )),
            OutputFormat::Text => {
                let mut output = String::new();
                output.push_str(&format!("Waypoint:   #{}\n", progress.current_waypoint_index));
                output.push_str(&format!("Next:       {}\n", format_distance(progress.distance_to_next_waypoint)));
                output.push_str(&format!("Remaining:  {}\n", format_distance(progress.total_distance_remaining)));
                output.push_str(&format!("ETA:        {:.0} s\n", progress.estimated_time_remaining));
                output.push_str(&format!("Direction:  {}\n", turn_instruction(progress.heading_error)));
                output.push_str(&format!("Complete:   {:.0}%\n", progress.fraction_complete() * 100.0));
                Ok(output)
            }
        }
    }
}
