//! Event hand-off for speech or UI

use crate::navigation::events::NavigationEvent;

/// Receives each emitted navigation event.
///
/// Called from the tick loop, so implementations must return immediately and
/// do any slow work elsewhere.
pub trait Narrator: Send + Sync {
    fn announce(&self, event: &NavigationEvent);
}
