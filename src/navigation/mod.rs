//! Route following: state machine, events, narration text and the session loop

pub mod doorway;
pub mod engine;
pub mod events;
pub mod guidance;
pub mod session;
pub mod state;

pub use engine::{NavigationProgressEngine, TickStatus};
pub use events::NavigationEvent;
pub use guidance::{OutputFormat, ProgressFormatter};
pub use session::{NavigationSession, SessionCommand, SessionHandle};
pub use state::{NavigationProgress, NavigationState};
