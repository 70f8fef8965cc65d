mod engine;
mod plan;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use engine::{SessionEngine, SessionRequest};
pub use plan::{SessionPlan, TaskSelector};
pub use progress::SessionProgress;
