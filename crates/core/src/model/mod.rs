mod ids;
mod review;
mod session;
mod task;

pub use ids::{LearningPathId, ParseIdError, SessionId, TaskId, TopicId};
pub use review::{ReviewSchedule, SpacedRepetitionItem};
pub use session::{
    InvalidPersistedSession, PracticeSession, SessionAction, SessionConfigError,
    SessionConfiguration, SessionDraft, SessionExecution, SessionResults, SessionStatus,
    TransitionError,
};
pub use task::{Difficulty, DifficultyParseError, Task};
