use drill_core::model::{PracticeSession, SessionStatus};

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn of(session: &PracticeSession) -> Self {
        let execution = session.execution();
        Self {
            total: execution.task_ids().len(),
            answered: usize::try_from(execution.completed_count()).unwrap_or(usize::MAX),
            remaining: execution.remaining(),
            is_complete: execution.status() == SessionStatus::Completed,
        }
    }
}
