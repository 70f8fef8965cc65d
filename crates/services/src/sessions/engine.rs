use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use drill_core::model::{
    Difficulty, LearningPathId, PracticeSession, SessionConfiguration, SessionDraft,
    SessionExecution, SessionId, TopicId, TransitionError,
};
use storage::repository::{
    SessionPatch, SessionRepository, SpacedRepetitionRepository, TaskRepository,
};

use super::plan::TaskSelector;
use super::progress::SessionProgress;
use crate::Clock;
use crate::error::SessionError;

//
// ─── REQUEST ───────────────────────────────────────────────────────────────────
//

/// What a caller asks for when building a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub topic_id: TopicId,
    pub learning_path_ids: Vec<LearningPathId>,
    pub target_count: u32,
    pub include_review: bool,
    pub difficulty: Option<Difficulty>,
}

impl SessionRequest {
    #[must_use]
    pub fn new(
        topic_id: impl Into<String>,
        learning_path_ids: impl IntoIterator<Item = impl Into<String>>,
        target_count: u32,
    ) -> Self {
        Self {
            topic_id: TopicId::new(topic_id),
            learning_path_ids: learning_path_ids
                .into_iter()
                .map(LearningPathId::new)
                .collect(),
            target_count,
            include_review: true,
            difficulty: None,
        }
    }

    #[must_use]
    pub fn with_review(mut self, include_review: bool) -> Self {
        self.include_review = include_review;
        self
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Orchestrates session creation and lifecycle transitions.
///
/// Holds no per-session state. Every mutating call loads the session, applies
/// one transition and writes it back guarded by the loaded `version`, so a
/// concurrent writer surfaces as `StorageError::Conflict`.
#[derive(Clone)]
pub struct SessionEngine {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    selector: TaskSelector,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        tasks: Arc<dyn TaskRepository>,
        reviews: Arc<dyn SpacedRepetitionRepository>,
    ) -> Self {
        Self {
            clock,
            sessions,
            selector: TaskSelector::new(tasks, reviews),
        }
    }

    #[must_use]
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.selector = self.selector.with_deterministic(deterministic);
        self
    }

    /// Select tasks for `request` and persist a planned session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRequest` for an empty path list or a zero
    /// target, and `SessionError::Storage` for store failures.
    #[tracing::instrument(skip_all, fields(topic = %request.topic_id, target = request.target_count))]
    pub async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PracticeSession, SessionError> {
        let configuration = SessionConfiguration::new(
            request.topic_id,
            request.learning_path_ids,
            request.target_count,
            request.include_review,
            request.difficulty,
        )?;

        let plan = self.selector.select(&configuration, self.clock.now()).await?;
        if plan.is_empty() {
            warn!("no tasks match the session paths");
        }
        let total = plan.total();
        let session = self
            .sessions
            .create_session(SessionDraft::planned(configuration, plan.task_ids))
            .await?;

        info!(
            session_id = %session.id(),
            total,
            review = plan.review_selected,
            fresh = plan.fresh_selected,
            "session created"
        );
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the id is unknown.
    pub async fn get_session(&self, id: SessionId) -> Result<PracticeSession, SessionError> {
        self.sessions
            .get_session(id)
            .await?
            .ok_or(SessionError::NotFound(id))
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the id is unknown.
    pub async fn progress(&self, id: SessionId) -> Result<SessionProgress, SessionError> {
        let session = self.get_session(id).await?;
        Ok(SessionProgress::of(&session))
    }

    /// Record one answer, starting and completing the session as needed.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotFound` if the id is unknown.
    /// - `SessionError::InvalidState` for completed or abandoned sessions.
    /// - `SessionError::NoRemainingTasks` once every task has been answered.
    /// - `SessionError::Storage` for store failures, including version conflicts.
    #[tracing::instrument(skip_all, fields(session_id = %id, correct = correct))]
    pub async fn record_answer(
        &self,
        id: SessionId,
        correct: bool,
        time_spent: Duration,
    ) -> Result<PracticeSession, SessionError> {
        let session = self
            .transition(id, |execution, configuration, now| {
                execution.record_answer(correct, time_spent, configuration.target_count(), now)
            })
            .await?;

        let execution = session.execution();
        debug!(
            completed = execution.completed_count(),
            correct = execution.correct_count(),
            status = %execution.status(),
            "answer recorded"
        );
        if execution.status().is_terminal() {
            info!("session completed");
        }
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is planned.
    #[tracing::instrument(skip_all, fields(session_id = %id))]
    pub async fn start_session(&self, id: SessionId) -> Result<PracticeSession, SessionError> {
        let session = self
            .transition(id, |execution, _, now| execution.start(now))
            .await?;
        info!("session started");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is active.
    #[tracing::instrument(skip_all, fields(session_id = %id))]
    pub async fn pause_session(&self, id: SessionId) -> Result<PracticeSession, SessionError> {
        let session = self
            .transition(id, |execution, _, _| execution.pause())
            .await?;
        info!("session paused");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is paused.
    #[tracing::instrument(skip_all, fields(session_id = %id))]
    pub async fn resume_session(&self, id: SessionId) -> Result<PracticeSession, SessionError> {
        let session = self
            .transition(id, |execution, _, _| execution.resume())
            .await?;
        info!("session resumed");
        Ok(session)
    }

    /// Complete the session now, whether or not the target was reached.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is active or paused.
    #[tracing::instrument(skip_all, fields(session_id = %id))]
    pub async fn complete_session(&self, id: SessionId) -> Result<PracticeSession, SessionError> {
        let session = self
            .transition(id, |execution, _, now| execution.complete(now))
            .await?;
        info!("session completed");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is active or paused.
    #[tracing::instrument(skip_all, fields(session_id = %id))]
    pub async fn abandon_session(&self, id: SessionId) -> Result<PracticeSession, SessionError> {
        let session = self
            .transition(id, |execution, _, _| execution.abandon())
            .await?;
        info!("session abandoned");
        Ok(session)
    }

    async fn transition<F>(&self, id: SessionId, apply: F) -> Result<PracticeSession, SessionError>
    where
        F: FnOnce(
                &mut SessionExecution,
                &SessionConfiguration,
                DateTime<Utc>,
            ) -> Result<(), TransitionError>
            + Send,
    {
        let current = self.get_session(id).await?;
        let mut execution = current.execution().clone();
        apply(&mut execution, current.configuration(), self.clock.now())
            .map_err(|err| SessionError::from_transition(id, err))?;

        let patch = SessionPatch::execution(execution).expecting_version(current.version());
        Ok(self.sessions.update_session(id, patch).await?)
    }
}
