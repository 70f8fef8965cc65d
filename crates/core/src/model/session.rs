use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::model::ids::{LearningPathId, SessionId, TaskId, TopicId};
use crate::model::task::Difficulty;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejected session configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionConfigError {
    #[error("a session needs at least one learning path")]
    EmptyLearningPaths,

    #[error("target count must be > 0")]
    InvalidTargetCount,
}

/// A lifecycle operation that is not legal for the session's current state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} a session that is {status}")]
    Illegal {
        action: SessionAction,
        status: SessionStatus,
    },

    #[error("all {total} tasks in the session have already been answered")]
    NoRemainingTasks { total: usize },
}

/// Stored execution state that breaks a session invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid persisted session: {0}")]
pub struct InvalidPersistedSession(pub String);

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of a practice session.
///
/// `Planned → Active ⇄ Paused`, then `Completed` or `Abandoned`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Planned,
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = InvalidPersistedSession;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(SessionStatus::Planned),
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(InvalidPersistedSession(format!("unknown status {other:?}"))),
        }
    }
}

/// Operations that move a session through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    RecordAnswer,
    Pause,
    Resume,
    Complete,
    Abandon,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            SessionAction::Start => "start",
            SessionAction::RecordAnswer => "record an answer on",
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Complete => "complete",
            SessionAction::Abandon => "abandon",
        };
        f.write_str(verb)
    }
}

//
// ─── CONFIGURATION ─────────────────────────────────────────────────────────────
//

/// What a session was built for. Immutable once the session exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfiguration {
    topic_id: TopicId,
    learning_path_ids: Vec<LearningPathId>,
    target_count: u32,
    include_review: bool,
    difficulty: Option<Difficulty>,
}

impl SessionConfiguration {
    /// Validate and build a configuration.
    ///
    /// Duplicate learning paths are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns `SessionConfigError` if no learning path is given or
    /// `target_count` is zero.
    pub fn new(
        topic_id: TopicId,
        learning_path_ids: Vec<LearningPathId>,
        target_count: u32,
        include_review: bool,
        difficulty: Option<Difficulty>,
    ) -> Result<Self, SessionConfigError> {
        if target_count == 0 {
            return Err(SessionConfigError::InvalidTargetCount);
        }

        let mut paths: Vec<LearningPathId> = Vec::with_capacity(learning_path_ids.len());
        for path in learning_path_ids {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(SessionConfigError::EmptyLearningPaths);
        }

        Ok(Self {
            topic_id,
            learning_path_ids: paths,
            target_count,
            include_review,
            difficulty,
        })
    }

    #[must_use]
    pub fn topic_id(&self) -> &TopicId {
        &self.topic_id
    }

    #[must_use]
    pub fn learning_path_ids(&self) -> &[LearningPathId] {
        &self.learning_path_ids
    }

    #[must_use]
    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    #[must_use]
    pub fn include_review(&self) -> bool {
        self.include_review
    }

    #[must_use]
    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }
}

//
// ─── EXECUTION ─────────────────────────────────────────────────────────────────
//

/// Mutable half of a session: the task list, counters and lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionExecution {
    task_ids: Vec<TaskId>,
    completed_count: u32,
    correct_count: u32,
    status: SessionStatus,
    total_time_spent: Duration,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionExecution {
    /// Fresh execution state for a newly planned session.
    #[must_use]
    pub fn planned(task_ids: Vec<TaskId>) -> Self {
        Self {
            task_ids,
            completed_count: 0,
            correct_count: 0,
            status: SessionStatus::Planned,
            total_time_spent: Duration::ZERO,
            started_at: None,
            completed_at: None,
        }
    }

    /// Rehydrate execution state from storage, checking the session invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPersistedSession` if counters or timestamps are inconsistent
    /// with each other or with `status`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        task_ids: Vec<TaskId>,
        completed_count: u32,
        correct_count: u32,
        status: SessionStatus,
        total_time_spent: Duration,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, InvalidPersistedSession> {
        if usize::try_from(completed_count).unwrap_or(usize::MAX) > task_ids.len() {
            return Err(InvalidPersistedSession(format!(
                "completed count {completed_count} exceeds {} tasks",
                task_ids.len()
            )));
        }
        if correct_count > completed_count {
            return Err(InvalidPersistedSession(format!(
                "correct count {correct_count} exceeds completed count {completed_count}"
            )));
        }
        let has_started = status != SessionStatus::Planned;
        if has_started != started_at.is_some() {
            return Err(InvalidPersistedSession(format!(
                "started_at does not match status {status}"
            )));
        }
        if (status == SessionStatus::Completed) != completed_at.is_some() {
            return Err(InvalidPersistedSession(format!(
                "completed_at does not match status {status}"
            )));
        }

        Ok(Self {
            task_ids,
            completed_count,
            correct_count,
            status,
            total_time_spent,
            started_at,
            completed_at,
        })
    }

    #[must_use]
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    #[must_use]
    pub fn completed_count(&self) -> u32 {
        self.completed_count
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn total_time_spent(&self) -> Duration {
        self.total_time_spent
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Number of tasks not yet answered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let done = usize::try_from(self.completed_count).unwrap_or(usize::MAX);
        self.task_ids.len().saturating_sub(done)
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// Explicitly start a planned session.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Illegal` unless the session is `Planned`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(SessionAction::Start, &[SessionStatus::Planned])?;
        self.activate(now);
        Ok(())
    }

    /// Record one answer, auto-starting and auto-completing as needed.
    ///
    /// A `Planned` or `Paused` session becomes `Active` first; `started_at` is
    /// only written the first time. Once `completed_count` reaches
    /// `target_count` the session is `Completed` with `completed_at = now`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Illegal` for `Completed`/`Abandoned` sessions and
    /// `TransitionError::NoRemainingTasks` if every task has been answered.
    /// Counters are left untouched on error.
    pub fn record_answer(
        &mut self,
        correct: bool,
        time_spent: Duration,
        target_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.require(
            SessionAction::RecordAnswer,
            &[
                SessionStatus::Planned,
                SessionStatus::Active,
                SessionStatus::Paused,
            ],
        )?;
        if self.remaining() == 0 {
            return Err(TransitionError::NoRemainingTasks {
                total: self.task_ids.len(),
            });
        }

        if self.status != SessionStatus::Active {
            self.activate(now);
        }

        self.completed_count = self.completed_count.saturating_add(1);
        if correct {
            self.correct_count = self.correct_count.saturating_add(1);
        }
        self.total_time_spent = self.total_time_spent.saturating_add(time_spent);

        if self.completed_count >= target_count {
            self.finish(now);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TransitionError::Illegal` unless the session is `Active`.
    pub fn pause(&mut self) -> Result<(), TransitionError> {
        self.require(SessionAction::Pause, &[SessionStatus::Active])?;
        self.status = SessionStatus::Paused;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TransitionError::Illegal` unless the session is `Paused`.
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        self.require(SessionAction::Resume, &[SessionStatus::Paused])?;
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Manually complete, whether or not the target was reached.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Illegal` unless the session is `Active` or `Paused`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(
            SessionAction::Complete,
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        self.finish(now);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TransitionError::Illegal` unless the session is `Active` or `Paused`.
    pub fn abandon(&mut self) -> Result<(), TransitionError> {
        self.require(
            SessionAction::Abandon,
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        self.status = SessionStatus::Abandoned;
        Ok(())
    }

    fn require(
        &self,
        action: SessionAction,
        allowed: &[SessionStatus],
    ) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError::Illegal {
                action,
                status: self.status,
            })
        }
    }

    fn activate(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Active;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(now);
    }
}

//
// ─── DRAFT / SESSION ───────────────────────────────────────────────────────────
//

/// A session that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub configuration: SessionConfiguration,
    pub execution: SessionExecution,
}

impl SessionDraft {
    #[must_use]
    pub fn planned(configuration: SessionConfiguration, task_ids: Vec<TaskId>) -> Self {
        Self {
            configuration,
            execution: SessionExecution::planned(task_ids),
        }
    }

    /// Attach the store-assigned id; the first persisted version is 0.
    #[must_use]
    pub fn assign_id(self, id: SessionId) -> PracticeSession {
        PracticeSession::new(id, 0, self.configuration, self.execution)
    }
}

/// Derived statistics, recomputed on every read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionResults {
    pub accuracy: f64,
    pub average_time: Duration,
}

/// A persisted practice session.
///
/// `version` is bumped by the store on every update and is used as an
/// optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PracticeSession {
    id: SessionId,
    version: u64,
    configuration: SessionConfiguration,
    execution: SessionExecution,
}

impl PracticeSession {
    #[must_use]
    pub fn new(
        id: SessionId,
        version: u64,
        configuration: SessionConfiguration,
        execution: SessionExecution,
    ) -> Self {
        Self {
            id,
            version,
            configuration,
            execution,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn configuration(&self) -> &SessionConfiguration {
        &self.configuration
    }

    #[must_use]
    pub fn execution(&self) -> &SessionExecution {
        &self.execution
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.execution.status
    }

    /// Accuracy and average time per answer; both zero before the first answer.
    #[must_use]
    pub fn results(&self) -> SessionResults {
        let completed = self.execution.completed_count;
        if completed == 0 {
            return SessionResults {
                accuracy: 0.0,
                average_time: Duration::ZERO,
            };
        }
        SessionResults {
            accuracy: f64::from(self.execution.correct_count) / f64::from(completed),
            average_time: self.execution.total_time_spent / completed,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
