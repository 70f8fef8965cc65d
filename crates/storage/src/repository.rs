use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drill_core::model::{
    Difficulty, LearningPathId, PracticeSession, SessionConfiguration, SessionDraft,
    SessionExecution, SessionId, SpacedRepetitionItem, Task, TaskId,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::sampling::sample_tasks;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    /// A broken invariant inside the adapter, such as a poisoned lock.
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Maps a poisoned lock to a non-transient error.
pub(crate) fn poisoned<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

impl StorageError {
    /// Transient failures may succeed on a later attempt; everything else is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connection(_) | StorageError::Timeout(_))
    }
}

//
// ─── SESSION PATCH ─────────────────────────────────────────────────────────────
//

/// Shallow update for a stored session.
///
/// `None` fields are left as they are. When `expected_version` is set the
/// update only applies if the stored version still matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub configuration: Option<SessionConfiguration>,
    pub execution: Option<SessionExecution>,
    pub expected_version: Option<u64>,
}

impl SessionPatch {
    #[must_use]
    pub fn execution(execution: SessionExecution) -> Self {
        Self {
            execution: Some(execution),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Merge this patch into `current`, producing the next version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if `expected_version` does not match.
    pub fn apply(self, current: &PracticeSession) -> Result<PracticeSession, StorageError> {
        if self
            .expected_version
            .is_some_and(|expected| expected != current.version())
        {
            return Err(StorageError::Conflict);
        }

        Ok(PracticeSession::new(
            current.id(),
            current.version() + 1,
            self.configuration
                .unwrap_or_else(|| current.configuration().clone()),
            self.execution.unwrap_or_else(|| current.execution().clone()),
        ))
    }
}

//
// ─── TASK QUERY ────────────────────────────────────────────────────────────────
//

/// Filters for `TaskRepository::get_random_tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    /// Restrict to these learning paths. `Some(vec![])` matches nothing.
    pub learning_path_ids: Option<Vec<LearningPathId>>,
    pub difficulty: Option<Difficulty>,
    pub exclude_ids: HashSet<TaskId>,
    /// Order by id instead of shuffling.
    pub deterministic: bool,
}

impl TaskQuery {
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let path_ok = self
            .learning_path_ids
            .as_ref()
            .is_none_or(|paths| task.belongs_to_any(paths));
        let difficulty_ok = self.difficulty.is_none_or(|d| task.difficulty == d);
        path_ok && difficulty_ok && !self.exclude_ids.contains(&task.id)
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Persistence for practice sessions. No business rules live here.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session and assign its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn create_session(&self, draft: SessionDraft) -> Result<PracticeSession, StorageError>;

    /// Fetch a session by ID, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError>;

    /// Apply a patch atomically for this one record and return the new state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing and
    /// `StorageError::Conflict` if the expected version is stale.
    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<PracticeSession, StorageError>;
}

/// Read access to the task catalogue.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError>;

    /// Fetch several tasks; unknown ids are skipped and input order is kept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_tasks(&self, ids: &[TaskId]) -> Result<Vec<Task>, StorageError>;

    /// Pick `count` tasks matching `query`.
    ///
    /// When fewer distinct tasks match than requested, matches are repeated
    /// round-robin to fill the count. No matches yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_random_tasks(
        &self,
        count: usize,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, StorageError>;
}

/// Read access to spaced-repetition schedules.
#[async_trait]
pub trait SpacedRepetitionRepository: Send + Sync {
    /// Items whose next review is at or before `before`, in store order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_due(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<SpacedRepetitionItem>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<SessionId, PracticeSession>>>,
    tasks: Arc<Mutex<BTreeMap<TaskId, Task>>>,
    review_items: Arc<Mutex<Vec<SpacedRepetitionItem>>>,
    rng: Arc<Mutex<StdRng>>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    /// Repository whose random selection is seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Repository whose random selection is reproducible for a given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            review_items: Arc::new(Mutex::new(Vec::new())),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Insert or replace a task.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Internal` if the lock is poisoned.
    pub fn insert_task(&self, task: Task) -> Result<(), StorageError> {
        let mut guard = self
            .tasks
            .lock()
            .map_err(poisoned)?;
        guard.insert(task.id.clone(), task);
        Ok(())
    }

    /// Append a review item, replacing any earlier schedule for the same task
    /// in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Internal` if the lock is poisoned.
    pub fn insert_review_item(&self, item: SpacedRepetitionItem) -> Result<(), StorageError> {
        let mut guard = self
            .review_items
            .lock()
            .map_err(poisoned)?;
        match guard.iter_mut().find(|existing| existing.task_id == item.task_id) {
            Some(existing) => *existing = item,
            None => guard.push(item),
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, draft: SessionDraft) -> Result<PracticeSession, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(poisoned)?;
        let mut id = SessionId::random();
        while guard.contains_key(&id) {
            id = SessionId::random();
        }
        let session = draft.assign_id(id);
        guard.insert(id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<PracticeSession, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(poisoned)?;
        let current = guard.get(&id).ok_or(StorageError::NotFound)?;
        let next = patch.apply(current)?;
        guard.insert(id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl TaskRepository for InMemoryRepository {
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let guard = self
            .tasks
            .lock()
            .map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    async fn get_tasks(&self, ids: &[TaskId]) -> Result<Vec<Task>, StorageError> {
        let guard = self
            .tasks
            .lock()
            .map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn get_random_tasks(
        &self,
        count: usize,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, StorageError> {
        let candidates: Vec<Task> = {
            let guard = self
                .tasks
                .lock()
                .map_err(poisoned)?;
            guard.values().filter(|t| query.matches(t)).cloned().collect()
        };
        let mut rng = self
            .rng
            .lock()
            .map_err(poisoned)?;
        Ok(sample_tasks(candidates, count, query.deterministic, &mut *rng))
    }
}

#[async_trait]
impl SpacedRepetitionRepository for InMemoryRepository {
    async fn get_due(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<SpacedRepetitionItem>, StorageError> {
        let guard = self
            .review_items
            .lock()
            .map_err(poisoned)?;
        Ok(guard.iter().filter(|i| i.is_due(before)).cloned().collect())
    }
}

//
// ─── STORAGE ───────────────────────────────────────────────────────────────────
//

/// Aggregates the three stores behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub reviews: Arc<dyn SpacedRepetitionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Share one backend that implements all three contracts.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: SessionRepository + TaskRepository + SpacedRepetitionRepository + Clone + 'static,
    {
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let tasks: Arc<dyn TaskRepository> = Arc::new(repo.clone());
        let reviews: Arc<dyn SpacedRepetitionRepository> = Arc::new(repo);
        Self {
            sessions,
            tasks,
            reviews,
        }
    }
}
