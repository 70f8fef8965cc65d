//! Retry/timeout decorator for the repository contracts.
//!
//! `RetryingRepository` implements the same traits as the store it wraps.
//! Every call is raced against `call_timeout`; idempotent reads are retried on
//! transient failures with exponential backoff plus jitter. Writes are never
//! retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drill_core::model::{
    PracticeSession, SessionDraft, SessionId, SpacedRepetitionItem, Task, TaskId,
};
use rand::Rng;

use crate::repository::{
    SessionPatch, SessionRepository, SpacedRepetitionRepository, StorageError, TaskQuery,
    TaskRepository,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, timeout only.
    #[must_use]
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
            call_timeout,
        }
    }

    async fn with_timeout<T, Fut>(&self, fut: Fut) -> Result<T, StorageError>
    where
        Fut: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StorageError::Timeout(self.call_timeout)),
        }
    }

    /// Run an idempotent read, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-transient error.
    pub async fn run_read<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempts_left = self.max_attempts.max(1);
        let mut backoff = self.base_backoff;

        loop {
            match self.with_timeout(f()).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempts_left = attempts_left.saturating_sub(1);
                    if attempts_left == 0 || !e.is_transient() {
                        return Err(e);
                    }

                    let wait = backoff + jitter(self.jitter_max);
                    tracing::warn!(op, error = %e, attempts_left, ?wait, "retrying store read");
                    tokio::time::sleep(wait).await;

                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }

    /// Run a write once, bounded by the call timeout.
    ///
    /// # Errors
    ///
    /// Returns the store error or `StorageError::Timeout`.
    pub async fn run_write<T, Fut>(&self, fut: Fut) -> Result<T, StorageError>
    where
        Fut: Future<Output = Result<T, StorageError>>,
    {
        self.with_timeout(fut).await
    }
}

// Kept out of async code so the thread-local RNG never lives across an await.
fn jitter(max: Option<Duration>) -> Duration {
    let Some(max) = max else {
        return Duration::ZERO;
    };
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

//
// ─── DECORATOR ─────────────────────────────────────────────────────────────────
//

/// Wraps any repository with a `RetryPolicy`.
pub struct RetryingRepository<R: ?Sized> {
    inner: Arc<R>,
    policy: RetryPolicy,
}

impl<R: ?Sized> RetryingRepository<R> {
    #[must_use]
    pub fn new(inner: Arc<R>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<R: ?Sized> Clone for RetryingRepository<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy.clone(),
        }
    }
}

#[async_trait]
impl<R: SessionRepository + ?Sized> SessionRepository for RetryingRepository<R> {
    async fn create_session(&self, draft: SessionDraft) -> Result<PracticeSession, StorageError> {
        self.policy
            .run_write(self.inner.create_session(draft))
            .await
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError> {
        self.policy
            .run_read("get_session", || self.inner.get_session(id))
            .await
    }

    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<PracticeSession, StorageError> {
        self.policy
            .run_write(self.inner.update_session(id, patch))
            .await
    }
}

#[async_trait]
impl<R: TaskRepository + ?Sized> TaskRepository for RetryingRepository<R> {
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        self.policy
            .run_read("get_task", || self.inner.get_task(id))
            .await
    }

    async fn get_tasks(&self, ids: &[TaskId]) -> Result<Vec<Task>, StorageError> {
        self.policy
            .run_read("get_tasks", || self.inner.get_tasks(ids))
            .await
    }

    async fn get_random_tasks(
        &self,
        count: usize,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, StorageError> {
        self.policy
            .run_read("get_random_tasks", || {
                self.inner.get_random_tasks(count, query)
            })
            .await
    }
}

#[async_trait]
impl<R: SpacedRepetitionRepository + ?Sized> SpacedRepetitionRepository
    for RetryingRepository<R>
{
    async fn get_due(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<SpacedRepetitionItem>, StorageError> {
        self.policy
            .run_read("get_due", || self.inner.get_due(before))
            .await
    }
}
