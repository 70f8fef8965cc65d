use chrono::{DateTime, Utc};
use drill_core::model::{PracticeSession, SessionDraft, SessionId};

use super::SqliteRepository;
use super::mapping::{conn, encode_ids, map_session_row, nanos_to_i64, version_to_i64};
use crate::repository::{SessionPatch, SessionRepository, StorageError};

/// Column values for one `practice_sessions` row, minus the id.
struct SessionColumns {
    version: i64,
    topic_id: String,
    learning_path_ids: String,
    target_count: i64,
    include_review: bool,
    difficulty: Option<&'static str>,
    task_ids: String,
    completed_count: i64,
    correct_count: i64,
    status: &'static str,
    total_time_spent_ns: i64,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionColumns {
    fn from_session(session: &PracticeSession) -> Result<Self, StorageError> {
        let cfg = session.configuration();
        let exec = session.execution();
        Ok(Self {
            version: version_to_i64(session.version())?,
            topic_id: cfg.topic_id().as_str().to_owned(),
            learning_path_ids: encode_ids(cfg.learning_path_ids())?,
            target_count: i64::from(cfg.target_count()),
            include_review: cfg.include_review(),
            difficulty: cfg.difficulty().map(|d| d.as_str()),
            task_ids: encode_ids(exec.task_ids())?,
            completed_count: i64::from(exec.completed_count()),
            correct_count: i64::from(exec.correct_count()),
            status: exec.status().as_str(),
            total_time_spent_ns: nanos_to_i64(exec.total_time_spent())?,
            started_at: exec.started_at(),
            completed_at: exec.completed_at(),
        })
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, draft: SessionDraft) -> Result<PracticeSession, StorageError> {
        let session = draft.assign_id(SessionId::random());
        let cols = SessionColumns::from_session(&session)?;

        sqlx::query(
            r"
            INSERT INTO practice_sessions (
                id, version, topic_id, learning_path_ids, target_count, include_review,
                difficulty, task_ids, completed_count, correct_count, status,
                total_time_spent_ns, started_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ",
        )
        .bind(session.id().to_string())
        .bind(cols.version)
        .bind(cols.topic_id)
        .bind(cols.learning_path_ids)
        .bind(cols.target_count)
        .bind(cols.include_review)
        .bind(cols.difficulty)
        .bind(cols.task_ids)
        .bind(cols.completed_count)
        .bind(cols.correct_count)
        .bind(cols.status)
        .bind(cols.total_time_spent_ns)
        .bind(cols.started_at)
        .bind(cols.completed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, version, topic_id, learning_path_ids, target_count, include_review,
                difficulty, task_ids, completed_count, correct_count, status,
                total_time_spent_ns, started_at, completed_at
            FROM practice_sessions
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<PracticeSession, StorageError> {
        let current = self
            .get_session(id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let next = patch.apply(&current)?;
        let cols = SessionColumns::from_session(&next)?;

        // The version guard makes the write a compare-and-swap against `current`.
        let res = sqlx::query(
            r"
            UPDATE practice_sessions SET
                version = ?1,
                topic_id = ?2,
                learning_path_ids = ?3,
                target_count = ?4,
                include_review = ?5,
                difficulty = ?6,
                task_ids = ?7,
                completed_count = ?8,
                correct_count = ?9,
                status = ?10,
                total_time_spent_ns = ?11,
                started_at = ?12,
                completed_at = ?13
            WHERE id = ?14 AND version = ?15
            ",
        )
        .bind(cols.version)
        .bind(cols.topic_id)
        .bind(cols.learning_path_ids)
        .bind(cols.target_count)
        .bind(cols.include_review)
        .bind(cols.difficulty)
        .bind(cols.task_ids)
        .bind(cols.completed_count)
        .bind(cols.correct_count)
        .bind(cols.status)
        .bind(cols.total_time_spent_ns)
        .bind(cols.started_at)
        .bind(cols.completed_at)
        .bind(id.to_string())
        .bind(version_to_i64(current.version())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(next)
    }
}
