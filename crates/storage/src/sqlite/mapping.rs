use std::time::Duration;

use chrono::{DateTime, Utc};
use drill_core::model::{
    Difficulty, LearningPathId, PracticeSession, SessionConfiguration, SessionExecution,
    SessionId, SessionStatus, Task, TaskId, TopicId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn version_to_i64(v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("version overflow".into()))
}

/// Durations are stored as whole nanoseconds so they round-trip exactly.
pub(crate) fn nanos_to_i64(d: Duration) -> Result<i64, StorageError> {
    i64::try_from(d.as_nanos())
        .map_err(|_| StorageError::Serialization("total_time_spent overflow".into()))
}

/// Id lists are stored as JSON arrays of strings.
pub(crate) fn encode_ids<T: Serialize>(ids: &[T]) -> Result<String, StorageError> {
    serde_json::to_string(ids).map_err(ser)
}

fn decode_ids<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_task_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StorageError> {
    let difficulty: Difficulty = row
        .try_get::<String, _>("difficulty")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    Ok(Task {
        id: TaskId::new(row.try_get::<String, _>("id").map_err(ser)?),
        learning_path_id: LearningPathId::new(
            row.try_get::<String, _>("learning_path_id").map_err(ser)?,
        ),
        difficulty,
    })
}

pub(crate) fn map_session_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<PracticeSession, StorageError> {
    let id: SessionId = row
        .try_get::<String, _>("id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let version_i64: i64 = row.try_get("version").map_err(ser)?;
    let version = u64::try_from(version_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid version: {version_i64}")))?;

    let difficulty = row
        .try_get::<Option<String>, _>("difficulty")
        .map_err(ser)?
        .map(|d| d.parse::<Difficulty>())
        .transpose()
        .map_err(ser)?;

    let configuration = SessionConfiguration::new(
        TopicId::new(row.try_get::<String, _>("topic_id").map_err(ser)?),
        decode_ids(&row.try_get::<String, _>("learning_path_ids").map_err(ser)?)?,
        u32_from_i64(
            "target_count",
            row.try_get::<i64, _>("target_count").map_err(ser)?,
        )?,
        row.try_get::<bool, _>("include_review").map_err(ser)?,
        difficulty,
    )
    .map_err(ser)?;

    let status: SessionStatus = row
        .try_get::<String, _>("status")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let total_ns: i64 = row.try_get("total_time_spent_ns").map_err(ser)?;
    let total_ns = u64::try_from(total_ns).map_err(|_| {
        StorageError::Serialization(format!("invalid total_time_spent_ns: {total_ns}"))
    })?;
    let started_at: Option<DateTime<Utc>> = row.try_get("started_at").map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    let execution = SessionExecution::from_persisted(
        decode_ids(&row.try_get::<String, _>("task_ids").map_err(ser)?)?,
        u32_from_i64(
            "completed_count",
            row.try_get::<i64, _>("completed_count").map_err(ser)?,
        )?,
        u32_from_i64(
            "correct_count",
            row.try_get::<i64, _>("correct_count").map_err(ser)?,
        )?,
        status,
        Duration::from_nanos(total_ns),
        started_at,
        completed_at,
    )
    .map_err(ser)?;

    Ok(PracticeSession::new(id, version, configuration, execution))
}
