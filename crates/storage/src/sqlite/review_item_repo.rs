use chrono::{DateTime, Utc};
use drill_core::model::{ReviewSchedule, SpacedRepetitionItem, TaskId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{SpacedRepetitionRepository, StorageError};

impl SqliteRepository {
    /// Insert a review item or move an existing one to a new schedule.
    ///
    /// Rescheduling keeps the item's original position in store order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the write fails.
    pub async fn upsert_review_item(&self, item: &SpacedRepetitionItem) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO review_items (task_id, next_review, position)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM review_items))
            ON CONFLICT(task_id) DO UPDATE SET
                next_review = excluded.next_review
            ",
        )
        .bind(item.task_id.as_str().to_owned())
        .bind(item.schedule.next_review)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SpacedRepetitionRepository for SqliteRepository {
    async fn get_due(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<SpacedRepetitionItem>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT task_id, next_review
            FROM review_items
            WHERE julianday(next_review) <= julianday(?1)
            ORDER BY position ASC
            ",
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let task_id: String = row.try_get("task_id").map_err(ser)?;
            let next_review: DateTime<Utc> = row.try_get("next_review").map_err(ser)?;
            items.push(SpacedRepetitionItem {
                task_id: TaskId::new(task_id),
                schedule: ReviewSchedule { next_review },
            });
        }
        Ok(items)
    }
}
