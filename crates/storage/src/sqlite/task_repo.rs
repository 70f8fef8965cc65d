use std::collections::HashMap;

use drill_core::model::{Task, TaskId};

use super::SqliteRepository;
use super::mapping::{conn, map_task_row};
use crate::repository::{StorageError, TaskQuery, TaskRepository, poisoned};
use crate::sampling::sample_tasks;

/// Appends `?start, ?start+1, …` placeholders for `n` values.
fn push_placeholders(sql: &mut String, start: usize, n: usize) {
    for i in 0..n {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        sql.push_str(&(start + i).to_string());
    }
}

impl SqliteRepository {
    /// Insert or replace a task.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the write fails.
    pub async fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO tasks (id, learning_path_id, difficulty)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                learning_path_id = excluded.learning_path_id,
                difficulty = excluded.difficulty
            ",
        )
        .bind(task.id.as_str().to_owned())
        .bind(task.learning_path_id.as_str().to_owned())
        .bind(task.difficulty.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskRepository for SqliteRepository {
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, learning_path_id, difficulty
            FROM tasks
            WHERE id = ?1
            ",
        )
        .bind(id.as_str().to_owned())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_task_row).transpose()
    }

    async fn get_tasks(&self, ids: &[TaskId]) -> Result<Vec<Task>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from("SELECT id, learning_path_id, difficulty FROM tasks WHERE id IN (");
        push_placeholders(&mut sql, 1, ids.len());
        sql.push(')');

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id.as_str().to_owned());
        }
        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut by_id: HashMap<TaskId, Task> = HashMap::with_capacity(rows.len());
        for row in rows {
            let task = map_task_row(&row)?;
            by_id.insert(task.id.clone(), task);
        }

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn get_random_tasks(
        &self,
        count: usize,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, StorageError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if query
            .learning_path_ids
            .as_ref()
            .is_some_and(|paths| paths.is_empty())
        {
            return Ok(Vec::new());
        }

        let mut sql = String::from("SELECT id, learning_path_id, difficulty FROM tasks WHERE 1 = 1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(paths) = &query.learning_path_ids {
            sql.push_str(" AND learning_path_id IN (");
            push_placeholders(&mut sql, binds.len() + 1, paths.len());
            sql.push(')');
            binds.extend(paths.iter().map(|p| p.as_str().to_owned()));
        }
        if let Some(difficulty) = query.difficulty {
            sql.push_str(" AND difficulty = ?");
            sql.push_str(&(binds.len() + 1).to_string());
            binds.push(difficulty.as_str().to_owned());
        }
        if !query.exclude_ids.is_empty() {
            sql.push_str(" AND id NOT IN (");
            push_placeholders(&mut sql, binds.len() + 1, query.exclude_ids.len());
            sql.push(')');
            binds.extend(query.exclude_ids.iter().map(|id| id.as_str().to_owned()));
        }
        sql.push_str(" ORDER BY id");

        let mut q = sqlx::query(&sql);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            candidates.push(map_task_row(&row)?);
        }

        let mut rng = self.rng.lock().map_err(poisoned)?;
        Ok(sample_tasks(candidates, count, query.deterministic, &mut *rng))
    }
}
