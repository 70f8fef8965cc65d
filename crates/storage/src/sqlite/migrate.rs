use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates tasks, review items and practice sessions.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    learning_path_id TEXT NOT NULL,
                    difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'hard'))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // `position` preserves insertion order, which is the store order for due items.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS review_items (
                    task_id TEXT PRIMARY KEY,
                    next_review TEXT NOT NULL,
                    position INTEGER NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_sessions (
                    id TEXT PRIMARY KEY,
                    version INTEGER NOT NULL CHECK (version >= 0),
                    topic_id TEXT NOT NULL,
                    learning_path_ids TEXT NOT NULL,
                    target_count INTEGER NOT NULL CHECK (target_count > 0),
                    include_review INTEGER NOT NULL,
                    difficulty TEXT,
                    task_ids TEXT NOT NULL,
                    completed_count INTEGER NOT NULL CHECK (completed_count >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    status TEXT NOT NULL,
                    total_time_spent_ns INTEGER NOT NULL CHECK (total_time_spent_ns >= 0),
                    started_at TEXT,
                    completed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_tasks_path_difficulty
                    ON tasks (learning_path_id, difficulty, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_review_items_next_review
                    ON review_items (next_review, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
