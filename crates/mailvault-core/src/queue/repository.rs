//! Offline mutation queue.
//!
//! A FIFO of provider mutations made while disconnected, replayed by the sync
//! layer once connectivity returns. Failed replays stay queued with an
//! attempt count and last error; only explicit removal or staleness drops
//! them.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::model::{ActionType, QueuedAction};
use crate::emails::timestamp;
use crate::Result;

const QUEUE_COLUMNS: &str = "id, type, resource_id, payload, created_at, attempts, last_error";

/// FIFO queue of offline mutations in one account store.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
}

impl OfflineQueue {
    /// Creates the queue table and index.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS offline_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                payload TEXT,
                created_at INTEGER NOT NULL,
                attempts INTEGER DEFAULT 0,
                last_error TEXT
            )
            ",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_offline_queue_created ON offline_queue(created_at)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Appends an action with a JSON-encoded payload. Attempts start at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the insert
    /// fails.
    pub async fn enqueue<P: Serialize>(
        &self,
        action_type: ActionType,
        resource_id: &str,
        payload: &P,
    ) -> Result<i64> {
        let payload_json = serde_json::to_string(payload)?;
        let result = sqlx::query(
            "INSERT INTO offline_queue (type, resource_id, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(action_type.as_str())
        .bind(resource_id)
        .bind(payload_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!(
            "Queued {} for resource {resource_id}",
            action_type.as_str()
        );
        Ok(result.last_insert_rowid())
    }

    /// Returns the oldest action without removing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is
    /// malformed.
    pub async fn peek(&self) -> Result<Option<QueuedAction>> {
        let row = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM offline_queue ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(read_action).transpose()
    }

    /// Removes and returns the oldest action. Read and delete happen in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails or a stored row is
    /// malformed.
    pub async fn dequeue(&self) -> Result<Option<QueuedAction>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM offline_queue ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let action = read_action(&row)?;

        sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(action.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(action))
    }

    /// Lists every queued action, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is
    /// malformed.
    pub async fn list(&self) -> Result<Vec<QueuedAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM offline_queue ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(read_action).collect()
    }

    /// Number of queued actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Whether any action is waiting for replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn has_pending(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// Records a failed replay attempt: increments the attempt count and
    /// stores the error message. The action stays queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn mark_failed(&self, id: i64, message: &str) -> Result<()> {
        sqlx::query("UPDATE offline_queue SET attempts = attempts + 1, last_error = ? WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes one action by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn remove(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes every action targeting a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn remove_by_resource(&self, resource_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM offline_queue WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes actions older than `max_age`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn remove_stale(&self, max_age: Duration) -> Result<u64> {
        #[allow(clippy::cast_possible_wrap)]
        let cutoff = Utc::now().timestamp() - max_age.as_secs() as i64;
        let result = sqlx::query("DELETE FROM offline_queue WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes every queued action.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM offline_queue")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn read_action(row: &SqliteRow) -> Result<QueuedAction> {
    let action_type: String = row.get("type");
    Ok(QueuedAction {
        id: row.get("id"),
        action_type: action_type.parse()?,
        resource_id: row.get("resource_id"),
        payload: row.get::<Option<String>, _>("payload").unwrap_or_default(),
        created_at: timestamp(row.get("created_at")),
        attempts: row.get("attempts"),
        last_error: row
            .get::<Option<String>, _>("last_error")
            .unwrap_or_default(),
    })
}
