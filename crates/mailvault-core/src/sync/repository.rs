//! Sync state repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::model::SyncState;
use crate::Result;

/// Repository for per-resource sync cursors, bound to one account store.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    pool: SqlitePool,
}

impl SyncStateStore {
    /// Creates a sync state store over an opened account pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts the sync state for a resource kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, state: &SyncState) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sync_state (resource, last_sync, cursor, metadata_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(resource) DO UPDATE SET
                last_sync = excluded.last_sync,
                cursor = excluded.cursor,
                metadata_json = excluded.metadata_json
            ",
        )
        .bind(&state.resource)
        .bind(state.last_sync.map(|t| t.timestamp()))
        .bind(&state.cursor)
        .bind(&state.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieves the sync state for a resource kind; `Ok(None)` when never synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, resource: &str) -> Result<Option<SyncState>> {
        let row = sqlx::query(
            "SELECT resource, last_sync, cursor, metadata_json FROM sync_state WHERE resource = ?",
        )
        .bind(resource)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(read_state))
    }

    /// Lists sync state for every tracked resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<SyncState>> {
        let rows = sqlx::query(
            "SELECT resource, last_sync, cursor, metadata_json FROM sync_state ORDER BY resource",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(read_state).collect())
    }

    /// Most recent sync instant across all resources; `None` when never synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest_sync(&self) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(last_sync) FROM sync_state")
            .fetch_one(&self.pool)
            .await?;

        Ok(latest.and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }
}

fn read_state(row: &SqliteRow) -> SyncState {
    let last_sync: Option<i64> = row.get("last_sync");
    SyncState {
        resource: row.get("resource"),
        last_sync: last_sync.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        cursor: row.get::<Option<String>, _>("cursor").unwrap_or_default(),
        metadata: row
            .get::<Option<String>, _>("metadata_json")
            .unwrap_or_default(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn store() -> SyncStateStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        SyncStateStore::new(pool)
    }

    #[tokio::test]
    async fn upsert_replaces_cursor() {
        let store = store().await;
        let now = Utc::now();

        store
            .upsert(&SyncState {
                resource: "emails".to_string(),
                last_sync: Some(now),
                cursor: "abc".to_string(),
                metadata: String::new(),
            })
            .await
            .unwrap();
        store
            .upsert(&SyncState {
                resource: "emails".to_string(),
                last_sync: Some(now),
                cursor: "def".to_string(),
                metadata: String::new(),
            })
            .await
            .unwrap();

        let state = store.get("emails").await.unwrap().unwrap();
        assert_eq!(state.cursor, "def");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn latest_sync_spans_resources() {
        let store = store().await;
        assert!(store.latest_sync().await.unwrap().is_none());

        let older = Utc::now() - chrono::Duration::hours(2);
        let newer = Utc::now();
        store
            .upsert(&SyncState {
                resource: "emails".to_string(),
                last_sync: Some(older),
                ..SyncState::default()
            })
            .await
            .unwrap();
        store
            .upsert(&SyncState {
                resource: "contacts".to_string(),
                last_sync: Some(newer),
                ..SyncState::default()
            })
            .await
            .unwrap();

        let latest = store.latest_sync().await.unwrap().unwrap();
        assert_eq!(latest.timestamp(), newer.timestamp());
    }
}
