//! Folder cache repository.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::model::CachedFolder;
use crate::Result;
use crate::emails::timestamp;

/// Repository for cached folders, bound to one account store.
#[derive(Debug, Clone)]
pub struct FolderStore {
    pool: SqlitePool,
}

impl FolderStore {
    /// Creates a folder store over an opened account pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a folder, replacing any previous row with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn put(&self, folder: &CachedFolder) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR REPLACE INTO folders (
                id, name, folder_type, unread_count, total_count, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&folder.id)
        .bind(&folder.name)
        .bind(&folder.folder_type)
        .bind(folder.unread_count)
        .bind(folder.total_count)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a batch of folders inside a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error and rolls back if any row fails to insert.
    pub async fn put_batch(&self, folders: &[CachedFolder]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        for folder in folders {
            sqlx::query(
                r"
                INSERT OR REPLACE INTO folders (
                    id, name, folder_type, unread_count, total_count, cached_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&folder.id)
            .bind(&folder.name)
            .bind(&folder.folder_type)
            .bind(folder.unread_count)
            .bind(folder.total_count)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieves a folder by id; `Ok(None)` when not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CachedFolder>> {
        let row = sqlx::query(
            "SELECT id, name, folder_type, unread_count, total_count, cached_at
             FROM folders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(read_folder))
    }

    /// Lists all folders ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<CachedFolder>> {
        let rows = sqlx::query(
            "SELECT id, name, folder_type, unread_count, total_count, cached_at
             FROM folders ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(read_folder).collect())
    }

    /// Removes a folder from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts cached folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM folders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn read_folder(row: &SqliteRow) -> CachedFolder {
    CachedFolder {
        id: row.get("id"),
        name: row.get::<Option<String>, _>("name").unwrap_or_default(),
        folder_type: row
            .get::<Option<String>, _>("folder_type")
            .unwrap_or_default(),
        unread_count: row.get("unread_count"),
        total_count: row.get("total_count"),
        cached_at: timestamp(row.get("cached_at")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn store() -> FolderStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        FolderStore::new(pool)
    }

    #[tokio::test]
    async fn put_batch_and_list_sorted() {
        let store = store().await;
        store
            .put_batch(&[
                CachedFolder {
                    id: "f2".to_string(),
                    name: "Sent".to_string(),
                    folder_type: "sent".to_string(),
                    ..CachedFolder::default()
                },
                CachedFolder {
                    id: "f1".to_string(),
                    name: "Inbox".to_string(),
                    folder_type: "inbox".to_string(),
                    unread_count: 3,
                    total_count: 10,
                    ..CachedFolder::default()
                },
            ])
            .await
            .unwrap();

        let folders = store.list().await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Inbox");
        assert_eq!(folders[0].unread_count, 3);

        store.delete("f1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
