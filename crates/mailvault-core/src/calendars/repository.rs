//! Calendar cache repository.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::model::CachedCalendar;
use crate::Result;
use crate::emails::timestamp;

/// Repository for cached calendars, bound to one account store.
#[derive(Debug, Clone)]
pub struct CalendarStore {
    pool: SqlitePool,
}

impl CalendarStore {
    /// Creates a calendar store over an opened account pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a calendar, replacing any previous row with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn put(&self, calendar: &CachedCalendar) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR REPLACE INTO calendars (
                id, name, description, is_primary, read_only, hex_color, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&calendar.id)
        .bind(&calendar.name)
        .bind(&calendar.description)
        .bind(calendar.is_primary)
        .bind(calendar.read_only)
        .bind(&calendar.hex_color)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a batch of calendars inside a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error and rolls back if any row fails to insert.
    pub async fn put_batch(&self, calendars: &[CachedCalendar]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        for calendar in calendars {
            sqlx::query(
                r"
                INSERT OR REPLACE INTO calendars (
                    id, name, description, is_primary, read_only, hex_color, cached_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&calendar.id)
            .bind(&calendar.name)
            .bind(&calendar.description)
            .bind(calendar.is_primary)
            .bind(calendar.read_only)
            .bind(&calendar.hex_color)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieves a calendar by id; `Ok(None)` when not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CachedCalendar>> {
        let row = sqlx::query(
            "SELECT id, name, description, is_primary, read_only, hex_color, cached_at
             FROM calendars WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(read_calendar))
    }

    /// Lists all calendars, primary first, then by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<CachedCalendar>> {
        let rows = sqlx::query(
            "SELECT id, name, description, is_primary, read_only, hex_color, cached_at
             FROM calendars ORDER BY is_primary DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(read_calendar).collect())
    }

    /// Removes a calendar from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM calendars WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts cached calendars.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM calendars")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn read_calendar(row: &SqliteRow) -> CachedCalendar {
    CachedCalendar {
        id: row.get("id"),
        name: row.get::<Option<String>, _>("name").unwrap_or_default(),
        description: row
            .get::<Option<String>, _>("description")
            .unwrap_or_default(),
        is_primary: row.get("is_primary"),
        read_only: row.get("read_only"),
        hex_color: row.get::<Option<String>, _>("hex_color").unwrap_or_default(),
        cached_at: timestamp(row.get("cached_at")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn store() -> CalendarStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        CalendarStore::new(pool)
    }

    #[tokio::test]
    async fn primary_calendar_lists_first() {
        let store = store().await;
        store
            .put_batch(&[
                CachedCalendar {
                    id: "c1".to_string(),
                    name: "Birthdays".to_string(),
                    ..CachedCalendar::default()
                },
                CachedCalendar {
                    id: "c2".to_string(),
                    name: "Work".to_string(),
                    is_primary: true,
                    hex_color: "#336699".to_string(),
                    ..CachedCalendar::default()
                },
            ])
            .await
            .unwrap();

        let calendars = store.list().await.unwrap();
        assert_eq!(calendars[0].id, "c2");
        assert!(calendars[0].is_primary);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
