//! Event cache repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::model::{CachedEvent, EventListOptions};
use crate::Result;
use crate::emails::timestamp;

/// Column list shared by every event SELECT.
const EVENT_COLUMNS: &str = "id, calendar_id, title, description, location, \
     start_time, end_time, all_day, recurring, rrule, \
     participants_json, status, busy, cached_at";

/// Repository for cached calendar events, bound to one account store.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Creates an event store over an opened account pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores an event, replacing any previous row with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    pub async fn put(&self, event: &CachedEvent) -> Result<()> {
        let participants_json = serde_json::to_string(&event.participants)?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO events (
                id, calendar_id, title, description, location,
                start_time, end_time, all_day, recurring, rrule,
                participants_json, status, busy, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&event.id)
        .bind(&event.calendar_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_time.timestamp())
        .bind(event.end_time.timestamp())
        .bind(event.all_day)
        .bind(event.recurring)
        .bind(&event.rrule)
        .bind(participants_json)
        .bind(&event.status)
        .bind(event.busy)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a batch of events inside a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error and rolls back if any row fails to insert.
    pub async fn put_batch(&self, events: &[CachedEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        for event in events {
            let participants_json = serde_json::to_string(&event.participants)?;

            sqlx::query(
                r"
                INSERT OR REPLACE INTO events (
                    id, calendar_id, title, description, location,
                    start_time, end_time, all_day, recurring, rrule,
                    participants_json, status, busy, cached_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&event.id)
            .bind(&event.calendar_id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.location)
            .bind(event.start_time.timestamp())
            .bind(event.end_time.timestamp())
            .bind(event.all_day)
            .bind(event.recurring)
            .bind(&event.rrule)
            .bind(participants_json)
            .bind(&event.status)
            .bind(event.busy)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieves an event by id; `Ok(None)` when not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CachedEvent>> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(read_event).transpose()
    }

    /// Lists events matching the given filters, ordered by start time.
    ///
    /// The time window matches any event overlapping it: events ending after
    /// `start` and starting before `end`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, opts: &EventListOptions) -> Result<Vec<CachedEvent>> {
        let mut query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
        let mut calendar: Option<&str> = None;
        let mut times: Vec<i64> = Vec::new();

        if let Some(calendar_id) = &opts.calendar_id {
            query.push_str(" AND calendar_id = ?");
            calendar = Some(calendar_id);
        }
        if let Some(start) = opts.start {
            query.push_str(" AND end_time >= ?");
            times.push(start.timestamp());
        }
        if let Some(end) = opts.end {
            query.push_str(" AND start_time <= ?");
            times.push(end.timestamp());
        }

        query.push_str(" ORDER BY start_time ASC");
        if let Some(limit) = opts.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = opts.offset {
            query.push_str(&format!(" OFFSET {offset}"));
        }

        let mut q = sqlx::query(&query);
        if let Some(calendar_id) = calendar {
            q = q.bind(calendar_id);
        }
        for time in &times {
            q = q.bind(time);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(read_event).collect()
    }

    /// Lists events overlapping the given date range.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CachedEvent>> {
        self.list(&EventListOptions {
            start: Some(start),
            end: Some(end),
            ..EventListOptions::default()
        })
        .await
    }

    /// Lists upcoming events from now, soonest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upcoming(&self, limit: u32) -> Result<Vec<CachedEvent>> {
        self.list(&EventListOptions {
            start: Some(Utc::now()),
            limit: Some(limit),
            ..EventListOptions::default()
        })
        .await
    }

    /// Full-text search over title, description, and location.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, including FTS match syntax errors.
    pub async fn search(&self, text: &str, limit: u32) -> Result<Vec<CachedEvent>> {
        let limit = if limit == 0 { 50 } else { limit };
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE rowid IN (SELECT rowid FROM events_fts WHERE events_fts MATCH ?)
             ORDER BY start_time ASC LIMIT ?"
        ))
        .bind(text)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(read_event).collect()
    }

    /// Removes an event from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes all events belonging to a calendar.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete_by_calendar(&self, calendar_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE calendar_id = ?")
            .bind(calendar_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts cached events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn read_event(row: &SqliteRow) -> Result<CachedEvent> {
    let participants_json: Option<String> = row.get("participants_json");

    Ok(CachedEvent {
        id: row.get("id"),
        calendar_id: row
            .get::<Option<String>, _>("calendar_id")
            .unwrap_or_default(),
        title: row.get::<Option<String>, _>("title").unwrap_or_default(),
        description: row
            .get::<Option<String>, _>("description")
            .unwrap_or_default(),
        location: row.get::<Option<String>, _>("location").unwrap_or_default(),
        start_time: timestamp(row.get("start_time")),
        end_time: timestamp(row.get("end_time")),
        all_day: row.get("all_day"),
        recurring: row.get("recurring"),
        rrule: row.get::<Option<String>, _>("rrule").unwrap_or_default(),
        participants: participants_json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default(),
        status: row.get::<Option<String>, _>("status").unwrap_or_default(),
        busy: row.get("busy"),
        cached_at: timestamp(row.get("cached_at")),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn store() -> EventStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        EventStore::new(pool)
    }

    fn sample(id: &str, start: DateTime<Utc>) -> CachedEvent {
        CachedEvent {
            id: id.to_string(),
            calendar_id: "cal-1".to_string(),
            title: format!("Event {id}"),
            location: "Room 4".to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            busy: true,
            ..CachedEvent::default()
        }
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let store = store().await;
        let start = Utc::now();
        store.put(&sample("ev1", start)).await.unwrap();

        let event = store.get("ev1").await.unwrap().unwrap();
        assert_eq!(event.title, "Event ev1");
        assert_eq!(event.start_time.timestamp(), start.timestamp());
        assert!(event.busy);
    }

    #[tokio::test]
    async fn list_respects_time_window() {
        let store = store().await;
        let now = Utc::now();
        store.put(&sample("past", now - Duration::days(7))).await.unwrap();
        store.put(&sample("soon", now + Duration::hours(2))).await.unwrap();

        let upcoming = store.upcoming(10).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, "soon");

        let window = store
            .list_by_date_range(now - Duration::days(8), now - Duration::days(6))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, "past");
    }

    #[tokio::test]
    async fn delete_by_calendar_removes_members() {
        let store = store().await;
        let now = Utc::now();
        store.put(&sample("a", now)).await.unwrap();
        let mut other = sample("b", now);
        other.calendar_id = "cal-2".to_string();
        store.put(&other).await.unwrap();

        store.delete_by_calendar("cal-1").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_matches_location() {
        let store = store().await;
        store.put(&sample("ev1", Utc::now())).await.unwrap();

        let hits = store.search("Room", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
