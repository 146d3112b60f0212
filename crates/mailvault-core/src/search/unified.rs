//! Search across emails, events, and contacts in one call.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use crate::contacts::ContactStore;
use crate::emails::EmailStore;
use crate::events::EventStore;
use crate::Result;

/// Default total result limit.
const DEFAULT_LIMIT: u32 = 20;

/// Minimum per-kind result quota.
const MIN_PER_KIND: u32 = 5;

/// Kind of item a unified search hit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// A cached email.
    Email,
    /// A cached calendar event.
    Event,
    /// A cached contact.
    Contact,
}

/// One unified search hit.
#[derive(Debug, Clone)]
pub struct UnifiedSearchResult {
    /// What the hit is.
    pub kind: ResultKind,
    /// Item id within its store.
    pub id: String,
    /// Primary display line (subject, title, or name).
    pub title: String,
    /// Secondary display line (sender, location, or address).
    pub subtitle: String,
    /// Item date: email date, event start, or contact cache time.
    pub date: DateTime<Utc>,
}

/// Searches emails, events, and contacts, concatenated in that order.
///
/// Each kind gets a quota of `max(limit / 3, 5)` results; a kind whose search
/// fails is skipped with a warning rather than failing the whole call.
///
/// # Errors
///
/// Currently never fails; per-kind errors are downgraded to skips.
pub async fn unified_search(
    pool: &SqlitePool,
    text: &str,
    limit: u32,
) -> Result<Vec<UnifiedSearchResult>> {
    let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
    let per_kind = (limit / 3).max(MIN_PER_KIND);

    let mut results = Vec::new();

    match EmailStore::new(pool.clone()).search(text, per_kind).await {
        Ok(emails) => {
            for email in emails {
                results.push(UnifiedSearchResult {
                    kind: ResultKind::Email,
                    id: email.id,
                    title: email.subject,
                    subtitle: format!("{} <{}>", email.from_name, email.from_email),
                    date: email.date,
                });
            }
        }
        Err(e) => warn!("Unified search skipped emails: {e}"),
    }

    match EventStore::new(pool.clone()).search(text, per_kind).await {
        Ok(events) => {
            for event in events {
                results.push(UnifiedSearchResult {
                    kind: ResultKind::Event,
                    id: event.id,
                    title: event.title,
                    subtitle: event.location,
                    date: event.start_time,
                });
            }
        }
        Err(e) => warn!("Unified search skipped events: {e}"),
    }

    match ContactStore::new(pool.clone()).search(text, per_kind).await {
        Ok(contacts) => {
            for contact in contacts {
                let title = contact.name();
                results.push(UnifiedSearchResult {
                    kind: ResultKind::Contact,
                    id: contact.id,
                    title,
                    subtitle: contact.email,
                    date: contact.cached_at,
                });
            }
        }
        Err(e) => warn!("Unified search skipped contacts: {e}"),
    }

    Ok(results)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO emails (id, subject, from_name, from_email, date, cached_at)
             VALUES ('e1', 'standup notes', 'Alice', 'alice@example.com', 300, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO events (id, title, location, start_time, end_time, cached_at)
             VALUES ('ev1', 'standup', 'room 4', 400, 500, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO contacts (id, display_name, email, company, cached_at)
             VALUES ('c1', 'Standup Bot', 'bot@example.com', 'Example', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn concatenates_kinds_in_fixed_order() {
        let pool = seeded_pool().await;
        let results = unified_search(&pool, "standup", 20).await.unwrap();

        let kinds: Vec<ResultKind> = results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ResultKind::Email, ResultKind::Event, ResultKind::Contact]
        );
        assert_eq!(results[0].subtitle, "Alice <alice@example.com>");
        assert_eq!(results[1].subtitle, "room 4");
        assert_eq!(results[2].title, "Standup Bot");
    }

    #[tokio::test]
    async fn small_limits_still_allow_five_per_kind() {
        let pool = seeded_pool().await;
        for i in 0..8 {
            sqlx::query("INSERT INTO emails (id, subject, date, cached_at) VALUES (?, 'standup extra', ?, 1)")
                .bind(format!("bulk{i}"))
                .bind(i)
                .execute(&pool)
                .await
                .unwrap();
        }

        let results = unified_search(&pool, "standup", 3).await.unwrap();
        let emails = results
            .iter()
            .filter(|r| r.kind == ResultKind::Email)
            .count();
        assert_eq!(emails, 5);
    }

    #[tokio::test]
    async fn no_matches_returns_empty() {
        let pool = seeded_pool().await;
        let results = unified_search(&pool, "nonexistent", 0).await.unwrap();
        assert!(results.is_empty());
    }
}
