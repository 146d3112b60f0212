//! Row copying between two account stores.
//!
//! Used by the encryption migrations. Table and column names come from a
//! closed enum, so no caller-supplied identifier ever reaches query text.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::Result;

/// Column affinities we copy. SQLite stores everything else as one of these
/// two in our schema.
#[derive(Debug, Clone, Copy)]
enum Affinity {
    Text,
    Integer,
}

/// Tables eligible for store-to-store copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyTable {
    Emails,
    Events,
    Contacts,
    Folders,
    Calendars,
    SyncState,
}

impl CopyTable {
    /// Every copyable table, in copy order.
    pub(crate) const ALL: [Self; 6] = [
        Self::Emails,
        Self::Events,
        Self::Contacts,
        Self::Folders,
        Self::Calendars,
        Self::SyncState,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Emails => "emails",
            Self::Events => "events",
            Self::Contacts => "contacts",
            Self::Folders => "folders",
            Self::Calendars => "calendars",
            Self::SyncState => "sync_state",
        }
    }

    const fn columns(self) -> &'static [(&'static str, Affinity)] {
        match self {
            Self::Emails => &[
                ("id", Affinity::Text),
                ("thread_id", Affinity::Text),
                ("folder_id", Affinity::Text),
                ("subject", Affinity::Text),
                ("snippet", Affinity::Text),
                ("from_name", Affinity::Text),
                ("from_email", Affinity::Text),
                ("to_json", Affinity::Text),
                ("cc_json", Affinity::Text),
                ("bcc_json", Affinity::Text),
                ("date", Affinity::Integer),
                ("unread", Affinity::Integer),
                ("starred", Affinity::Integer),
                ("has_attachments", Affinity::Integer),
                ("body_html", Affinity::Text),
                ("body_text", Affinity::Text),
                ("headers_json", Affinity::Text),
                ("cached_at", Affinity::Integer),
            ],
            Self::Events => &[
                ("id", Affinity::Text),
                ("calendar_id", Affinity::Text),
                ("title", Affinity::Text),
                ("description", Affinity::Text),
                ("location", Affinity::Text),
                ("start_time", Affinity::Integer),
                ("end_time", Affinity::Integer),
                ("all_day", Affinity::Integer),
                ("recurring", Affinity::Integer),
                ("rrule", Affinity::Text),
                ("participants_json", Affinity::Text),
                ("status", Affinity::Text),
                ("busy", Affinity::Integer),
                ("cached_at", Affinity::Integer),
            ],
            Self::Contacts => &[
                ("id", Affinity::Text),
                ("given_name", Affinity::Text),
                ("surname", Affinity::Text),
                ("display_name", Affinity::Text),
                ("email", Affinity::Text),
                ("phone", Affinity::Text),
                ("company", Affinity::Text),
                ("job_title", Affinity::Text),
                ("notes", Affinity::Text),
                ("photo_url", Affinity::Text),
                ("groups_json", Affinity::Text),
                ("cached_at", Affinity::Integer),
            ],
            Self::Folders => &[
                ("id", Affinity::Text),
                ("name", Affinity::Text),
                ("folder_type", Affinity::Text),
                ("unread_count", Affinity::Integer),
                ("total_count", Affinity::Integer),
                ("cached_at", Affinity::Integer),
            ],
            Self::Calendars => &[
                ("id", Affinity::Text),
                ("name", Affinity::Text),
                ("description", Affinity::Text),
                ("is_primary", Affinity::Integer),
                ("read_only", Affinity::Integer),
                ("hex_color", Affinity::Text),
                ("cached_at", Affinity::Integer),
            ],
            Self::SyncState => &[
                ("resource", Affinity::Text),
                ("last_sync", Affinity::Integer),
                ("cursor", Affinity::Text),
                ("metadata_json", Affinity::Text),
            ],
        }
    }

    fn select_sql(self) -> String {
        let columns: Vec<&str> = self.columns().iter().map(|(name, _)| *name).collect();
        format!("SELECT {} FROM {}", columns.join(", "), self.name())
    }

    fn insert_sql(self) -> String {
        let columns: Vec<&str> = self.columns().iter().map(|(name, _)| *name).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
            self.name(),
            columns.join(", ")
        )
    }
}

/// Copies every allow-listed table from `source` to `dest` inside a single
/// destination transaction. Returns the total number of rows copied.
///
/// # Errors
///
/// Returns an error if any read or write fails; the destination transaction
/// rolls back as a whole.
pub(crate) async fn copy_all_tables(source: &SqlitePool, dest: &SqlitePool) -> Result<u64> {
    let mut tx = dest.begin().await?;
    let mut copied = 0u64;

    for table in CopyTable::ALL {
        let rows = sqlx::query(&table.select_sql()).fetch_all(source).await?;
        let insert = table.insert_sql();
        for row in &rows {
            let mut query = sqlx::query(&insert);
            for (index, (_, affinity)) in table.columns().iter().enumerate() {
                query = match affinity {
                    Affinity::Text => query.bind(value_text(row, index)),
                    Affinity::Integer => query.bind(value_integer(row, index)),
                };
            }
            query.execute(&mut *tx).await?;
        }
        copied += rows.len() as u64;
    }

    tx.commit().await?;
    Ok(copied)
}

fn value_text(row: &SqliteRow, index: usize) -> Option<String> {
    row.get(index)
}

fn value_integer(row: &SqliteRow, index: usize) -> Option<i64> {
    row.get(index)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn copies_rows_and_preserves_content() {
        let source = pool().await;
        let dest = pool().await;

        sqlx::query(
            "INSERT INTO emails (id, subject, date, unread, cached_at)
             VALUES ('e1', 'quarterly report', 1700000000, 1, 1700000001)",
        )
        .execute(&source)
        .await
        .unwrap();
        sqlx::query("INSERT INTO folders (id, name, folder_type) VALUES ('f1', 'Inbox', 'inbox')")
            .execute(&source)
            .await
            .unwrap();

        let copied = copy_all_tables(&source, &dest).await.unwrap();
        assert_eq!(copied, 2);

        let subject: String = sqlx::query_scalar("SELECT subject FROM emails WHERE id = 'e1'")
            .fetch_one(&dest)
            .await
            .unwrap();
        assert_eq!(subject, "quarterly report");

        // The FTS triggers fire on the destination inserts too.
        let hits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM emails_fts WHERE emails_fts MATCH 'quarterly'",
        )
        .fetch_one(&dest)
        .await
        .unwrap();
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn empty_source_copies_nothing() {
        let source = pool().await;
        let dest = pool().await;
        assert_eq!(copy_all_tables(&source, &dest).await.unwrap(), 0);
    }
}
