//! Email cache repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::model::{CachedEmail, EmailListOptions};
use crate::Result;

/// Column list shared by every email SELECT.
pub(crate) const EMAIL_COLUMNS: &str = "id, thread_id, folder_id, subject, snippet, \
     from_name, from_email, to_json, cc_json, bcc_json, \
     date, unread, starred, has_attachments, body_html, body_text, cached_at";

/// Repository for cached emails, bound to one account store.
#[derive(Debug, Clone)]
pub struct EmailStore {
    pool: SqlitePool,
}

impl EmailStore {
    /// Creates an email store over an opened account pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores an email, replacing any previous row with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    pub async fn put(&self, email: &CachedEmail) -> Result<()> {
        let to_json = serde_json::to_string(&email.to)?;
        let cc_json = serde_json::to_string(&email.cc)?;
        let bcc_json = serde_json::to_string(&email.bcc)?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO emails (
                id, thread_id, folder_id, subject, snippet,
                from_name, from_email, to_json, cc_json, bcc_json,
                date, unread, starred, has_attachments,
                body_html, body_text, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&email.id)
        .bind(&email.thread_id)
        .bind(&email.folder_id)
        .bind(&email.subject)
        .bind(&email.snippet)
        .bind(&email.from_name)
        .bind(&email.from_email)
        .bind(to_json)
        .bind(cc_json)
        .bind(bcc_json)
        .bind(email.date.timestamp())
        .bind(email.unread)
        .bind(email.starred)
        .bind(email.has_attachments)
        .bind(&email.body_html)
        .bind(&email.body_text)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a batch of emails inside a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error and rolls back if any row fails to insert.
    pub async fn put_batch(&self, emails: &[CachedEmail]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        for email in emails {
            let to_json = serde_json::to_string(&email.to)?;
            let cc_json = serde_json::to_string(&email.cc)?;
            let bcc_json = serde_json::to_string(&email.bcc)?;

            sqlx::query(
                r"
                INSERT OR REPLACE INTO emails (
                    id, thread_id, folder_id, subject, snippet,
                    from_name, from_email, to_json, cc_json, bcc_json,
                    date, unread, starred, has_attachments,
                    body_html, body_text, cached_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&email.id)
            .bind(&email.thread_id)
            .bind(&email.folder_id)
            .bind(&email.subject)
            .bind(&email.snippet)
            .bind(&email.from_name)
            .bind(&email.from_email)
            .bind(to_json)
            .bind(cc_json)
            .bind(bcc_json)
            .bind(email.date.timestamp())
            .bind(email.unread)
            .bind(email.starred)
            .bind(email.has_attachments)
            .bind(&email.body_html)
            .bind(&email.body_text)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieves an email by id; `Ok(None)` when not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CachedEmail>> {
        let row = sqlx::query(&format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(read_email).transpose()
    }

    /// Lists emails matching the given filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, opts: &EmailListOptions) -> Result<Vec<CachedEmail>> {
        let mut query = format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        let mut dates: Vec<i64> = Vec::new();

        if let Some(folder_id) = &opts.folder_id {
            query.push_str(" AND folder_id = ?");
            args.push(folder_id.clone());
        }
        if let Some(thread_id) = &opts.thread_id {
            query.push_str(" AND thread_id = ?");
            args.push(thread_id.clone());
        }
        if opts.unread_only {
            query.push_str(" AND unread = 1");
        }
        if opts.starred_only {
            query.push_str(" AND starred = 1");
        }
        if let Some(since) = opts.since {
            query.push_str(" AND date >= ?");
            dates.push(since.timestamp());
        }
        if let Some(before) = opts.before {
            query.push_str(" AND date < ?");
            dates.push(before.timestamp());
        }

        query.push_str(" ORDER BY date DESC");
        if let Some(limit) = opts.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = opts.offset {
            query.push_str(&format!(" OFFSET {offset}"));
        }

        let mut q = sqlx::query(&query);
        for arg in &args {
            q = q.bind(arg);
        }
        for date in &dates {
            q = q.bind(date);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(read_email).collect()
    }

    /// Full-text search over subject, snippet, body, and sender, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, including FTS match syntax errors.
    pub async fn search(&self, text: &str, limit: u32) -> Result<Vec<CachedEmail>> {
        let limit = if limit == 0 { 50 } else { limit };
        let rows = sqlx::query(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE rowid IN (SELECT rowid FROM emails_fts WHERE emails_fts MATCH ?)
             ORDER BY date DESC LIMIT ?"
        ))
        .bind(text)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(read_email).collect()
    }

    /// Removes an email from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM emails WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Updates read/starred status in place. `None` leaves a flag untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn update_flags(
        &self,
        id: &str,
        unread: Option<bool>,
        starred: Option<bool>,
    ) -> Result<()> {
        match (unread, starred) {
            (None, None) => Ok(()),
            (Some(u), None) => {
                sqlx::query("UPDATE emails SET unread = ? WHERE id = ?")
                    .bind(u)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
            (None, Some(s)) => {
                sqlx::query("UPDATE emails SET starred = ? WHERE id = ?")
                    .bind(s)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
            (Some(u), Some(s)) => {
                sqlx::query("UPDATE emails SET unread = ?, starred = ? WHERE id = ?")
                    .bind(u)
                    .bind(s)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        }
    }

    /// Counts cached emails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Counts unread emails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_unread(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE unread = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Maps a row onto the email model, decoding the JSON recipient columns.
pub(crate) fn read_email(row: &SqliteRow) -> Result<CachedEmail> {
    let to_json: Option<String> = row.get("to_json");
    let cc_json: Option<String> = row.get("cc_json");
    let bcc_json: Option<String> = row.get("bcc_json");

    Ok(CachedEmail {
        id: row.get("id"),
        thread_id: row.get::<Option<String>, _>("thread_id").unwrap_or_default(),
        folder_id: row.get::<Option<String>, _>("folder_id").unwrap_or_default(),
        subject: row.get::<Option<String>, _>("subject").unwrap_or_default(),
        snippet: row.get::<Option<String>, _>("snippet").unwrap_or_default(),
        from_name: row.get::<Option<String>, _>("from_name").unwrap_or_default(),
        from_email: row
            .get::<Option<String>, _>("from_email")
            .unwrap_or_default(),
        to: decode_list(to_json.as_deref()),
        cc: decode_list(cc_json.as_deref()),
        bcc: decode_list(bcc_json.as_deref()),
        date: timestamp(row.get("date")),
        unread: row.get("unread"),
        starred: row.get("starred"),
        has_attachments: row.get("has_attachments"),
        body_html: row.get::<Option<String>, _>("body_html").unwrap_or_default(),
        body_text: row.get::<Option<String>, _>("body_text").unwrap_or_default(),
        cached_at: timestamp(row.get("cached_at")),
    })
}

fn decode_list(json: Option<&str>) -> Vec<String> {
    json.and_then(|j| serde_json::from_str(j).ok())
        .unwrap_or_default()
}

pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn store() -> EmailStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        EmailStore::new(pool)
    }

    fn sample(id: &str) -> CachedEmail {
        CachedEmail {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            folder_id: "inbox".to_string(),
            subject: format!("Subject {id}"),
            snippet: "preview".to_string(),
            from_name: "Alice".to_string(),
            from_email: "alice@example.com".to_string(),
            to: vec!["bob@example.com".to_string()],
            date: Utc::now(),
            unread: true,
            ..CachedEmail::default()
        }
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let store = store().await;
        store.put(&sample("e1")).await.unwrap();

        let email = store.get("e1").await.unwrap().unwrap();
        assert_eq!(email.subject, "Subject e1");
        assert_eq!(email.to, vec!["bob@example.com"]);
        assert!(email.unread);
        assert!(email.cached_at.timestamp() > 0);
    }

    #[tokio::test]
    async fn get_miss_is_none() {
        let store = store().await;
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_folder_and_flags() {
        let store = store().await;
        let mut a = sample("a");
        a.folder_id = "inbox".to_string();
        let mut b = sample("b");
        b.folder_id = "archive".to_string();
        b.unread = false;
        store.put_batch(&[a, b]).await.unwrap();

        let inbox = store
            .list(&EmailListOptions {
                folder_id: Some("inbox".to_string()),
                ..EmailListOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, "a");

        let unread = store
            .list(&EmailListOptions {
                unread_only: true,
                ..EmailListOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "a");
    }

    #[tokio::test]
    async fn search_hits_fts_index() {
        let store = store().await;
        let mut email = sample("e1");
        email.subject = "budget planning".to_string();
        store.put(&email).await.unwrap();

        let hits = store.search("budget", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");

        let misses = store.search("vacation", 10).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn update_flags_and_counts() {
        let store = store().await;
        store.put(&sample("e1")).await.unwrap();
        assert_eq!(store.count_unread().await.unwrap(), 1);

        store
            .update_flags("e1", Some(false), Some(true))
            .await
            .unwrap();
        let email = store.get("e1").await.unwrap().unwrap();
        assert!(!email.unread);
        assert!(email.starred);
        assert_eq!(store.count_unread().await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_row_and_fts_entry() {
        let store = store().await;
        let mut email = sample("e1");
        email.subject = "unique marker".to_string();
        store.put(&email).await.unwrap();

        store.delete("e1").await.unwrap();
        assert!(store.get("e1").await.unwrap().is_none());
        assert!(store.search("marker", 10).await.unwrap().is_empty());
    }
}
