//! Contact cache repository.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::model::{CachedContact, ContactListOptions};
use crate::Result;
use crate::emails::timestamp;

/// Column list shared by every contact SELECT.
const CONTACT_COLUMNS: &str = "id, given_name, surname, display_name, email, \
     phone, company, job_title, notes, photo_url, groups_json, cached_at";

/// Repository for cached contacts, bound to one account store.
#[derive(Debug, Clone)]
pub struct ContactStore {
    pool: SqlitePool,
}

impl ContactStore {
    /// Creates a contact store over an opened account pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a contact, replacing any previous row with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    pub async fn put(&self, contact: &CachedContact) -> Result<()> {
        let groups_json = serde_json::to_string(&contact.groups)?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO contacts (
                id, given_name, surname, display_name, email,
                phone, company, job_title, notes, photo_url,
                groups_json, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&contact.id)
        .bind(&contact.given_name)
        .bind(&contact.surname)
        .bind(&contact.display_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.company)
        .bind(&contact.job_title)
        .bind(&contact.notes)
        .bind(&contact.photo_url)
        .bind(groups_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a batch of contacts inside a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error and rolls back if any row fails to insert.
    pub async fn put_batch(&self, contacts: &[CachedContact]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        for contact in contacts {
            let groups_json = serde_json::to_string(&contact.groups)?;

            sqlx::query(
                r"
                INSERT OR REPLACE INTO contacts (
                    id, given_name, surname, display_name, email,
                    phone, company, job_title, notes, photo_url,
                    groups_json, cached_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&contact.id)
            .bind(&contact.given_name)
            .bind(&contact.surname)
            .bind(&contact.display_name)
            .bind(&contact.email)
            .bind(&contact.phone)
            .bind(&contact.company)
            .bind(&contact.job_title)
            .bind(&contact.notes)
            .bind(&contact.photo_url)
            .bind(groups_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieves a contact by id; `Ok(None)` when not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CachedContact>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(read_contact).transpose()
    }

    /// Retrieves a contact by email address; `Ok(None)` when not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<CachedContact>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(read_contact).transpose()
    }

    /// Lists contacts ordered by display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, opts: &ContactListOptions) -> Result<Vec<CachedContact>> {
        let mut query = format!("SELECT {CONTACT_COLUMNS} FROM contacts");
        let mut group_pattern: Option<String> = None;

        if let Some(group) = &opts.group {
            query.push_str(" WHERE groups_json LIKE ?");
            group_pattern = Some(format!("%{group}%"));
        }

        query.push_str(" ORDER BY display_name ASC, given_name ASC");
        if let Some(limit) = opts.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = opts.offset {
            query.push_str(&format!(" OFFSET {offset}"));
        }

        let mut q = sqlx::query(&query);
        if let Some(pattern) = &group_pattern {
            q = q.bind(pattern);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(read_contact).collect()
    }

    /// Full-text search over names, email, and company.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, including FTS match syntax errors.
    pub async fn search(&self, text: &str, limit: u32) -> Result<Vec<CachedContact>> {
        let limit = if limit == 0 { 50 } else { limit };
        let rows = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE rowid IN (SELECT rowid FROM contacts_fts WHERE contacts_fts MATCH ?)
             ORDER BY display_name ASC LIMIT ?"
        ))
        .bind(text)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(read_contact).collect()
    }

    /// Removes a contact from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts cached contacts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Returns all distinct group names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_groups(&self) -> Result<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT groups_json FROM contacts
             WHERE groups_json IS NOT NULL AND groups_json != '[]' AND groups_json != ''",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut groups = BTreeSet::new();
        for json in rows {
            if let Ok(parsed) = serde_json::from_str::<Vec<String>>(&json) {
                groups.extend(parsed);
            }
        }
        Ok(groups.into_iter().collect())
    }
}

fn read_contact(row: &SqliteRow) -> Result<CachedContact> {
    let groups_json: Option<String> = row.get("groups_json");

    Ok(CachedContact {
        id: row.get("id"),
        given_name: row
            .get::<Option<String>, _>("given_name")
            .unwrap_or_default(),
        surname: row.get::<Option<String>, _>("surname").unwrap_or_default(),
        display_name: row
            .get::<Option<String>, _>("display_name")
            .unwrap_or_default(),
        email: row.get::<Option<String>, _>("email").unwrap_or_default(),
        phone: row.get::<Option<String>, _>("phone").unwrap_or_default(),
        company: row.get::<Option<String>, _>("company").unwrap_or_default(),
        job_title: row.get::<Option<String>, _>("job_title").unwrap_or_default(),
        notes: row.get::<Option<String>, _>("notes").unwrap_or_default(),
        photo_url: row.get::<Option<String>, _>("photo_url").unwrap_or_default(),
        groups: groups_json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default(),
        cached_at: timestamp(row.get("cached_at")),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::schema::init_schema;

    async fn store() -> ContactStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        ContactStore::new(pool)
    }

    fn sample(id: &str, email: &str) -> CachedContact {
        CachedContact {
            id: id.to_string(),
            given_name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            email: email.to_string(),
            company: "Analytical Engines".to_string(),
            groups: vec!["friends".to_string()],
            ..CachedContact::default()
        }
    }

    #[tokio::test]
    async fn put_and_lookup_by_email() {
        let store = store().await;
        store.put(&sample("c1", "ada@example.com")).await.unwrap();

        let contact = store.get_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(contact.id, "c1");
        assert_eq!(contact.name(), "Ada Lovelace");
        assert_eq!(contact.groups, vec!["friends"]);
    }

    #[tokio::test]
    async fn list_filters_by_group() {
        let store = store().await;
        store.put(&sample("c1", "a@example.com")).await.unwrap();
        let mut other = sample("c2", "b@example.com");
        other.groups = vec!["work".to_string()];
        store.put(&other).await.unwrap();

        let friends = store
            .list(&ContactListOptions {
                group: Some("friends".to_string()),
                ..ContactListOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, "c1");

        let groups = store.list_groups().await.unwrap();
        assert_eq!(groups, vec!["friends".to_string(), "work".to_string()]);
    }

    #[tokio::test]
    async fn search_matches_company() {
        let store = store().await;
        store.put(&sample("c1", "ada@example.com")).await.unwrap();

        let hits = store.search("Analytical", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");
    }

    #[tokio::test]
    async fn delete_and_count() {
        let store = store().await;
        store.put(&sample("c1", "ada@example.com")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.delete("c1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get("c1").await.unwrap().is_none());
    }
}
