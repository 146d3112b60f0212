//! Contact photo cache.
//!
//! Photos are small and per-contact, so there is no content addressing: each
//! file under `<base>/photos/` is named by its contact id and expires after a
//! TTL. A stale or file-less entry self-heals on read by deleting itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::emails::timestamp;
use crate::Result;

/// Default photo time-to-live (30 days).
pub const DEFAULT_PHOTO_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Photo cache statistics.
#[derive(Debug, Clone)]
pub struct PhotoStats {
    /// Number of cached photos.
    pub count: i64,
    /// Total photo size in bytes.
    pub total_size: i64,
    /// Configured TTL in days.
    pub ttl_days: u64,
    /// Oldest cache instant, if any rows exist.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest cache instant, if any rows exist.
    pub newest: Option<DateTime<Utc>>,
}

/// TTL-bounded contact photo cache over one account store.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    pool: SqlitePool,
    base_path: PathBuf,
    ttl: Duration,
}

impl PhotoStore {
    /// Creates the photo table, its index, and the on-disk directory.
    ///
    /// A zero TTL falls back to [`DEFAULT_PHOTO_TTL`].
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created or the directory
    /// cannot be made.
    pub async fn new(pool: SqlitePool, base_path: &Path, ttl: Duration) -> Result<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS photos (
                contact_id TEXT PRIMARY KEY,
                content_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                local_path TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                accessed_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_cached_at ON photos(cached_at)")
            .execute(&pool)
            .await?;

        let base_path = base_path.join("photos");
        tokio::fs::create_dir_all(&base_path).await?;

        Ok(Self {
            pool,
            base_path,
            ttl: if ttl.is_zero() { DEFAULT_PHOTO_TTL } else { ttl },
        })
    }

    /// Stores a contact photo, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file write or metadata upsert fails. The file
    /// is removed again when the upsert fails.
    pub async fn put(&self, contact_id: &str, content_type: &str, data: &[u8]) -> Result<()> {
        let local_path = self.base_path.join(contact_id);
        tokio::fs::write(&local_path, data).await?;

        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT OR REPLACE INTO photos
             (contact_id, content_type, size, local_path, cached_at, accessed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(contact_id)
        .bind(content_type)
        .bind(i64::try_from(data.len()).unwrap_or(i64::MAX))
        .bind(local_path.to_string_lossy().into_owned())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&local_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Retrieves a photo's bytes and content type.
    ///
    /// Expired entries and entries whose file is gone are deleted and
    /// reported as `Ok(None)`, so callers simply refetch.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn get(&self, contact_id: &str) -> Result<Option<(Vec<u8>, String)>> {
        let row = sqlx::query(
            "SELECT content_type, local_path, cached_at FROM photos WHERE contact_id = ?",
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let content_type: String = row.get("content_type");
        let local_path: String = row.get("local_path");
        let cached_at: i64 = row.get("cached_at");

        if self.expired(cached_at) {
            debug!("Photo for contact {contact_id} expired");
            self.delete(contact_id).await?;
            return Ok(None);
        }

        let data = match tokio::fs::read(&local_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.delete(contact_id).await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query("UPDATE photos SET accessed_at = ? WHERE contact_id = ?")
            .bind(Utc::now().timestamp())
            .bind(contact_id)
            .execute(&self.pool)
            .await?;

        Ok(Some((data, content_type)))
    }

    /// Whether a non-expired photo row exists for the contact.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_valid(&self, contact_id: &str) -> Result<bool> {
        let cached_at: Option<i64> =
            sqlx::query_scalar("SELECT cached_at FROM photos WHERE contact_id = ?")
                .bind(contact_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cached_at.is_some_and(|secs| !self.expired(secs)))
    }

    /// Deletes a photo and its file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, contact_id: &str) -> Result<()> {
        let local_path: Option<String> =
            sqlx::query_scalar("SELECT local_path FROM photos WHERE contact_id = ?")
                .bind(contact_id)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(path) = local_path {
            let _ = tokio::fs::remove_file(&path).await;
        }
        sqlx::query("DELETE FROM photos WHERE contact_id = ?")
            .bind(contact_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes every photo older than the TTL. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn prune(&self) -> Result<usize> {
        #[allow(clippy::cast_possible_wrap)]
        let cutoff = Utc::now().timestamp() - self.ttl.as_secs() as i64;

        let rows = sqlx::query("SELECT local_path FROM photos WHERE cached_at < ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(0);
        }
        for row in &rows {
            let path: String = row.get("local_path");
            let _ = tokio::fs::remove_file(&path).await;
        }

        sqlx::query("DELETE FROM photos WHERE cached_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        debug!("Pruned {} expired photos", rows.len());
        Ok(rows.len())
    }

    /// Removes files in the photo directory with no metadata row. Returns the
    /// number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query or directory read fails.
    pub async fn remove_orphaned(&self) -> Result<usize> {
        let known: Vec<String> = sqlx::query_scalar("SELECT contact_id FROM photos")
            .fetch_all(&self.pool)
            .await?;
        let known: std::collections::HashSet<String> = known.into_iter().collect();

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !known.contains(&name) {
                let _ = tokio::fs::remove_file(entry.path()).await;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of cached photos.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM photos")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Total photo size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn total_size(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM photos")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Cache statistics: count, size, TTL, age range.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn stats(&self) -> Result<PhotoStats> {
        let count = self.count().await?;
        let total_size = self.total_size().await?;
        let oldest: Option<i64> = sqlx::query_scalar("SELECT MIN(cached_at) FROM photos")
            .fetch_one(&self.pool)
            .await?;
        let newest: Option<i64> = sqlx::query_scalar("SELECT MAX(cached_at) FROM photos")
            .fetch_one(&self.pool)
            .await?;

        Ok(PhotoStats {
            count,
            total_size,
            ttl_days: self.ttl.as_secs() / (24 * 60 * 60),
            oldest: oldest.map(timestamp),
            newest: newest.map(timestamp),
        })
    }

    fn expired(&self, cached_at: i64) -> bool {
        #[allow(clippy::cast_possible_wrap)]
        let ttl = self.ttl.as_secs() as i64;
        Utc::now().timestamp() - cached_at > ttl
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn store(dir: &tempfile::TempDir, ttl: Duration) -> PhotoStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        PhotoStore::new(pool, dir.path(), ttl).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_photo_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, DEFAULT_PHOTO_TTL).await;

        store.put("c1", "image/png", b"pngbytes").await.unwrap();
        let (data, content_type) = store.get("c1").await.unwrap().unwrap();
        assert_eq!(data, b"pngbytes");
        assert_eq!(content_type, "image/png");
        assert!(store.is_valid("c1").await.unwrap());
        assert!(store.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_photo_self_heals_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, Duration::from_secs(60)).await;

        store.put("c1", "image/png", b"old").await.unwrap();
        sqlx::query("UPDATE photos SET cached_at = cached_at - 3600")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(!store.is_valid("c1").await.unwrap());
        assert!(store.get("c1").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!dir.path().join("photos/c1").exists());
    }

    #[tokio::test]
    async fn missing_file_self_heals_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, DEFAULT_PHOTO_TTL).await;

        store.put("c1", "image/jpeg", b"jpg").await.unwrap();
        tokio::fs::remove_file(dir.path().join("photos/c1"))
            .await
            .unwrap();

        assert!(store.get("c1").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prune_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, Duration::from_secs(3600)).await;

        store.put("stale", "image/png", b"a").await.unwrap();
        store.put("fresh", "image/png", b"b").await.unwrap();
        sqlx::query("UPDATE photos SET cached_at = cached_at - 7200 WHERE contact_id = 'stale'")
            .execute(&store.pool)
            .await
            .unwrap();

        assert_eq!(store.prune().await.unwrap(), 1);
        assert!(store.get("fresh").await.unwrap().is_some());
        assert_eq!(store.prune().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remove_orphaned_keeps_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, DEFAULT_PHOTO_TTL).await;

        store.put("c1", "image/png", b"kept").await.unwrap();
        tokio::fs::write(dir.path().join("photos/stray"), b"x")
            .await
            .unwrap();

        assert_eq!(store.remove_orphaned().await.unwrap(), 1);
        assert!(store.get("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stats_reports_ttl_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, Duration::ZERO).await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.ttl_days, 30);
        assert_eq!(stats.count, 0);
        assert!(stats.oldest.is_none());
    }
}
