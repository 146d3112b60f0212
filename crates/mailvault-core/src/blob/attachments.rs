//! Content-addressed attachment cache.
//!
//! Attachment bytes live on disk under a two-level hash tree
//! (`<base>/attachments/<hash[0..2]>/<hash>`), keyed by the SHA-256 of the
//! content so identical attachments share one file. Metadata rows live in the
//! account store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::emails::timestamp;
use crate::{Error, Result};

/// Streaming copy buffer size.
const COPY_BUF_LEN: usize = 64 * 1024;

/// Pruning stops once total size is back under this share of the budget.
const PRUNE_TARGET_PERCENT: u64 = 80;

const ATTACHMENT_COLUMNS: &str =
    "id, email_id, filename, content_type, size, hash, local_path, cached_at, accessed_at";

/// Metadata for one cached attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedAttachment {
    /// Provider attachment id.
    pub id: String,
    /// Email the attachment belongs to.
    pub email_id: String,
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Content size in bytes; set by [`AttachmentStore::put`].
    pub size: i64,
    /// SHA-256 of the content, hex-encoded; set by [`AttachmentStore::put`].
    pub hash: String,
    /// Path of the backing file; set by [`AttachmentStore::put`].
    pub local_path: String,
    /// When the content was cached.
    pub cached_at: DateTime<Utc>,
    /// When the content was last read.
    pub accessed_at: DateTime<Utc>,
}

/// Attachment cache statistics.
#[derive(Debug, Clone)]
pub struct AttachmentStats {
    /// Number of metadata rows.
    pub count: i64,
    /// Total tracked content size in bytes.
    pub total_size: i64,
    /// Configured budget in bytes.
    pub max_size: i64,
    /// Percentage of the budget in use.
    pub usage_percent: f64,
    /// Oldest cache instant, if any rows exist.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest cache instant, if any rows exist.
    pub newest: Option<DateTime<Utc>>,
}

/// Content-addressed attachment cache over one account store.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    pool: SqlitePool,
    base_path: PathBuf,
    max_size: i64,
}

impl AttachmentStore {
    /// Creates the attachment table, its indexes, and the on-disk directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created or the directory
    /// cannot be made.
    pub async fn new(pool: SqlitePool, base_path: &Path, max_size_mb: u64) -> Result<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                email_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT,
                size INTEGER NOT NULL,
                hash TEXT NOT NULL,
                local_path TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                accessed_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_attachments_email ON attachments(email_id)",
            "CREATE INDEX IF NOT EXISTS idx_attachments_hash ON attachments(hash)",
            "CREATE INDEX IF NOT EXISTS idx_attachments_accessed ON attachments(accessed_at)",
        ] {
            sqlx::query(statement).execute(&pool).await?;
        }

        let base_path = base_path.join("attachments");
        tokio::fs::create_dir_all(&base_path).await?;

        #[allow(clippy::cast_possible_wrap)]
        let max_size = (max_size_mb * 1024 * 1024) as i64;
        Ok(Self {
            pool,
            base_path,
            max_size,
        })
    }

    /// Streams content into the cache, filling in the hash, size, path, and
    /// timestamps on the passed metadata.
    ///
    /// Content whose hash is already present is deduplicated: the new bytes
    /// are discarded and the metadata row points at the existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, writing, or the metadata upsert fails.
    pub async fn put<R>(&self, attachment: &mut CachedAttachment, mut content: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let temp_path = self
            .base_path
            .join(format!("temp-{:08x}", rand::random::<u32>()));
        let mut temp_file = tokio::fs::File::create(&temp_path).await?;

        let mut hasher = Sha256::new();
        let mut size: i64 = 0;
        let mut buf = vec![0u8; COPY_BUF_LEN];
        let write_result = loop {
            match content.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    hasher.update(&buf[..n]);
                    size += n as i64;
                    if let Err(e) = temp_file.write_all(&buf[..n]).await {
                        break Err(e);
                    }
                }
                Err(e) => break Err(e),
            }
        };
        let flush_result = temp_file.flush().await;
        drop(temp_file);
        if let Err(e) = write_result.and(flush_result) {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        let hash = hex::encode(hasher.finalize());
        let final_path = self.content_path(&hash);
        if tokio::fs::try_exists(&final_path).await? {
            // Same bytes already cached; drop the duplicate.
            tokio::fs::remove_file(&temp_path).await?;
            debug!("Attachment content {hash} already cached");
        } else {
            if let Some(parent) = final_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(&temp_path, &final_path).await?;
        }

        let now = Utc::now();
        attachment.hash = hash;
        attachment.size = size;
        attachment.local_path = final_path.to_string_lossy().into_owned();
        attachment.cached_at = now;
        attachment.accessed_at = now;

        sqlx::query(
            "INSERT OR REPLACE INTO attachments
             (id, email_id, filename, content_type, size, hash, local_path, cached_at, accessed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&attachment.id)
        .bind(&attachment.email_id)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(attachment.size)
        .bind(&attachment.hash)
        .bind(&attachment.local_path)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieves attachment metadata by id, bumping its accessed time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CachedAttachment>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("UPDATE attachments SET accessed_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Some(read_attachment(&row)))
    }

    /// Retrieves attachment metadata by content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<CachedAttachment>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE hash = ?"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(read_attachment))
    }

    /// Opens the backing file for reading.
    ///
    /// # Errors
    ///
    /// Returns `Ok(None)` when no metadata row exists, but
    /// [`Error::BlobMissing`] when the row exists and its file is gone.
    pub async fn open(&self, id: &str) -> Result<Option<tokio::fs::File>> {
        let Some(attachment) = self.get(id).await? else {
            return Ok(None);
        };
        match tokio::fs::File::open(&attachment.local_path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::BlobMissing {
                path: attachment.local_path,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists attachment metadata for an email, ordered by filename.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_by_email(&self, email_id: &str) -> Result<Vec<CachedAttachment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE email_id = ? ORDER BY filename ASC"
        ))
        .bind(email_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(read_attachment).collect())
    }

    /// Deletes a metadata row, removing the backing file only when no other
    /// row references the same hash.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails. Missing ids are a
    /// silent no-op.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let row = sqlx::query("SELECT hash, local_path FROM attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(());
        };
        let hash: String = row.get("hash");
        let local_path: String = row.get("local_path");

        let others: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attachments WHERE hash = ? AND id != ?")
                .bind(&hash)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        sqlx::query("DELETE FROM attachments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if others == 0 {
            let _ = tokio::fs::remove_file(&local_path).await;
        }
        Ok(())
    }

    /// Deletes every attachment belonging to an email.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub async fn delete_by_email(&self, email_id: &str) -> Result<()> {
        for attachment in self.list_by_email(email_id).await? {
            self.delete(&attachment.id).await?;
        }
        Ok(())
    }

    /// Evicts least-recently-accessed attachments until total size is at or
    /// under 80% of the budget. Returns the number evicted; a store already
    /// within budget evicts nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn prune(&self) -> Result<usize> {
        let mut current = self.total_size().await?;
        if current <= self.max_size {
            return Ok(0);
        }

        #[allow(clippy::cast_possible_wrap)]
        let target = self.max_size / 100 * PRUNE_TARGET_PERCENT as i64;
        let rows = sqlx::query("SELECT id, size FROM attachments ORDER BY accessed_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut evicted = 0;
        for row in &rows {
            if current <= target {
                break;
            }
            let id: String = row.get("id");
            let size: i64 = row.get("size");
            self.delete(&id).await?;
            current -= size;
            evicted += 1;
        }
        debug!("Pruned {evicted} attachments");
        Ok(evicted)
    }

    /// Evicts least-recently-accessed attachments until at least
    /// `bytes_to_free` bytes are freed. Returns the number evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn lru_evict(&self, bytes_to_free: i64) -> Result<usize> {
        let rows = sqlx::query("SELECT id, size FROM attachments ORDER BY accessed_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut freed: i64 = 0;
        let mut evicted = 0;
        for row in &rows {
            if freed >= bytes_to_free {
                break;
            }
            let id: String = row.get("id");
            let size: i64 = row.get("size");
            self.delete(&id).await?;
            freed += size;
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Removes files under the hash tree whose hash no row references,
    /// along with temp files stranded by an interrupted write.
    /// Returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query or directory walk fails.
    pub async fn remove_orphaned(&self) -> Result<usize> {
        let known: Vec<String> = sqlx::query_scalar("SELECT DISTINCT hash FROM attachments")
            .fetch_all(&self.pool)
            .await?;
        let known: std::collections::HashSet<String> = known.into_iter().collect();

        let mut removed = 0;
        let mut shards = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                // A crash between the temp write and the rename leaves the
                // temp file at the top level of the tree.
                let name = shard.file_name().to_string_lossy().into_owned();
                if name.starts_with("temp-") {
                    let _ = tokio::fs::remove_file(shard.path()).await;
                    removed += 1;
                }
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name().to_string_lossy().into_owned();
                if !known.contains(&name) {
                    let _ = tokio::fs::remove_file(file.path()).await;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Total tracked content size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn total_size(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM attachments")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Number of metadata rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM attachments")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Cache statistics: row count, sizes, budget usage, age range.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn stats(&self) -> Result<AttachmentStats> {
        let count = self.count().await?;
        let total_size = self.total_size().await?;
        let oldest: Option<i64> = sqlx::query_scalar("SELECT MIN(cached_at) FROM attachments")
            .fetch_one(&self.pool)
            .await?;
        let newest: Option<i64> = sqlx::query_scalar("SELECT MAX(cached_at) FROM attachments")
            .fetch_one(&self.pool)
            .await?;

        #[allow(clippy::cast_precision_loss)]
        let usage_percent = if self.max_size > 0 {
            total_size as f64 / self.max_size as f64 * 100.0
        } else {
            0.0
        };

        Ok(AttachmentStats {
            count,
            total_size,
            max_size: self.max_size,
            usage_percent,
            oldest: oldest.map(timestamp),
            newest: newest.map(timestamp),
        })
    }

    fn content_path(&self, hash: &str) -> PathBuf {
        self.base_path.join(&hash[..2]).join(hash)
    }
}

fn read_attachment(row: &SqliteRow) -> CachedAttachment {
    CachedAttachment {
        id: row.get("id"),
        email_id: row.get("email_id"),
        filename: row.get("filename"),
        content_type: row
            .get::<Option<String>, _>("content_type")
            .unwrap_or_default(),
        size: row.get("size"),
        hash: row.get("hash"),
        local_path: row.get("local_path"),
        cached_at: timestamp(row.get("cached_at")),
        accessed_at: timestamp(row.get("accessed_at")),
    }
}
