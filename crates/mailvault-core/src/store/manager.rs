//! Per-account store lifecycle: open, close, clear, enumerate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::schema::init_schema;
use crate::{Error, Result};

/// Maximum connections per account pool.
const MAX_CONNECTIONS: u32 = 5;

/// How a store file is opened: plaintext or through the encrypting layer.
#[derive(Debug, Clone)]
pub(crate) enum StoreBackend {
    /// Plain SQLite file with WAL journaling.
    Plain,
    /// SQLCipher-encrypted file; the key pragma is applied before any read.
    Encrypted {
        /// Hex-encoded 256-bit key.
        key: String,
    },
}

impl StoreBackend {
    pub(crate) fn connect_options(&self, path: &std::path::Path) -> Result<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| Error::Config(format!("invalid store path {}: {e}", path.display())))?
            .create_if_missing(true)
            .pragma("synchronous", "NORMAL")
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "MEMORY")
            .pragma("mmap_size", "268435456");
        Ok(match self {
            Self::Plain => options.pragma("journal_mode", "WAL"),
            // SQLCipher raw-key form; sqlx applies the key pragma before any
            // other pragma touches the file.
            Self::Encrypted { key } => options.pragma("key", format!("\"x'{key}'\"")),
        })
    }

    /// Maps an open-time failure to the right error for this backend. A wrong
    /// key surfaces as `KeyVerification`, everything else passes through.
    pub(crate) fn open_error(&self, account_id: &str, source: sqlx::Error) -> Error {
        match self {
            Self::Plain => source.into(),
            Self::Encrypted { .. } => Error::KeyVerification {
                account: account_id.to_string(),
                source,
            },
        }
    }
}

/// Summary statistics for one account store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Size of the store file on disk, in bytes.
    pub file_size_bytes: u64,
    /// Number of cached emails.
    pub email_count: i64,
    /// Number of cached events.
    pub event_count: i64,
    /// Number of cached contacts.
    pub contact_count: i64,
    /// Most recent sync instant across all resources, if any.
    pub last_sync: Option<DateTime<Utc>>,
}

/// Manages one SQLite store per account under a shared base directory.
///
/// Pools are created lazily on first [`open`](Self::open) and reused for the
/// lifetime of the manager.
#[derive(Debug)]
pub struct StoreManager {
    config: StoreConfig,
    pools: RwLock<HashMap<String, SqlitePool>>,
}

impl StoreManager {
    /// Creates a manager rooted at the configured base directory, creating the
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be created.
    pub fn new(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_path)?;
        Ok(Self {
            config,
            pools: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the manager configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens (or returns the already-open) store for an account.
    ///
    /// Concurrent first opens of the same account produce a single shared pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or its schema cannot
    /// be initialized.
    pub async fn open(&self, account_id: &str) -> Result<SqlitePool> {
        self.open_with(account_id, &StoreBackend::Plain).await
    }

    pub(crate) async fn open_with(
        &self,
        account_id: &str,
        backend: &StoreBackend,
    ) -> Result<SqlitePool> {
        if let Some(pool) = self.pools.read().await.get(account_id) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write().await;
        // Another task may have opened it while we waited for the write lock.
        if let Some(pool) = pools.get(account_id) {
            return Ok(pool.clone());
        }

        let path = self.store_path(account_id);
        let pool = match SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(backend.connect_options(&path)?)
            .await
        {
            Ok(pool) => pool,
            Err(e) => return Err(backend.open_error(account_id, e)),
        };

        // First real read against the file. With the encrypting backend a
        // wrong key shows up here or at connect, before any schema work.
        if let Err(e) = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await
        {
            pool.close().await;
            return Err(backend.open_error(account_id, e));
        }

        if let Err(e) = init_schema(&pool).await {
            pool.close().await;
            return Err(e);
        }

        info!("Opened store for account {account_id} at {}", path.display());
        pools.insert(account_id.to_string(), pool.clone());
        Ok(pool)
    }

    /// Closes the pooled store for an account, if open.
    pub async fn close(&self, account_id: &str) {
        if let Some(pool) = self.pools.write().await.remove(account_id) {
            pool.close().await;
            debug!("Closed store for account {account_id}");
        }
    }

    /// Closes every open store.
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (account_id, pool) in pools.drain() {
            pool.close().await;
            debug!("Closed store for account {account_id}");
        }
    }

    /// Closes and deletes the store file for an account, including journal
    /// side files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file removal fails.
    pub async fn clear_cache(&self, account_id: &str) -> Result<()> {
        self.close(account_id).await;
        let path = self.store_path(account_id);
        remove_store_files(&path)?;
        info!("Cleared cache for account {account_id}");
        Ok(())
    }

    /// Closes all stores and deletes every store file in the base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a removal fails.
    pub async fn clear_all_caches(&self) -> Result<()> {
        self.close_all().await;
        for entry in std::fs::read_dir(&self.config.base_path)? {
            let path = entry?.path();
            let is_store = path.extension().is_some_and(|ext| ext == "db");
            if is_store {
                remove_store_files(&path)?;
            }
        }
        info!("Cleared all account caches");
        Ok(())
    }

    /// Lists account ids that have a store file on disk.
    ///
    /// Separator characters substituted by sanitization are not recovered; the
    /// returned ids are the sanitized forms.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be read.
    pub fn list_cached_accounts(&self) -> Result<Vec<String>> {
        let mut accounts = Vec::new();
        for entry in std::fs::read_dir(&self.config.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "db") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    accounts.push(stem.to_string());
                }
            }
        }
        accounts.sort();
        Ok(accounts)
    }

    /// Returns size and row-count statistics for an account store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub async fn stats(&self, account_id: &str) -> Result<StoreStats> {
        let pool = self.open(account_id).await?;
        self.stats_for(account_id, &pool).await
    }

    pub(crate) async fn stats_for(
        &self,
        account_id: &str,
        pool: &SqlitePool,
    ) -> Result<StoreStats> {
        let file_size_bytes = std::fs::metadata(self.store_path(account_id))
            .map(|m| m.len())
            .unwrap_or(0);

        let email_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
            .fetch_one(pool)
            .await?;
        let event_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(pool)
            .await?;
        let contact_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(pool)
            .await?;
        let last_sync: Option<i64> = sqlx::query_scalar("SELECT MAX(last_sync) FROM sync_state")
            .fetch_one(pool)
            .await?;

        Ok(StoreStats {
            file_size_bytes,
            email_count,
            event_count,
            contact_count,
            last_sync: last_sync.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }

    /// Full path of the store file for an account.
    #[must_use]
    pub fn store_path(&self, account_id: &str) -> PathBuf {
        self.config
            .base_path
            .join(format!("{}.db", sanitize_account_id(account_id)))
    }
}

/// Replaces path separator characters so an account id cannot escape the base
/// directory.
#[must_use]
pub fn sanitize_account_id(account_id: &str) -> String {
    account_id.replace(['/', '\\', ':'], "_")
}

fn remove_store_files(path: &std::path::Path) -> Result<()> {
    for candidate in [
        path.to_path_buf(),
        path.with_extension("db-wal"),
        path.with_extension("db-shm"),
    ] {
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {e}", candidate.display());
                return Err(e.into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn manager(dir: &tempfile::TempDir) -> StoreManager {
        StoreManager::new(StoreConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn sanitizes_path_separators() {
        assert_eq!(
            sanitize_account_id("user@example.com/../../etc"),
            "user@example.com_.._.._etc"
        );
        assert_eq!(sanitize_account_id("imap://host:993"), "imap___host_993");
        assert_eq!(sanitize_account_id("plain"), "plain");
    }

    proptest::proptest! {
        #[test]
        fn sanitized_ids_never_contain_separators(id in "[a-zA-Z0-9@._/\\\\:-]{1,64}") {
            let sanitized = sanitize_account_id(&id);
            proptest::prop_assert!(!sanitized.contains(['/', '\\', ':']));
            proptest::prop_assert_eq!(sanitized.len(), id.len());
        }
    }

    #[tokio::test]
    async fn opens_and_lists_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        manager.open("alice@example.com").await.unwrap();
        manager.open("bob/work").await.unwrap();

        let accounts = manager.list_cached_accounts().unwrap();
        assert_eq!(accounts, vec!["alice@example.com", "bob_work"]);
    }

    #[tokio::test]
    async fn concurrent_opens_share_one_pool() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.open("shared@example.com").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(manager.pools.read().await.len(), 1);
    }

    #[tokio::test]
    async fn encrypted_store_is_opaque_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let backend = StoreBackend::Encrypted {
            key: "11".repeat(32),
        };

        let pool = manager.open_with("sealed@example.com", &backend).await.unwrap();
        sqlx::query(
            "INSERT INTO emails (id, subject, date, cached_at) VALUES ('e1', 'quarterly numbers', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        manager.close("sealed@example.com").await;

        let bytes = std::fs::read(manager.store_path("sealed@example.com")).unwrap();
        assert!(!bytes.starts_with(b"SQLite format 3"));
        let needle = b"quarterly numbers";
        assert!(!bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn wrong_key_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let backend = StoreBackend::Encrypted {
            key: "11".repeat(32),
        };
        manager.open_with("sealed@example.com", &backend).await.unwrap();
        manager.close("sealed@example.com").await;

        let other = StoreBackend::Encrypted {
            key: "22".repeat(32),
        };
        let err = manager
            .open_with("sealed@example.com", &other)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyVerification { .. }));
    }

    #[tokio::test]
    async fn clear_cache_removes_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        manager.open("gone@example.com").await.unwrap();
        let path = manager.store_path("gone@example.com");
        assert!(path.exists());

        manager.clear_cache("gone@example.com").await.unwrap();
        assert!(!path.exists());
        assert!(manager.list_cached_accounts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let pool = manager.open("stats@example.com").await.unwrap();

        sqlx::query(
            "INSERT INTO emails (id, subject, date, cached_at) VALUES ('e1', 'hi', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let stats = manager.stats("stats@example.com").await.unwrap();
        assert_eq!(stats.email_count, 1);
        assert_eq!(stats.event_count, 0);
        assert!(stats.last_sync.is_none());
    }
}
