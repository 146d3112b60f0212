//! At-rest encryption layered over [`StoreManager`].
//!
//! When encryption is disabled every call forwards to the plain manager, so
//! callers hold a single type regardless of configuration. When enabled, the
//! per-account key is resolved from the system keyring and passed to the
//! encrypting backend before any read.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::copy::copy_all_tables;
use super::keys;
use super::manager::{StoreBackend, StoreManager, StoreStats};
use crate::config::StoreConfig;
use crate::schema::init_schema;
use crate::{Error, Result};

/// Store manager with optional at-rest encryption.
#[derive(Debug)]
pub struct EncryptedStoreManager {
    inner: StoreManager,
}

impl EncryptedStoreManager {
    /// Creates a manager rooted at the configured base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be created.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Ok(Self {
            inner: StoreManager::new(config)?,
        })
    }

    /// Returns the manager configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        self.inner.config()
    }

    const fn encryption_enabled(&self) -> bool {
        self.inner.config().settings.encryption_enabled
    }

    /// Opens (or returns the already-open) store for an account, resolving the
    /// encryption key first when encryption is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be resolved, the key does not match
    /// the file ([`Error::KeyVerification`]), or the open itself fails.
    pub async fn open(&self, account_id: &str) -> Result<SqlitePool> {
        if !self.encryption_enabled() {
            return self.inner.open(account_id).await;
        }
        let key = keys::get_or_create_key(account_id)?;
        self.inner
            .open_with(account_id, &StoreBackend::Encrypted { key })
            .await
    }

    /// Closes the pooled store for an account, if open.
    pub async fn close(&self, account_id: &str) {
        self.inner.close(account_id).await;
    }

    /// Closes every open store.
    pub async fn close_all(&self) {
        self.inner.close_all().await;
    }

    /// Closes and deletes the store for an account, then best-effort deletes
    /// its encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if a store file removal fails. Key deletion failures
    /// are logged, not propagated.
    pub async fn clear_cache(&self, account_id: &str) -> Result<()> {
        self.inner.clear_cache(account_id).await?;
        if self.encryption_enabled() {
            keys::delete_key_best_effort(account_id);
        }
        Ok(())
    }

    /// Closes all stores and deletes every store file in the base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a removal fails.
    pub async fn clear_all_caches(&self) -> Result<()> {
        if self.encryption_enabled() {
            for account_id in self.inner.list_cached_accounts()? {
                keys::delete_key_best_effort(&account_id);
            }
        }
        self.inner.clear_all_caches().await
    }

    /// Lists account ids that have a store file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be read.
    pub fn list_cached_accounts(&self) -> Result<Vec<String>> {
        self.inner.list_cached_accounts()
    }

    /// Returns size and row-count statistics for an account store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub async fn stats(&self, account_id: &str) -> Result<StoreStats> {
        let pool = self.open(account_id).await?;
        self.inner.stats_for(account_id, &pool).await
    }

    /// Full path of the store file for an account.
    #[must_use]
    pub fn store_path(&self, account_id: &str) -> PathBuf {
        self.inner.store_path(account_id)
    }

    /// Rewrites an account's plaintext store as an encrypted one.
    ///
    /// A no-op when the store file does not exist. The original file survives
    /// as a `.bak` backup until the migrated file is in place; a failure mid
    /// rename restores it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Migration`] naming the failed stage.
    pub async fn migrate_to_encrypted(&self, account_id: &str) -> Result<()> {
        if !self.inner.store_path(account_id).exists() {
            return Ok(());
        }
        let key = keys::get_or_create_key(account_id)?;
        self.migrate(account_id, &StoreBackend::Plain, &StoreBackend::Encrypted { key })
            .await?;
        Ok(())
    }

    /// Rewrites an account's encrypted store as a plaintext one and deletes
    /// the keyring key on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Migration`] naming the failed stage, or
    /// [`Error::KeyVerification`] when the stored key does not open the file.
    pub async fn migrate_to_unencrypted(&self, account_id: &str) -> Result<()> {
        if !self.inner.store_path(account_id).exists() {
            return Ok(());
        }
        let key = keys::get_or_create_key(account_id)?;
        let migrated = self
            .migrate(account_id, &StoreBackend::Encrypted { key }, &StoreBackend::Plain)
            .await?;
        if migrated {
            keys::delete_key(account_id)?;
        }
        Ok(())
    }

    /// Copies the store through a sibling file opened with `dest_backend`,
    /// then swaps it into place. Returns whether a migration happened.
    async fn migrate(
        &self,
        account_id: &str,
        source_backend: &StoreBackend,
        dest_backend: &StoreBackend,
    ) -> Result<bool> {
        let path = self.inner.store_path(account_id);
        if !path.exists() {
            return Ok(false);
        }

        self.inner.close(account_id).await;

        let migrate_path = sibling(&path, "migrate");
        let source = connect(source_backend, account_id, &path, false).await?;
        // The destination uses a rollback journal so every copied page lands
        // in the one file the swap moves; WAL would leave the rows in a side
        // file that close() does not fold back in.
        let dest = match connect(dest_backend, account_id, &migrate_path, true).await {
            Ok(dest) => dest,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let copy_result = async {
            init_schema(&dest).await?;
            copy_all_tables(&source, &dest).await
        }
        .await;

        source.close().await;
        dest.close().await;

        match copy_result {
            Ok(rows) => info!("Copied {rows} rows migrating store for account {account_id}"),
            Err(e) => {
                remove_quietly(&migrate_path);
                return Err(Error::Migration {
                    account: account_id.to_string(),
                    stage: "copy",
                    message: e.to_string(),
                });
            }
        }

        swap_store_files(account_id, &path, &migrate_path)?;
        info!("Migrated store for account {account_id}");
        Ok(true)
    }
}

async fn connect(
    backend: &StoreBackend,
    account_id: &str,
    path: &Path,
    rollback_journal: bool,
) -> Result<SqlitePool> {
    let mut options = backend.connect_options(path)?;
    if rollback_journal {
        options = options.pragma("journal_mode", "DELETE");
    }
    let pool = match SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
    {
        Ok(pool) => pool,
        Err(e) => return Err(backend.open_error(account_id, e)),
    };
    if let Err(e) = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM sqlite_master")
        .fetch_one(&pool)
        .await
    {
        pool.close().await;
        return Err(backend.open_error(account_id, e));
    }
    Ok(pool)
}

/// Renames the migrated file into place, keeping the original as a `.bak`
/// backup until the swap completes. A failed swap puts the original back.
fn swap_store_files(account_id: &str, path: &Path, migrate_path: &Path) -> Result<()> {
    let backup_path = sibling(path, "bak");
    if let Err(e) = std::fs::rename(path, &backup_path) {
        remove_quietly(migrate_path);
        return Err(Error::Migration {
            account: account_id.to_string(),
            stage: "backup",
            message: e.to_string(),
        });
    }
    if let Err(e) = std::fs::rename(migrate_path, path) {
        // Put the original back so the account stays openable.
        if let Err(restore) = std::fs::rename(&backup_path, path) {
            warn!("Failed to restore backup for account {account_id}: {restore}");
        }
        remove_quietly(migrate_path);
        return Err(Error::Migration {
            account: account_id.to_string(),
            stage: "rename",
            message: e.to_string(),
        });
    }

    remove_quietly(&backup_path);
    // Stale journal side files from the pre-migration store must not sit next
    // to the swapped-in file.
    for suffix in ["db-wal", "db-shm"] {
        remove_quietly(&path.with_extension(suffix));
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;

    fn plain_manager(dir: &tempfile::TempDir) -> EncryptedStoreManager {
        EncryptedStoreManager::new(StoreConfig::new(dir.path())).unwrap()
    }

    #[tokio::test]
    async fn disabled_encryption_forwards_to_plain_open() {
        let dir = tempfile::tempdir().unwrap();
        let manager = plain_manager(&dir);

        let pool = manager.open("plain@example.com").await.unwrap();
        sqlx::query("INSERT INTO folders (id, name, folder_type) VALUES ('f1', 'Inbox', 'inbox')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(manager.store_path("plain@example.com").exists());
        assert_eq!(
            manager.list_cached_accounts().unwrap(),
            vec!["plain@example.com"]
        );
    }

    #[tokio::test]
    async fn migration_is_a_noop_without_a_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = plain_manager(&dir);
        manager.migrate_to_encrypted("never-opened").await.unwrap();
        assert!(!manager.store_path("never-opened").exists());
    }

    // Round-trips rows through a same-backend migration. Both directions use
    // the identical copy-and-swap path, so the plain backend exercises it
    // without needing a keyring.
    #[tokio::test]
    async fn migration_preserves_rows_and_swaps_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = plain_manager(&dir);

        let pool = manager.open("mover@example.com").await.unwrap();
        sqlx::query(
            "INSERT INTO emails (id, subject, date, cached_at) VALUES ('e1', 'hi', 10, 10)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO contacts (id, display_name, cached_at) VALUES ('c1', 'Alice', 10)",
        )
        .execute(&pool)
        .await
        .unwrap();

        manager
            .migrate("mover@example.com", &StoreBackend::Plain, &StoreBackend::Plain)
            .await
            .unwrap();

        let path = manager.store_path("mover@example.com");
        assert!(path.exists());
        assert!(!sibling(&path, "bak").exists());
        assert!(!sibling(&path, "migrate").exists());
        assert!(!sibling(&path, "migrate-wal").exists());
        assert!(!sibling(&path, "migrate-shm").exists());

        let pool = manager.open("mover@example.com").await.unwrap();
        let subject: String = sqlx::query_scalar("SELECT subject FROM emails WHERE id = 'e1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(subject, "hi");
        let contacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(contacts, 1);
    }

    #[tokio::test]
    async fn failed_swap_restores_the_original_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = plain_manager(&dir);

        let pool = manager.open("swap@example.com").await.unwrap();
        sqlx::query(
            "INSERT INTO emails (id, subject, date, cached_at) VALUES ('e1', 'keep me', 10, 10)",
        )
        .execute(&pool)
        .await
        .unwrap();
        manager.close("swap@example.com").await;

        // A missing migrated file makes the second rename fail after the
        // original has already moved to its backup name.
        let path = manager.store_path("swap@example.com");
        let missing = sibling(&path, "migrate");
        let err = swap_store_files("swap@example.com", &path, &missing).unwrap_err();
        assert!(matches!(
            err,
            Error::Migration {
                stage: "rename",
                ..
            }
        ));

        assert!(path.exists());
        assert!(!sibling(&path, "bak").exists());

        let pool = manager.open("swap@example.com").await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE subject = 'keep me'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn settings_flag_gates_key_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::new(dir.path());
        config.settings = CacheSettings {
            encryption_enabled: false,
            ..CacheSettings::default()
        };
        let manager = EncryptedStoreManager::new(config).unwrap();
        assert!(!manager.encryption_enabled());
    }
}
