//! Error types for the cache engine.

use thiserror::Error;

/// Errors that can occur in cache operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Secret store (keyring) operation failed.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Configuration value rejected by validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The encryption key did not decrypt the store file.
    #[error("Encryption key verification failed for {account}: {source}")]
    KeyVerification {
        /// Account whose store failed the verification read.
        account: String,
        /// Underlying database error from the verification query.
        source: sqlx::Error,
    },

    /// Store migration between representations failed.
    #[error("Migration failed for {account} during {stage}: {message}")]
    Migration {
        /// Account being migrated.
        account: String,
        /// Migration stage that failed (copy, backup, rename).
        stage: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A blob metadata row exists but its backing file is gone.
    #[error("Blob file missing at {path}")]
    BlobMissing {
        /// Path the metadata row points at.
        path: String,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
