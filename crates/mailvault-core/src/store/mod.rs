//! Per-account store management.
//!
//! [`StoreManager`] owns one SQLite file per account under a shared base
//! directory; [`EncryptedStoreManager`] layers optional at-rest encryption on
//! top, keeping keys in the system keyring.

mod copy;
mod encrypted;
mod keys;
mod manager;

pub use encrypted::EncryptedStoreManager;
pub use keys::{delete_key, get_or_create_key};
pub use manager::{sanitize_account_id, StoreManager, StoreStats};
