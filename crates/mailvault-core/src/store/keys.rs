//! Encryption key storage using the system keyring.
//!
//! Per-account store keys live in the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Keys are 256-bit random values, hex-encoded for storage.

use keyring::Entry;
use rand::RngCore;
use tracing::{debug, warn};

use crate::Result;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailvault-cache";

/// Key length in bytes (256-bit).
const KEY_LEN: usize = 32;

/// Returns the stored key for an account, generating and persisting a fresh
/// one on first use.
///
/// # Errors
///
/// Returns an error if the keyring is unavailable or the write fails.
pub fn get_or_create_key(account_id: &str) -> Result<String> {
    let entry = Entry::new(SERVICE_NAME, account_id)?;
    match entry.get_password() {
        Ok(key) => Ok(key),
        Err(keyring::Error::NoEntry) => {
            let key = generate_key();
            entry.set_password(&key)?;
            debug!("Generated encryption key for account {account_id}");
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the stored key for an account. Missing entries are not an error.
///
/// # Errors
///
/// Returns an error if the keyring delete fails for a reason other than the
/// entry not existing.
pub fn delete_key(account_id: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, account_id)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort key deletion for cleanup paths; failures are logged, not returned.
pub(crate) fn delete_key_best_effort(account_id: &str) {
    if let Err(e) = delete_key(account_id) {
        warn!("Failed to delete encryption key for account {account_id}: {e}");
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_hex_and_unique() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), KEY_LEN * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    // Exercises the real keyring; only meaningful on a desktop session.
    #[test]
    #[ignore = "requires a system keyring"]
    fn round_trips_through_keyring() {
        let account = "mailvault-test-account";
        let created = get_or_create_key(account).unwrap();
        let fetched = get_or_create_key(account).unwrap();
        assert_eq!(created, fetched);
        delete_key(account).unwrap();
        delete_key(account).unwrap();
    }
}
