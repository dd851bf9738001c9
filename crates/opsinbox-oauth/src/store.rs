//! Token persistence in the platform keyring.
//!
//! Tokens are stored as JSON in the system's native credential store:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Nothing is ever written to disk in plaintext.

use keyring::Entry;
use tracing::debug;

use crate::error::Result;
use crate::token::Token;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "opsinbox";

/// Credential type identifier for `OAuth2` tokens.
const OAUTH_TOKEN_CREDENTIAL: &str = "google_oauth_token";

/// Keyring-backed persistence for one account's OAuth token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    entry_key: String,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Store for the default account.
    #[must_use]
    pub fn new() -> Self {
        Self::for_account("default")
    }

    /// Store for a named account, so multiple inboxes can coexist.
    #[must_use]
    pub fn for_account(account: &str) -> Self {
        Self {
            entry_key: format!("{SERVICE_NAME}_{OAUTH_TOKEN_CREDENTIAL}_{account}"),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Ok(Entry::new(SERVICE_NAME, &self.entry_key)?)
    }

    /// Persists a token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the keyring operation fails.
    pub fn save(&self, token: &Token) -> Result<()> {
        let payload = serde_json::to_string(token)?;
        self.entry()?.set_password(&payload)?;
        debug!(key = %self.entry_key, "Stored OAuth token");
        Ok(())
    }

    /// Loads the persisted token, if one exists.
    ///
    /// A token that fails to deserialize (e.g. written by an incompatible
    /// version) is treated as absent rather than an error, so a fresh login
    /// can always recover.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn load(&self) -> Result<Option<Token>> {
        match self.entry()?.get_password() {
            Ok(payload) => Ok(serde_json::from_str(&payload).ok()),
            Err(keyring::Error::NoEntry) => {
                debug!(key = %self.entry_key, "No stored OAuth token");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the persisted token. Removing an absent token is not an
    /// error, so logout stays idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a token is currently persisted.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.load().is_ok_and(|token| token.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_keys_are_per_account() {
        let a = TokenStore::for_account("work");
        let b = TokenStore::for_account("personal");
        assert_ne!(a.entry_key, b.entry_key);
        assert_eq!(TokenStore::new().entry_key, TokenStore::default().entry_key);
    }
}
