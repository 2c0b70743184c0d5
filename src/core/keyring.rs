//! API key storage for backend endpoints.
//!
//! Keys live in the platform keyring under the `promptpad` service, one entry
//! per endpoint. `PROMPTPAD_API_KEY` is consulted when no entry exists.

use std::error::Error;
use std::fmt;

use keyring::Entry;
use tracing::debug;

use crate::core::backend::BackendConfig;

const KEYRING_SERVICE: &str = "promptpad";
pub const API_KEY_ENV: &str = "PROMPTPAD_API_KEY";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible). Permanent errors surface the underlying
/// cause directly so callers can report them to the user.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Keyring account name for an endpoint. Trailing slashes and case of the
/// scheme and host do not produce separate entries.
pub fn account_for_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(index) => rest.split_at(index),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => trimmed.to_string(),
    }
}

pub struct CredentialStore {
    use_keyring: bool,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self { use_keyring: true }
    }

    /// A store that never touches the platform keyring; only the environment
    /// fallback applies.
    pub fn without_keyring() -> Self {
        Self { use_keyring: false }
    }

    pub fn store_key(&self, endpoint: &str, key: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        let entry = Entry::new(KEYRING_SERVICE, &account_for_endpoint(endpoint))?;
        entry.set_password(key)?;
        Ok(())
    }

    pub fn get_key(&self, endpoint: &str) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        let account = account_for_endpoint(endpoint);
        let entry = Entry::new(KEYRING_SERVICE, &account)?;
        match entry.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => {
                debug!(account, "No keyring entry");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the stored key. Returns false when there was nothing to remove.
    pub fn remove_key(&self, endpoint: &str) -> Result<bool, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(false);
        }
        let entry = Entry::new(KEYRING_SERVICE, &account_for_endpoint(endpoint))?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Attaches the API key for `config.endpoint`, preferring the keyring over
    /// `PROMPTPAD_API_KEY`. A recoverable keyring outage falls through to the
    /// environment.
    pub fn attach_key(&self, config: BackendConfig) -> Result<BackendConfig, KeyringAccessError> {
        let stored = match self.get_key(&config.endpoint) {
            Ok(key) => key,
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, "Keyring unavailable; using environment");
                None
            }
            Err(err) => return Err(err),
        };
        Ok(with_key(config, stored, std::env::var(API_KEY_ENV).ok()))
    }
}

fn with_key(config: BackendConfig, stored: Option<String>, env: Option<String>) -> BackendConfig {
    match stored.or(env.filter(|key| !key.trim().is_empty())) {
        Some(key) => config.with_api_key(key),
        None => config,
    }
}
