//! Persistent access/refresh token pair.
//!
//! Tokens live in [`KeyValueStorage`] under `access` and `refresh` and are
//! read back on every call, so storage is the single source of truth for
//! whether the user is signed in. Token values are wrapped in
//! [`SecretString`] and never logged.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info};

use crate::storage::{KeyValueStorage, StorageError, load};

pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";

/// Tokens issued by a login.
#[derive(Clone)]
pub struct TokenPair {
    pub access: SecretString,
    pub refresh: SecretString,
}

impl TokenPair {
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: SecretString::from(access.into()),
            refresh: SecretString::from(refresh.into()),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

/// The tokens currently held, either of which may be absent.
#[derive(Clone, Default)]
pub struct Session {
    pub access: Option<SecretString>,
    pub refresh: Option<SecretString>,
}

impl Session {
    /// Whether requests will carry a bearer token.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.access.is_some()
    }

    /// Whether a refresh can be attempted.
    #[must_use]
    pub const fn can_refresh(&self) -> bool {
        self.refresh.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access", &self.access.as_ref().map(|_| "[REDACTED]"))
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Durable token store.
///
/// Clones share one write lock, so a conditional update cannot interleave
/// with a login or logout made through another clone.
#[derive(Clone)]
pub struct PersistentSessionStore {
    storage: Arc<dyn KeyValueStorage>,
    writes: Arc<Mutex<()>>,
}

impl PersistentSessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            writes: Arc::default(),
        }
    }

    /// Read both tokens from storage.
    #[must_use]
    pub fn get(&self) -> Session {
        Session {
            access: self.read(ACCESS_KEY),
            refresh: self.read(REFRESH_KEY),
        }
    }

    /// Current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.read(ACCESS_KEY)
    }

    /// Current refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.read(REFRESH_KEY)
    }

    /// Store a freshly issued token pair, replacing both tokens at once.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the pair could not be persisted; the
    /// previous tokens are left in place.
    pub fn set(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        let _writes = self.lock_writes();
        self.storage.set_many(&[
            (ACCESS_KEY, secret_value(&tokens.access)),
            (REFRESH_KEY, secret_value(&tokens.refresh)),
        ])?;
        info!("Session tokens stored");
        Ok(())
    }

    /// Store a refreshed access token, and the rotated refresh token if the
    /// server issued one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tokens could not be persisted.
    pub fn set_access(
        &self,
        access: &SecretString,
        rotated_refresh: Option<&SecretString>,
    ) -> Result<(), StorageError> {
        let _writes = self.lock_writes();
        self.write_access(access, rotated_refresh)
    }

    /// [`set_access`](Self::set_access), but only while the stored refresh
    /// token is still `expected`. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tokens could not be persisted.
    pub fn set_access_if_current(
        &self,
        expected: &SecretString,
        access: &SecretString,
        rotated_refresh: Option<&SecretString>,
    ) -> Result<bool, StorageError> {
        let _writes = self.lock_writes();
        if !self.holds_refresh(expected) {
            debug!("Refresh token changed, skipping access update");
            return Ok(false);
        }
        self.write_access(access, rotated_refresh)?;
        Ok(true)
    }

    /// Whether the stored refresh token equals `token`.
    #[must_use]
    pub fn holds_refresh(&self, token: &SecretString) -> bool {
        self.refresh_token()
            .is_some_and(|current| current.expose_secret() == token.expose_secret())
    }

    fn write_access(
        &self,
        access: &SecretString,
        rotated_refresh: Option<&SecretString>,
    ) -> Result<(), StorageError> {
        match rotated_refresh {
            Some(refresh) => self.storage.set_many(&[
                (ACCESS_KEY, secret_value(access)),
                (REFRESH_KEY, secret_value(refresh)),
            ])?,
            None => self.storage.set(ACCESS_KEY, secret_value(access))?,
        }
        debug!(rotated = rotated_refresh.is_some(), "Access token updated");
        Ok(())
    }

    /// Remove both tokens in one update.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the removal could not be persisted.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _writes = self.lock_writes();
        self.storage.remove_many(&[ACCESS_KEY, REFRESH_KEY])?;
        info!("Session tokens cleared");
        Ok(())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, key: &str) -> Option<SecretString> {
        load::<String>(self.storage.as_ref(), key)
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
    }
}

impl fmt::Debug for PersistentSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentSessionStore").finish_non_exhaustive()
    }
}

fn secret_value(secret: &SecretString) -> Value {
    Value::String(secret.expose_secret().to_string())
}
