//! Persisted UI preferences.

use std::sync::Arc;

use serde_json::Value;
use staxtrade_core::PortalMode;
use tracing::debug;

use crate::storage::{KeyValueStorage, StorageError, load};

pub const PORTAL_MODE_KEY: &str = "portal_mode";

/// Which portal (admin or customer) the user last switched to.
#[derive(Clone)]
pub struct PortalModeStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl PortalModeStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Stored mode, or [`PortalMode::Admin`] when unset or unreadable.
    #[must_use]
    pub fn get(&self) -> PortalMode {
        load::<PortalMode>(self.storage.as_ref(), PORTAL_MODE_KEY).unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the mode could not be persisted.
    pub fn set(&self, mode: PortalMode) -> Result<(), StorageError> {
        self.storage
            .set(PORTAL_MODE_KEY, Value::String(mode.to_string()))?;
        debug!(%mode, "Portal mode stored");
        Ok(())
    }

    /// Switch to the other mode and return it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the mode could not be persisted.
    pub fn toggle(&self) -> Result<PortalMode, StorageError> {
        let next = self.get().toggled();
        self.set(next)?;
        Ok(next)
    }
}
