//! Persistent store adapter.
//!
//! The session and cart are saved together as one JSON record:
//!
//! ```json
//! { "version": 1, "session": { ... } | null, "cart": { ... } }
//! ```
//!
//! Missing fields fall back to defaults and unknown fields are ignored, so
//! blobs written by older or newer builds still load.

mod file;
mod memory;
mod persister;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use persister::Persister;

use async_trait::async_trait;
use reboul_core::{Cart, Session};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Current layout version of the persisted record.
pub const SCHEMA_VERSION: u32 = 1;

/// Key-value storage for the serialized client state.
///
/// Implementations must make `save` atomic from the caller's view: the new
/// blob fully replaces the previous one, or the call fails and the previous
/// blob is left intact.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the stored blob, `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<String>, PersistenceError>;

    /// Replace the stored blob.
    async fn save(&self, blob: &str) -> Result<(), PersistenceError>;

    /// Remove the stored blob. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), PersistenceError>;
}

/// Everything that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Layout version the record was written with.
    #[serde(default = "default_version")]
    pub version: u32,
    /// The logged-in customer, if any.
    #[serde(default)]
    pub session: Option<Session>,
    /// The cart, owned by the session's user or an anonymous scope.
    #[serde(default)]
    pub cart: Cart,
}

const fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl PersistedState {
    /// Build a record at the current layout version.
    #[must_use]
    pub const fn new(session: Option<Session>, cart: Cart) -> Self {
        Self {
            version: SCHEMA_VERSION,
            session,
            cart,
        }
    }

    /// Serialize the record.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(|e| PersistenceError::Encode(e.to_string()))
    }

    /// Deserialize a record.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Corrupt` if the blob is not a valid record.
    pub fn decode(blob: &str) -> Result<Self, PersistenceError> {
        let state: Self =
            serde_json::from_str(blob).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        if state.version > SCHEMA_VERSION {
            tracing::warn!(
                version = state.version,
                supported = SCHEMA_VERSION,
                "Persisted state was written by a newer client, reading leniently"
            );
        }
        Ok(state)
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new(None, Cart::anonymous())
    }
}
