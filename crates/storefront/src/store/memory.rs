//! In-process store.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::StateStore;
use crate::error::PersistenceError;

/// Keeps the blob in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with a blob.
    #[must_use]
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    /// The current blob, if any.
    #[must_use]
    pub fn blob(&self) -> Option<String> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self.blob())
    }

    async fn save(&self, blob: &str) -> Result<(), PersistenceError> {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(blob.to_owned());
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = MemoryStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        store.save("{\"version\":1}").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("{\"version\":1}"));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
