//! Ordered writes to a [`StateStore`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{PersistedState, StateStore};
use crate::error::PersistenceError;

/// Serializes writes from the session and cart managers.
///
/// Each write builds its snapshot only after it holds the write lane, so the
/// blob that lands last always reflects the newest in-memory state even when
/// an earlier write was slow.
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn StateStore>,
    lane: Arc<Mutex<()>>,
}

impl Persister {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            lane: Arc::new(Mutex::new(())),
        }
    }

    /// Load and decode the stored record.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Unavailable` if the store cannot be read and
    /// `PersistenceError::Corrupt` if the blob does not decode.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let _lane = self.lane.lock().await;
        match self.store.load().await? {
            Some(blob) => PersistedState::decode(&blob).map(Some),
            None => Ok(None),
        }
    }

    /// Write the snapshot returned by `snapshot`, taken once the lane is held.
    ///
    /// A snapshot with no session and an empty cart clears the store instead.
    ///
    /// # Errors
    ///
    /// Returns the store's `PersistenceError`; the previous blob is intact.
    pub async fn save_with<F>(&self, snapshot: F) -> Result<(), PersistenceError>
    where
        F: FnOnce() -> PersistedState + Send,
    {
        let _lane = self.lane.lock().await;
        let state = snapshot();
        if state.session.is_none() && state.cart.is_empty() {
            debug!("Nothing to persist, clearing store");
            return self.store.clear().await;
        }

        let blob = state.encode()?;
        debug!(bytes = blob.len(), items = state.cart.len(), "Persisting state");
        self.store.save(&blob).await
    }

    /// Remove the stored record.
    ///
    /// # Errors
    ///
    /// Returns the store's `PersistenceError`.
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        let _lane = self.lane.lock().await;
        self.store.clear().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reboul_core::{Cart, CurrencyCode, DisplayMeta, ItemKey, Price, Quantity};

    use super::*;
    use crate::store::MemoryStore;

    fn cart_with(key: &str) -> Cart {
        let mut cart = Cart::anonymous();
        cart.add(
            ItemKey::parse(key).unwrap(),
            Quantity::ONE,
            Price::zero(CurrencyCode::EUR),
            DisplayMeta::default(),
        )
        .unwrap();
        cart
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());
        let cart = cart_with("k1");

        persister
            .save_with(|| PersistedState::new(None, cart.clone()))
            .await
            .unwrap();
        let loaded = persister.load().await.unwrap().unwrap();
        assert_eq!(loaded.cart, cart);
    }

    #[tokio::test]
    async fn test_empty_snapshot_clears() {
        let store = Arc::new(MemoryStore::with_blob("{}"));
        let persister = Persister::new(store.clone());
        persister
            .save_with(PersistedState::default)
            .await
            .unwrap();
        assert_eq!(store.blob(), None);
    }

    #[tokio::test]
    async fn test_corrupt_blob_reported() {
        let persister = Persister::new(Arc::new(MemoryStore::with_blob("{broken")));
        assert!(matches!(
            persister.load().await,
            Err(PersistenceError::Corrupt(_))
        ));
    }
}
