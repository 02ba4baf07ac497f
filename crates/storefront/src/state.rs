//! Client state shared across the application.

use std::sync::Arc;

use reboul_core::{Cart, CartItem, DisplayMeta, Price, QuantityChange, Session};
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};

use crate::config::StorefrontConfig;
use crate::error::{AuthError, MutationError, SessionError, StorefrontError};
use crate::notify::{Notification, Notifier};
use crate::remote::{HttpRemoteClient, RemoteSessionClient};
use crate::services::{
    CartManager, LoginOutcome, RestoreOutcome, SessionManager, SessionState, Shared,
};
use crate::store::{FileStore, Persister, StateStore};

/// Entry point of the client core.
///
/// This struct is cheaply cloneable via `Arc`; every clone drives the same
/// session and cart.
#[derive(Clone)]
pub struct Storefront {
    session: SessionManager,
    cart: CartManager,
    notifier: Notifier,
}

impl Storefront {
    /// Create a client from its collaborators.
    ///
    /// # Arguments
    ///
    /// * `remote` - Remote session client
    /// * `store` - Persistent store for the session and cart
    /// * `notification_capacity` - Buffered notifications per subscriber
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteSessionClient>,
        store: Arc<dyn StateStore>,
        notification_capacity: usize,
    ) -> Self {
        let notifier = Notifier::new(notification_capacity);
        let shared = Arc::new(Shared::new(
            remote,
            Persister::new(store),
            notifier.clone(),
        ));

        Self {
            session: SessionManager::new(Arc::clone(&shared)),
            cart: CartManager::new(shared),
            notifier,
        }
    }

    /// Create a client talking HTTP to the configured API and persisting to
    /// the configured state file.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, StorefrontError> {
        let remote = HttpRemoteClient::new(&config.api)?;
        let store = FileStore::new(config.state_path.clone());
        Ok(Self::new(
            Arc::new(remote),
            Arc::new(store),
            config.notification_capacity,
        ))
    }

    /// The session manager.
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The cart manager.
    #[must_use]
    pub const fn cart(&self) -> &CartManager {
        &self.cart
    }

    /// Receive outcome notifications emitted from now on.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Watch session state changes.
    #[must_use]
    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Watch cart changes.
    #[must_use]
    pub fn subscribe_cart(&self) -> watch::Receiver<Cart> {
        self.cart.subscribe()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// See [`SessionManager::login`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for invalid input or a login already running.
    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<LoginOutcome, SessionError> {
        self.session.login(email, password).await
    }

    /// See [`SessionManager::logout`].
    pub async fn logout(&self) {
        self.session.logout().await;
    }

    /// See [`SessionManager::restore`].
    pub async fn restore_session(&self) -> RestoreOutcome {
        self.session.restore().await
    }

    /// See [`SessionManager::verify_session`].
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` when the server could not answer.
    pub async fn verify_session(&self) -> Result<bool, AuthError> {
        self.session.verify_session().await
    }

    /// The logged-in session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session.current_session()
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// See [`CartManager::add_item`].
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Validation` for bad input.
    pub async fn add_item(
        &self,
        item_key: &str,
        quantity: i64,
        unit_price: Price,
        display: DisplayMeta,
    ) -> Result<CartItem, MutationError> {
        self.cart
            .add_item(item_key, quantity, unit_price, display)
            .await
    }

    /// See [`CartManager::update_quantity`].
    ///
    /// # Errors
    ///
    /// Returns `MutationError::NotFound` if the line is absent.
    pub async fn update_quantity(
        &self,
        item_key: &str,
        quantity: i64,
    ) -> Result<QuantityChange, MutationError> {
        self.cart.update_quantity(item_key, quantity).await
    }

    /// See [`CartManager::remove_item`].
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Validation` for a malformed key.
    pub async fn remove_item(&self, item_key: &str) -> Result<Option<CartItem>, MutationError> {
        self.cart.remove_item(item_key).await
    }

    /// See [`CartManager::clear`].
    pub async fn clear_cart(&self) {
        self.cart.clear().await;
    }

    /// See [`CartManager::refresh`].
    pub async fn refresh_cart(&self) -> Option<Cart> {
        self.cart.refresh().await
    }

    /// The current cart.
    #[must_use]
    pub fn cart_snapshot(&self) -> Cart {
        self.cart.snapshot()
    }
}
