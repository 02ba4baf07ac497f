//! Cart manager.
//!
//! Mutations apply to the in-memory cart immediately and in issue order, are
//! persisted, and are then sent to the server through an outbox when a
//! customer is logged in. The local cart wins during a session: a server
//! rejection is reported but never rolls a change back. The server cart is
//! only taken as authoritative at login and on an explicit refresh.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use reboul_core::{
    AuthToken, Cart, CartItem, CartOwner, DisplayMeta, ItemKey, Price, Quantity, QuantityChange,
    Session,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::{SessionManager, Shared, lock};
use crate::epoch::{Epoch, Ticket};
use crate::error::{self, CartError, MutationError, ValidationError};
use crate::notify::Notification;
use crate::remote::CartOp;

// =============================================================================
// State Cell
// =============================================================================

/// A change waiting to be sent to the server.
struct PendingOp {
    ticket: Ticket,
    token: AuthToken,
    op: CartOp,
}

struct CartCore {
    cart: Cart,
    epoch: Epoch,
    outbox: VecDeque<PendingOp>,
}

/// Authoritative cart state, its change feed and the sync lane.
pub(crate) struct CartCell {
    core: Mutex<CartCore>,
    tx: watch::Sender<Cart>,
    /// Held by whoever is talking to the server cart, so operations reach
    /// it one at a time and in order.
    lane: tokio::sync::Mutex<()>,
}

impl Default for CartCell {
    fn default() -> Self {
        let cart = Cart::anonymous();
        let (tx, _) = watch::channel(cart.clone());
        Self {
            core: Mutex::new(CartCore {
                cart,
                epoch: Epoch::default(),
                outbox: VecDeque::new(),
            }),
            tx,
            lane: tokio::sync::Mutex::new(()),
        }
    }
}

impl CartCell {
    pub(crate) fn cart(&self) -> Cart {
        lock(&self.core).cart.clone()
    }

    /// Publish the cart. Call with the core locked.
    fn publish(&self, core: &CartCore) {
        self.tx.send_replace(core.cart.clone());
    }
}

/// Queue `op` if `session` owns the cart. Call with the core locked.
fn enqueue(core: &mut CartCore, session: Option<&Session>, op: CartOp) -> bool {
    let Some(session) = session else {
        return false;
    };
    if core.cart.owner().user_id() != Some(&session.user_id) {
        return false;
    }
    let ticket = core.epoch.ticket();
    core.outbox.push_back(PendingOp {
        ticket,
        token: session.token.clone(),
        op,
    });
    true
}

/// Give the cart to `owner` and queue an upload for each of its lines,
/// ahead of anything already queued. Call with the core locked.
fn take_over(core: &mut CartCore, owner: CartOwner, session: &Session, ticket: &Ticket) {
    core.cart.reassign(owner);
    for item in core.cart.items().iter().rev() {
        core.outbox.push_front(PendingOp {
            ticket: ticket.clone(),
            token: session.token.clone(),
            op: CartOp::Add(item.clone()),
        });
    }
}

// =============================================================================
// CartManager
// =============================================================================

/// Owns the cart.
#[derive(Clone)]
pub struct CartManager {
    shared: Arc<Shared>,
}

impl CartManager {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// The current cart.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.shared.cart.cart()
    }

    /// A single line, if present.
    #[must_use]
    pub fn item(&self, item_key: &str) -> Option<CartItem> {
        let item_key = ItemKey::parse(item_key).ok()?;
        lock(&self.shared.cart.core).cart.get(&item_key).cloned()
    }

    /// Changes not yet acknowledged by the server.
    #[must_use]
    pub fn pending_sync(&self) -> usize {
        lock(&self.shared.cart.core).outbox.len()
    }

    /// Watch every committed cart.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.shared.cart.tx.subscribe()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add units of a product. An existing line accumulates the quantity
    /// and takes the given price and display data.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Validation` for a malformed key or a quantity
    /// outside `1..=9999` (including after accumulation).
    #[instrument(skip(self, unit_price, display))]
    pub async fn add_item(
        &self,
        item_key: &str,
        quantity: i64,
        unit_price: Price,
        display: DisplayMeta,
    ) -> Result<CartItem, MutationError> {
        let item_key = ItemKey::parse(item_key).map_err(ValidationError::from)?;
        let quantity = Quantity::new(quantity)?;
        let name = display.name.clone();

        let (line, queued) = self.commit(|cart| {
            let line = cart.add(item_key.clone(), quantity, unit_price, display.clone())?;
            let delta = CartItem::new(item_key, quantity, unit_price, display);
            Ok((line, Some(CartOp::Add(delta))))
        })?;

        error::add_breadcrumb(
            "cart",
            "Item added",
            Some(&[("item_key", line.item_key.as_str())]),
        );
        self.shared.notifier.emit(Notification::ItemAdded {
            item_key: line.item_key.clone(),
            name,
            quantity: quantity.get(),
        });
        self.settle(queued).await;
        Ok(line)
    }

    /// Set a line's quantity. Zero or below removes the line.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::NotFound` if the line is absent and
    /// `MutationError::Validation` for a malformed key or a quantity above
    /// the maximum.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        item_key: &str,
        quantity: i64,
    ) -> Result<QuantityChange, MutationError> {
        let item_key = ItemKey::parse(item_key).map_err(ValidationError::from)?;

        let (change, queued) = self.commit(|cart| {
            let change = cart.set_quantity(&item_key, quantity)?;
            let op = match &change {
                QuantityChange::Updated(line) => CartOp::SetQuantity {
                    item_key,
                    quantity: line.quantity,
                },
                QuantityChange::Removed(_) => CartOp::Remove { item_key },
            };
            Ok((change, Some(op)))
        })?;

        self.settle(queued).await;
        Ok(change)
    }

    /// Remove a line. Removing an absent line changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Validation` for a malformed key.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_key: &str) -> Result<Option<CartItem>, MutationError> {
        let item_key = ItemKey::parse(item_key).map_err(ValidationError::from)?;

        let (removed, queued) = self.commit(|cart| {
            Ok(match cart.remove(&item_key) {
                Some(line) => (Some(line), Some(CartOp::Remove { item_key })),
                None => (None, None),
            })
        })?;

        if removed.is_some() {
            self.settle(queued).await;
        }
        Ok(removed)
    }

    /// Empty the cart. Changes still waiting for the server are dropped and
    /// in-flight cart calls are cancelled.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let session = self.shared.session.current_session();
        let queued = {
            let mut core = lock(&self.shared.cart.core);
            core.epoch.advance();
            if !core.outbox.is_empty() {
                debug!(dropped = core.outbox.len(), "Dropping unsent cart changes");
                core.outbox.clear();
            }
            core.cart.clear();
            self.shared.cart.publish(&core);
            enqueue(&mut core, session.as_ref(), CartOp::Clear)
        };

        error::add_breadcrumb("cart", "Cart cleared", None);
        self.settle(queued).await;
    }

    /// Replace the cart with the server's, replaying changes not yet sent.
    ///
    /// Returns the new cart, or `None` when nobody is logged in, the refresh
    /// was cancelled, or the server could not be read (reported as a
    /// notification).
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Option<Cart> {
        let cell = &self.shared.cart;
        let _lane = cell.lane.lock().await;
        self.drain_locked().await;

        let session = self.shared.session.current_session()?;
        let ticket = {
            let core = lock(&cell.core);
            if core.cart.owner().user_id() != Some(&session.user_id) {
                return None;
            }
            core.epoch.ticket()
        };

        match ticket
            .run(self.shared.remote.fetch_cart(&session.token))
            .await?
        {
            Ok(snapshot) => {
                let cart = {
                    let mut core = lock(&cell.core);
                    if !core.epoch.is_current(&ticket) {
                        return None;
                    }
                    let mut cart = snapshot.into_cart(core.cart.owner().clone());
                    for pending in &core.outbox {
                        pending.op.apply_to(&mut cart);
                    }
                    core.cart = cart.clone();
                    cell.publish(&core);
                    cart
                };
                info!(items = cart.len(), "Cart refreshed from server");
                self.shared.persist().await;
                Some(cart)
            }
            Err(err) => {
                self.handle_sync_error(&ticket, &session.token, err).await;
                None
            }
        }
    }

    // =========================================================================
    // Session Boundaries
    // =========================================================================

    /// Hand the cart over to a freshly logged-in customer.
    ///
    /// The anonymous lines move to the customer and their uploads are queued
    /// in one step, so they reach the server even if the caller stops
    /// waiting. The server cart is then fetched and the queued changes are
    /// replayed on top of it. If the server cart cannot be read the local
    /// lines are kept and still uploaded.
    pub(crate) async fn adopt(&self, session: &Session) {
        let cell = &self.shared.cart;
        let owner = CartOwner::Customer {
            user_id: session.user_id.clone(),
        };
        let ticket = {
            let mut core = lock(&cell.core);
            let ticket = core.epoch.ticket();
            take_over(&mut core, owner.clone(), session, &ticket);
            cell.publish(&core);
            ticket
        };
        self.shared.persist().await;

        let _lane = cell.lane.lock().await;
        let Some(fetched) = ticket
            .run(self.shared.remote.fetch_cart(&session.token))
            .await
        else {
            return;
        };

        match fetched {
            Ok(snapshot) => {
                let mut core = lock(&cell.core);
                if !core.epoch.is_current(&ticket) {
                    return;
                }
                let mut cart = snapshot.into_cart(owner);
                for pending in &core.outbox {
                    pending.op.apply_to(&mut cart);
                }
                core.cart = cart;
                cell.publish(&core);
            }
            Err(err) => self.handle_sync_error(&ticket, &session.token, err).await,
        }
        debug!(queued = self.pending_sync(), "Cart adopted by customer");

        self.shared.persist().await;
        self.drain_locked().await;
    }

    /// Reinstate a persisted anonymous cart under a restored session,
    /// queueing its lines for upload and sending them.
    pub(crate) async fn adopt_restored(&self, cart: Cart, session: &Session) {
        let cell = &self.shared.cart;
        {
            let mut core = lock(&cell.core);
            let ticket = core.epoch.ticket();
            core.cart = cart;
            take_over(
                &mut core,
                CartOwner::Customer {
                    user_id: session.user_id.clone(),
                },
                session,
                &ticket,
            );
            cell.publish(&core);
        }
        self.shared.persist().await;

        let _lane = cell.lane.lock().await;
        self.drain_locked().await;
    }

    /// Replace the cart with a restored one.
    pub(crate) fn install(&self, cart: Cart) {
        let mut core = lock(&self.shared.cart.core);
        core.cart = cart;
        self.shared.cart.publish(&core);
    }

    /// Start over with an empty anonymous cart, cancelling pending sync.
    pub(crate) fn reset(&self) {
        let mut core = lock(&self.shared.cart.core);
        core.epoch.advance();
        core.outbox.clear();
        core.cart = Cart::anonymous();
        self.shared.cart.publish(&core);
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Apply a change under the cart lock, publish it, and queue its remote
    /// operation when a customer owns the cart.
    ///
    /// `change` returns the value for the caller and the operation it
    /// performed, `None` when the cart did not change.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut Cart) -> Result<(T, Option<CartOp>), MutationError>,
    ) -> Result<(T, bool), MutationError> {
        let session = self.shared.session.current_session();
        let mut core = lock(&self.shared.cart.core);
        let (value, op) = change(&mut core.cart)?;
        let Some(op) = op else {
            return Ok((value, false));
        };
        self.shared.cart.publish(&core);
        let queued = enqueue(&mut core, session.as_ref(), op);
        Ok((value, queued))
    }

    /// Persist the committed change, then push queued operations.
    async fn settle(&self, queued: bool) {
        self.shared.persist().await;
        if queued {
            let _lane = self.shared.cart.lane.lock().await;
            self.drain_locked().await;
        }
    }

    /// Send queued operations in order. Call with the lane held.
    async fn drain_locked(&self) {
        loop {
            let next = {
                let mut core = lock(&self.shared.cart.core);
                let mut next = None;
                while let Some(pending) = core.outbox.pop_front() {
                    if core.epoch.is_current(&pending.ticket) {
                        next = Some(pending);
                        break;
                    }
                }
                next
            };
            let Some(pending) = next else {
                break;
            };

            let Some(result) = pending
                .ticket
                .run(self.shared.remote.mutate_cart(&pending.token, &pending.op))
                .await
            else {
                debug!("Cart sync cancelled");
                continue;
            };

            match result {
                Ok(snapshot) => {
                    debug!(server_items = snapshot.items.len(), "Cart change synced");
                }
                Err(err @ CartError::Network(_)) => {
                    // Retried on the next drain
                    let (ticket, token) = (pending.ticket.clone(), pending.token.clone());
                    {
                        let mut core = lock(&self.shared.cart.core);
                        if core.epoch.is_current(&ticket) {
                            core.outbox.push_front(pending);
                        }
                    }
                    self.handle_sync_error(&ticket, &token, err).await;
                    break;
                }
                Err(err) => {
                    let unauthorized = matches!(err, CartError::Unauthorized);
                    self.handle_sync_error(&pending.ticket, &pending.token, err)
                        .await;
                    if unauthorized {
                        break;
                    }
                }
            }
        }
    }

    /// Report a failed cart call unless a logout or clear made it stale.
    async fn handle_sync_error(&self, ticket: &Ticket, token: &AuthToken, err: CartError) {
        if !lock(&self.shared.cart.core).epoch.is_current(ticket) {
            debug!(error = %err, "Ignoring failure of a superseded cart call");
            return;
        }

        match err {
            CartError::Conflict { item_key, message } => {
                info!(
                    item_key = ?item_key.as_ref().map(ItemKey::as_str),
                    %message,
                    "Server rejected cart change, keeping local cart"
                );
                self.shared
                    .notifier
                    .emit(Notification::CartConflict { item_key, message });
            }
            CartError::Unauthorized => {
                SessionManager::new(Arc::clone(&self.shared))
                    .expire_if_token(token)
                    .await;
            }
            err => {
                if err.is_server_fault() {
                    error::capture(&err, "Cart sync failed");
                } else {
                    warn!(error = %err, "Cart sync failed");
                }
                self.shared.notifier.emit(Notification::CartSyncFailed(err));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use tokio::sync::Notify;

    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{FailingStore, FakeRemote, eur, received, storefront};
    use crate::{PersistenceError, Storefront};

    fn display(name: &str) -> DisplayMeta {
        DisplayMeta::new(name, None)
    }

    async fn logged_in(remote: &Arc<FakeRemote>, store: &Arc<MemoryStore>) -> Storefront {
        let sf = storefront(remote, store);
        sf.login("marie@reboul.fr", SecretString::from("pw".to_string()))
            .await
            .unwrap();
        sf
    }

    #[tokio::test]
    async fn test_anonymous_add_accumulates_without_remote() {
        let remote = Arc::new(FakeRemote::default());
        let sf = storefront(&remote, &Arc::new(MemoryStore::new()));
        let mut rx = sf.notifications();

        sf.add_item("k1", 2, eur(999), display("Veste")).await.unwrap();
        let line = sf.add_item("k1", 3, eur(999), display("Veste")).await.unwrap();

        assert_eq!(line.quantity.get(), 5);
        assert_eq!(sf.cart_snapshot().len(), 1);
        assert!(remote.ops().is_empty());
        assert!(matches!(
            received(&mut rx).first(),
            Some(Notification::ItemAdded { name, quantity: 2, .. }) if name == "Veste"
        ));
    }

    #[tokio::test]
    async fn test_add_validates_input() {
        let sf = storefront(&Arc::new(FakeRemote::default()), &Arc::new(MemoryStore::new()));

        assert!(matches!(
            sf.add_item("  ", 1, eur(100), DisplayMeta::default()).await,
            Err(MutationError::Validation(ValidationError::ItemKey(_)))
        ));
        assert!(matches!(
            sf.add_item("k1", 0, eur(100), DisplayMeta::default()).await,
            Err(MutationError::Validation(ValidationError::Quantity(_)))
        ));
        assert!(sf.cart_snapshot().is_empty());

        sf.add_item("k1", 1, eur(100), DisplayMeta::default())
            .await
            .unwrap();
        let usd = Price::new(
            rust_decimal::Decimal::ONE,
            reboul_core::CurrencyCode::USD,
        )
        .unwrap();
        assert!(matches!(
            sf.add_item("k2", 1, usd, DisplayMeta::default()).await,
            Err(MutationError::Validation(ValidationError::Currency { .. }))
        ));
        assert_eq!(sf.cart_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_update_quantity() {
        let sf = storefront(&Arc::new(FakeRemote::default()), &Arc::new(MemoryStore::new()));
        sf.add_item("k1", 5, eur(100), DisplayMeta::default())
            .await
            .unwrap();

        let change = sf.update_quantity("k1", 1).await.unwrap();
        assert!(matches!(change, QuantityChange::Updated(ref line) if line.quantity.get() == 1));

        let change = sf.update_quantity("k1", 0).await.unwrap();
        assert!(matches!(change, QuantityChange::Removed(_)));
        assert!(sf.cart_snapshot().is_empty());

        assert_eq!(
            sf.update_quantity("k1", 2).await,
            Err(MutationError::NotFound(ItemKey::parse("k1").unwrap()))
        );
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let remote = Arc::new(FakeRemote::default());
        let store = Arc::new(MemoryStore::new());
        let sf = logged_in(&remote, &store).await;
        let blob = store.blob();

        assert_eq!(sf.remove_item("missing").await, Ok(None));
        assert!(remote.ops().is_empty());
        assert_eq!(store.blob(), blob);
    }

    #[tokio::test]
    async fn test_mutations_reach_server_in_issue_order() {
        let remote = Arc::new(FakeRemote::default());
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;

        sf.add_item("k1", 2, eur(999), DisplayMeta::default())
            .await
            .unwrap();
        sf.update_quantity("k1", 5).await.unwrap();
        sf.add_item("k2", 1, eur(450), DisplayMeta::default())
            .await
            .unwrap();
        sf.remove_item("k2").await.unwrap();

        let keys: Vec<_> = remote
            .ops()
            .iter()
            .map(|op| op.item_key().map(|k| k.as_str().to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                Some("k1".to_string()),
                Some("k1".to_string()),
                Some("k2".to_string()),
                Some("k2".to_string())
            ]
        );
        assert!(matches!(
            remote.ops().get(1),
            Some(CartOp::SetQuantity { quantity, .. }) if quantity.get() == 5
        ));
        assert_eq!(remote.server_quantity("k1"), Some(5));
        assert_eq!(remote.server_quantity("k2"), None);
        assert_eq!(sf.cart().pending_sync(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let remote = Arc::new(FakeRemote::default());
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;

        let adds = (0..10).map(|_| {
            let sf = sf.clone();
            tokio::spawn(async move {
                sf.add_item("k1", 1, eur(100), DisplayMeta::default())
                    .await
                    .unwrap();
            })
        });
        for handle in adds.collect::<Vec<_>>() {
            handle.await.unwrap();
        }

        assert_eq!(sf.cart().item("k1").unwrap().quantity.get(), 10);
        assert_eq!(remote.server_quantity("k1"), Some(10));
    }

    #[tokio::test]
    async fn test_conflict_keeps_local_state() {
        let remote = Arc::new(FakeRemote::default());
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;
        let mut rx = sf.notifications();
        remote.fail_next_mutation(CartError::Conflict {
            item_key: Some(ItemKey::parse("k1").unwrap()),
            message: "Stock insuffisant".to_string(),
        });

        sf.add_item("k1", 3, eur(999), DisplayMeta::default())
            .await
            .unwrap();

        assert_eq!(sf.cart().item("k1").unwrap().quantity.get(), 3);
        assert!(received(&mut rx).contains(&Notification::CartConflict {
            item_key: Some(ItemKey::parse("k1").unwrap()),
            message: "Stock insuffisant".to_string(),
        }));
        assert!(sf.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_unauthorized_expires_session() {
        let remote = Arc::new(FakeRemote::default());
        let store = Arc::new(MemoryStore::new());
        let sf = logged_in(&remote, &store).await;
        let mut rx = sf.notifications();
        remote.fail_next_mutation(CartError::Unauthorized);

        sf.add_item("k1", 1, eur(999), DisplayMeta::default())
            .await
            .unwrap();

        assert!(!sf.session().is_authenticated());
        assert!(sf.cart_snapshot().owner().is_anonymous());
        assert_eq!(store.blob(), None);
        assert!(received(&mut rx).contains(&Notification::SessionExpired));
    }

    #[tokio::test]
    async fn test_network_failure_is_retried_on_next_change() {
        let remote = Arc::new(FakeRemote::default());
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;
        let mut rx = sf.notifications();
        remote.fail_next_mutation(CartError::Network("timeout".to_string()));

        sf.add_item("k1", 1, eur(999), DisplayMeta::default())
            .await
            .unwrap();
        assert_eq!(sf.cart().pending_sync(), 1);
        assert!(received(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::CartSyncFailed(CartError::Network(_)))));

        sf.add_item("k2", 1, eur(450), DisplayMeta::default())
            .await
            .unwrap();
        assert_eq!(sf.cart().pending_sync(), 0);
        assert_eq!(remote.server_quantity("k1"), Some(1));
        assert_eq!(remote.server_quantity("k2"), Some(1));
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_sync() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(FakeRemote::with_mutate_gate(Arc::clone(&gate)));
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;
        let mut carts = sf.subscribe_cart();

        let add = tokio::spawn({
            let sf = sf.clone();
            async move {
                sf.add_item("k1", 1, eur(999), DisplayMeta::default())
                    .await
                    .unwrap();
            }
        });
        carts.wait_for(|cart| !cart.is_empty()).await.unwrap();
        // Let the add reach the server call
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let clear = tokio::spawn({
            let sf = sf.clone();
            async move { sf.clear_cart().await }
        });
        carts.wait_for(Cart::is_empty).await.unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        add.await.unwrap();
        clear.await.unwrap();
        assert!(sf.cart_snapshot().is_empty());
        assert_eq!(remote.ops(), vec![CartOp::Clear]);
    }

    #[tokio::test]
    async fn test_logout_cancels_pending_sync() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(FakeRemote::with_mutate_gate(Arc::clone(&gate)));
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;
        let mut carts = sf.subscribe_cart();

        let add = tokio::spawn({
            let sf = sf.clone();
            async move {
                sf.add_item("k1", 1, eur(999), DisplayMeta::default())
                    .await
                    .unwrap();
            }
        });
        carts.wait_for(|cart| !cart.is_empty()).await.unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let mut rx = sf.notifications();
        sf.logout().await;
        add.await.unwrap();
        gate.notify_one();
        tokio::task::yield_now().await;

        assert!(remote.ops().is_empty());
        assert_eq!(sf.cart().pending_sync(), 0);
        assert!(sf.cart_snapshot().is_empty());
        assert_eq!(received(&mut rx), vec![Notification::LoggedOut]);
    }

    #[tokio::test]
    async fn test_refresh_takes_server_cart() {
        let remote = Arc::new(FakeRemote::default());
        let sf = logged_in(&remote, &Arc::new(MemoryStore::new())).await;
        sf.add_item("k1", 1, eur(999), DisplayMeta::default())
            .await
            .unwrap();
        remote.set_server_items(vec![crate::testing::item("k9", 4, 1200)]);

        let cart = sf.refresh_cart().await.unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(sf.cart().item("k9").unwrap().quantity.get(), 4);
        assert!(sf.cart().item("k1").is_none());
        assert_eq!(cart.owner().user_id().unwrap().as_str(), "42");
    }

    #[tokio::test]
    async fn test_refresh_requires_session() {
        let sf = storefront(&Arc::new(FakeRemote::default()), &Arc::new(MemoryStore::new()));
        assert_eq!(sf.refresh_cart().await, None);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let remote = Arc::new(FakeRemote::default());
        let sf = Storefront::new(remote, Arc::new(FailingStore), 8);
        let mut rx = sf.notifications();

        sf.add_item("k1", 2, eur(999), DisplayMeta::default())
            .await
            .unwrap();

        assert_eq!(sf.cart().item("k1").unwrap().quantity.get(), 2);
        assert!(received(&mut rx).iter().any(|n| matches!(
            n,
            Notification::PersistenceFailed(PersistenceError::Unavailable(_))
        )));
    }
}
