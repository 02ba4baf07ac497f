//! In-crate test doubles.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reboul_core::{
    AuthToken, Cart, CartItem, CartOwner, CurrencyCode, DisplayMeta, ItemKey, Price, Quantity, Session,
    UserId,
};
use rust_decimal::Decimal;
use tokio::sync::{Notify, broadcast};

use crate::Storefront;
use crate::error::{AuthError, CartError, PersistenceError};
use crate::notify::Notification;
use crate::remote::{CartOp, CartSnapshot, Credentials, RemoteSessionClient};
use crate::store::{MemoryStore, StateStore};

pub(crate) fn session(user_id: &str, token: &str) -> Session {
    Session::new(
        UserId::parse(user_id).unwrap(),
        "Marie".to_string(),
        AuthToken::new(token.to_string()),
        None,
    )
}

pub(crate) fn eur(cents: i64) -> Price {
    Price::new(Decimal::new(cents, 2), CurrencyCode::EUR).unwrap()
}

pub(crate) fn item(key: &str, quantity: i64, cents: i64) -> CartItem {
    CartItem::new(
        ItemKey::parse(key).unwrap(),
        Quantity::new(quantity).unwrap(),
        eur(cents),
        DisplayMeta::new(key.to_uppercase(), None),
    )
}

struct FakeState {
    auth: Result<Session, AuthError>,
    validate: Result<(), AuthError>,
    server_cart: Cart,
    fetch_error: Option<CartError>,
    mutate_errors: VecDeque<CartError>,
    auth_calls: usize,
    ops: Vec<CartOp>,
}

/// Remote that keeps a server cart in memory and applies operations to it.
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
    /// When set, `authenticate` waits for a notification before answering.
    auth_gate: Option<Arc<Notify>>,
    /// When set, `fetch_cart` waits for a notification before answering.
    fetch_gate: Option<Arc<Notify>>,
    /// When set, `mutate_cart` waits for a notification before answering.
    mutate_gate: Option<Arc<Notify>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                auth: Ok(session("42", "token-42")),
                validate: Ok(()),
                server_cart: Cart::anonymous(),
                fetch_error: None,
                mutate_errors: VecDeque::new(),
                auth_calls: 0,
                ops: Vec::new(),
            }),
            auth_gate: None,
            fetch_gate: None,
            mutate_gate: None,
        }
    }
}

impl FakeRemote {
    pub(crate) fn with_auth_gate(gate: Arc<Notify>) -> Self {
        Self {
            auth_gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn with_fetch_gate(gate: Arc<Notify>) -> Self {
        Self {
            fetch_gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn with_mutate_gate(gate: Arc<Notify>) -> Self {
        Self {
            mutate_gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn set_auth(&self, result: Result<Session, AuthError>) {
        self.state.lock().unwrap().auth = result;
    }

    pub(crate) fn set_validate(&self, result: Result<(), AuthError>) {
        self.state.lock().unwrap().validate = result;
    }

    pub(crate) fn set_server_items(&self, items: Vec<CartItem>) {
        self.state.lock().unwrap().server_cart = Cart::from_items(CartOwner::anonymous(), items);
    }

    pub(crate) fn fail_fetch(&self, err: CartError) {
        self.state.lock().unwrap().fetch_error = Some(err);
    }

    pub(crate) fn fail_next_mutation(&self, err: CartError) {
        self.state.lock().unwrap().mutate_errors.push_back(err);
    }

    pub(crate) fn auth_calls(&self) -> usize {
        self.state.lock().unwrap().auth_calls
    }

    pub(crate) fn ops(&self) -> Vec<CartOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub(crate) fn server_quantity(&self, key: &str) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state
            .server_cart
            .get(&ItemKey::parse(key).unwrap())
            .map(|line| line.quantity.get())
    }
}

#[async_trait]
impl RemoteSessionClient for FakeRemote {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, AuthError> {
        self.state.lock().unwrap().auth_calls += 1;
        if let Some(gate) = &self.auth_gate {
            gate.notified().await;
        }
        self.state.lock().unwrap().auth.clone()
    }

    async fn validate_session(&self, _token: &AuthToken) -> Result<(), AuthError> {
        self.state.lock().unwrap().validate.clone()
    }

    async fn fetch_cart(&self, _token: &AuthToken) -> Result<CartSnapshot, CartError> {
        if let Some(gate) = &self.fetch_gate {
            gate.notified().await;
        }
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.fetch_error {
            return Err(err.clone());
        }
        Ok(CartSnapshot {
            items: state.server_cart.items().to_vec(),
        })
    }

    async fn mutate_cart(&self, _token: &AuthToken, op: &CartOp) -> Result<CartSnapshot, CartError> {
        if let Some(gate) = &self.mutate_gate {
            gate.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.mutate_errors.pop_front() {
            return Err(err);
        }
        state.ops.push(op.clone());
        op.apply_to(&mut state.server_cart);
        Ok(CartSnapshot {
            items: state.server_cart.items().to_vec(),
        })
    }
}

/// Store whose every call fails.
pub(crate) struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        Err(PersistenceError::Unavailable("disk on fire".to_string()))
    }

    async fn save(&self, _blob: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("disk on fire".to_string()))
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("disk on fire".to_string()))
    }
}

/// A client over `remote` and `store`.
pub(crate) fn storefront(
    remote: &Arc<FakeRemote>,
    store: &Arc<MemoryStore>,
) -> Storefront {
    Storefront::new(remote.clone(), store.clone(), 32)
}

/// Notifications received so far.
pub(crate) fn received(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
