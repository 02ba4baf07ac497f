//! Session and cart managers.
//!
//! # Services
//!
//! - `session` - Login, logout, restore and expiry of the customer session
//! - `cart` - Cart mutations and reconciliation with the server cart
//!
//! Both managers share one [`Shared`] context. State lives in
//! `std::sync::Mutex`-guarded cores that are never held across an `.await`;
//! every committed transition is published on a `watch` channel while the
//! lock is still held, so observers see commits in order.

mod cart;
mod session;

pub use cart::CartManager;
pub use session::{LoginOutcome, RestoreOutcome, SessionManager, SessionState};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{self, PersistenceError};
use crate::notify::{Notification, Notifier};
use crate::remote::RemoteSessionClient;
use crate::store::{PersistedState, Persister};

pub(crate) use cart::CartCell;
pub(crate) use session::SessionCell;

/// Collaborators and state cells shared by both managers.
pub(crate) struct Shared {
    pub(crate) remote: Arc<dyn RemoteSessionClient>,
    pub(crate) persister: Persister,
    pub(crate) notifier: Notifier,
    pub(crate) session: SessionCell,
    pub(crate) cart: CartCell,
}

impl Shared {
    pub(crate) fn new(
        remote: Arc<dyn RemoteSessionClient>,
        persister: Persister,
        notifier: Notifier,
    ) -> Self {
        Self {
            remote,
            persister,
            notifier,
            session: SessionCell::default(),
            cart: CartCell::default(),
        }
    }

    /// The combined state as it should be persisted right now.
    fn snapshot(&self) -> PersistedState {
        PersistedState::new(self.session.current_session(), self.cart.cart())
    }

    /// Save the latest combined state. Failures are reported, never returned.
    pub(crate) async fn persist(&self) {
        if let Err(e) = self.persister.save_with(|| self.snapshot()).await {
            self.report_persistence(e);
        }
    }

    /// Remove the persisted state. Failures are reported, never returned.
    pub(crate) async fn forget(&self) {
        if let Err(e) = self.persister.clear().await {
            self.report_persistence(e);
        }
    }

    /// Storage failures are non-fatal: log, capture and tell the user.
    pub(crate) fn report_persistence(&self, err: PersistenceError) {
        tracing::warn!(error = %err, "Persistence failed, continuing in memory");
        error::capture(&err, "Failed to access persisted state");
        self.notifier.emit(Notification::PersistenceFailed(err));
    }
}

/// Lock a state core, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
