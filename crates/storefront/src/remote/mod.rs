//! Remote session client: authentication and server-side cart calls.

mod http;

pub use http::HttpRemoteClient;

use async_trait::async_trait;
use reboul_core::{AuthToken, Cart, CartItem, CartOwner, Email, ItemKey, Quantity, Session};
use secrecy::SecretString;

use crate::error::{AuthError, CartError};

/// Login credentials. The password never appears in `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    /// Validated login email.
    pub email: Email,
    /// Plain password, sent once to the API.
    pub password: SecretString,
}

/// A single change sent to the server cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOp {
    /// Add `quantity` units of a line (accumulates server-side).
    Add(CartItem),
    /// Overwrite a line's quantity.
    SetQuantity {
        /// Line to change.
        item_key: ItemKey,
        /// New quantity.
        quantity: Quantity,
    },
    /// Remove a line.
    Remove {
        /// Line to remove.
        item_key: ItemKey,
    },
    /// Remove every line.
    Clear,
}

impl CartOp {
    /// The line this operation targets, `None` for [`CartOp::Clear`].
    #[must_use]
    pub const fn item_key(&self) -> Option<&ItemKey> {
        match self {
            Self::Add(item) => Some(&item.item_key),
            Self::SetQuantity { item_key, .. } | Self::Remove { item_key } => Some(item_key),
            Self::Clear => None,
        }
    }

    /// Replay the operation on a local cart. Operations that no longer apply
    /// (e.g. the line is gone) are skipped.
    pub fn apply_to(&self, cart: &mut Cart) {
        match self {
            Self::Add(item) => cart.absorb([item.clone()]),
            Self::SetQuantity { item_key, quantity } => {
                let _ = cart.set_quantity(item_key, i64::from(quantity.get()));
            }
            Self::Remove { item_key } => {
                cart.remove(item_key);
            }
            Self::Clear => cart.clear(),
        }
    }
}

/// The server's view of the cart after a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    /// Lines as the server holds them.
    pub items: Vec<CartItem>,
}

impl CartSnapshot {
    /// Materialize the snapshot as a cart for `owner`.
    #[must_use]
    pub fn into_cart(self, owner: CartOwner) -> Cart {
        Cart::from_items(owner, self.items)
    }
}

/// Remote API used by the session and cart managers.
///
/// Calls may be dropped mid-flight when the caller is cancelled; callers
/// never apply the result of a dropped call.
#[async_trait]
pub trait RemoteSessionClient: Send + Sync {
    /// Exchange credentials for a session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Check that a token is still accepted.
    async fn validate_session(&self, token: &AuthToken) -> Result<(), AuthError>;

    /// Read the server cart.
    async fn fetch_cart(&self, token: &AuthToken) -> Result<CartSnapshot, CartError>;

    /// Apply one change to the server cart.
    async fn mutate_cart(&self, token: &AuthToken, op: &CartOp) -> Result<CartSnapshot, CartError>;
}
