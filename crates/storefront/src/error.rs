//! Error taxonomy with Sentry integration.
//!
//! Input problems (`ValidationError`, missing cart lines) are returned to the
//! caller synchronously. Failures of the asynchronous collaborators
//! (`AuthError`, `CartError`, `PersistenceError`) travel through the
//! notification channel and are reported here so they are never lost.

use reboul_core::cart::CartRuleError;
use reboul_core::{CurrencyCode, EmailError, IdError, ItemKey, PriceError, QuantityError};
use thiserror::Error;

use crate::config::ConfigError;

/// Bad input, rejected before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Login email is malformed.
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    /// Login password is empty.
    #[error("password cannot be empty")]
    EmptyPassword,

    /// Item key is blank or too long.
    #[error("invalid item key: {0}")]
    ItemKey(#[from] IdError),

    /// Quantity is out of range.
    #[error("invalid quantity: {0}")]
    Quantity(#[from] QuantityError),

    /// Unit price is negative or too large.
    #[error("invalid price: {0}")]
    Price(#[from] PriceError),

    /// Unit price is not in the cart's currency.
    #[error("cart is priced in {expected:?}, item is priced in {found:?}")]
    Currency {
        /// Currency of the lines already in the cart.
        expected: CurrencyCode,
        /// Currency of the rejected price.
        found: CurrencyCode,
    },
}

/// Authentication failures reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The session token is no longer accepted.
    #[error("session expired")]
    Expired,

    /// The API could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with an unexpected status or body.
    #[error("server error{}: {message}", status_suffix(.status))]
    Server {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Diagnostic detail.
        message: String,
    },
}

/// Cart synchronization failures reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The server refused the change (e.g. not enough stock).
    #[error("cart conflict: {message}")]
    Conflict {
        /// Line the conflict concerns, if known.
        item_key: Option<ItemKey>,
        /// Server-provided explanation.
        message: String,
    },

    /// The session token was rejected.
    #[error("cart request unauthorized")]
    Unauthorized,

    /// The API could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with an unexpected status or body.
    #[error("server error{}: {message}", status_suffix(.status))]
    Server {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Diagnostic detail.
        message: String,
    },
}

/// Storage adapter failures. Always non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// The storage backend could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The state could not be serialized.
    #[error("failed to encode state: {0}")]
    Encode(String),

    /// The stored blob could not be decoded.
    #[error("stored state is corrupt: {0}")]
    Corrupt(String),
}

/// Synchronous failures of session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Bad email or password input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another login is still waiting for the server.
    #[error("login already in progress")]
    LoginInProgress,

    /// A customer is already logged in.
    #[error("already logged in")]
    AlreadyAuthenticated,
}

/// Synchronous failures of cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// Bad key, quantity or price.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The targeted line is not in the cart.
    #[error("item not found in cart: {0}")]
    NotFound(ItemKey),
}

impl From<CartRuleError> for MutationError {
    fn from(err: CartRuleError) -> Self {
        match err {
            CartRuleError::ItemNotFound(key) => Self::NotFound(key),
            CartRuleError::Quantity(q) => Self::Validation(ValidationError::Quantity(q)),
            CartRuleError::CurrencyMismatch { expected, found } => {
                Self::Validation(ValidationError::Currency { expected, found })
            }
        }
    }
}

impl From<QuantityError> for MutationError {
    fn from(err: QuantityError) -> Self {
        Self::Validation(ValidationError::Quantity(err))
    }
}

/// Umbrella error for consumers that drive the whole client.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A session operation was rejected.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A cart operation was rejected.
    #[error("cart error: {0}")]
    Mutation(#[from] MutationError),

    /// Authentication failed remotely.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart synchronization failed remotely.
    #[error("cart sync error: {0}")]
    Cart(#[from] CartError),

    /// Storage failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

impl AuthError {
    /// Whether the failure is on the server side and worth an error report.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

impl CartError {
    /// Whether the failure is on the server side and worth an error report.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

/// Log an error and capture it to Sentry.
///
/// A no-op on the Sentry side when Sentry is not initialized.
pub fn capture(err: &(dyn std::error::Error + 'static), context: &str) {
    let event_id = sentry::capture_error(err);
    tracing::error!(
        error = %err,
        sentry_event_id = %event_id,
        "{context}"
    );
}

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, display_name: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: Some(display_name.to_owned()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user
/// actions leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = AuthError::Server {
            status: Some(503),
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "server error (503): maintenance");

        let err = CartError::Server {
            status: None,
            message: "bad body".to_string(),
        };
        assert_eq!(err.to_string(), "server error: bad body");
    }

    #[test]
    fn test_cart_rule_error_mapping() {
        let key = ItemKey::parse("k").unwrap();
        let err: MutationError = CartRuleError::ItemNotFound(key.clone()).into();
        assert_eq!(err, MutationError::NotFound(key));

        let err: MutationError = CartRuleError::Quantity(QuantityError::NotPositive(0)).into();
        assert!(matches!(err, MutationError::Validation(ValidationError::Quantity(_))));
    }

    #[test]
    fn test_server_fault_classification() {
        assert!(!AuthError::InvalidCredentials.is_server_fault());
        assert!(!AuthError::Network("timeout".to_string()).is_server_fault());
        assert!(CartError::Server {
            status: Some(500),
            message: String::new()
        }
        .is_server_fault());
        assert!(!CartError::Unauthorized.is_server_fault());
    }

    #[test]
    fn test_capture_without_sentry_does_not_panic() {
        let err = PersistenceError::Unavailable("quota exceeded".to_string());
        capture(&err, "Failed to persist state");
    }
}
