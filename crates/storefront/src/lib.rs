//! Reboul storefront client core.
//!
//! Keeps the customer session and shopping cart consistent across the
//! in-memory state, a persistent store and the remote storefront API.
//!
//! # Modules
//!
//! - `store` - Persistent store adapter (memory and JSON file backends)
//! - `remote` - Remote session client (HTTP)
//! - `services` - Session and cart managers
//! - `notify` - User-facing outcome notifications
//! - `state` - The [`Storefront`] facade tying them together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
mod epoch;
pub mod error;
pub mod notify;
pub mod remote;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::StorefrontConfig;
pub use error::{
    AuthError, CartError, MutationError, PersistenceError, SessionError, StorefrontError,
    ValidationError,
};
pub use notify::{Notification, Notifier, Severity};
pub use services::{CartManager, LoginOutcome, RestoreOutcome, SessionManager, SessionState};
pub use state::Storefront;
