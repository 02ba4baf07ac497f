//! Reboul Core - Shared types library.
//!
//! This crate provides the types shared by every Reboul storefront client
//! component:
//! - `storefront` - Session and cart state synchronization
//! - `cli` - Terminal client driving the storefront core
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O,
//! no HTTP clients, no persistence. This keeps it lightweight and allows the
//! cart rules to be tested without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, quantities and emails
//! - [`session`] - Authenticated session and bearer token
//! - [`cart`] - Cart lines and the rules for mutating them

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod session;
pub mod types;

pub use cart::{Cart, CartItem, CartOwner, DisplayMeta, QuantityChange};
pub use session::{AuthToken, Session};
pub use types::*;
