//! CLI command implementations.

pub mod cart;
pub mod session;

use reboul_storefront::{Notification, Severity};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors specific to the CLI.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command needs a logged-in customer.
    #[error("not logged in (run `reboul login <email>` first)")]
    NotLoggedIn,

    /// Login was refused or could not reach the server.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// Reading the password failed.
    #[error("could not read password: {0}")]
    Password(#[from] std::io::Error),
}

/// Print the notifications emitted while the command ran.
#[allow(clippy::print_stdout)]
pub fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    while let Ok(notification) = rx.try_recv() {
        let marker = match notification.severity() {
            Severity::Success => "✓",
            Severity::Info => "i",
            Severity::Error => "✗",
        };
        println!(
            "{marker} {}: {}",
            notification.title(),
            notification.description()
        );
    }
}
