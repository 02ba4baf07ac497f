//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! reboul login marie@example.com
//! reboul whoami --verify
//! reboul logout
//! ```

use std::io::{BufRead, Write};

use reboul_storefront::{LoginOutcome, Storefront};
use secrecy::SecretString;

use super::CommandError;

/// Log in, reading the password from stdin.
///
/// # Errors
///
/// Returns an error for invalid input or a refused login.
pub async fn login(storefront: &Storefront, email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let password = read_password()?;

    match storefront.login(email, password).await? {
        LoginOutcome::Authenticated(session) => {
            tracing::info!(user_id = %session.user_id, "Logged in");
            super::cart::show(&storefront.cart_snapshot());
            Ok(())
        }
        LoginOutcome::Rejected(err) => Err(CommandError::LoginFailed(err.to_string()).into()),
        LoginOutcome::Cancelled => Err(CommandError::LoginFailed("cancelled".to_string()).into()),
    }
}

/// Log out.
pub async fn logout(storefront: &Storefront) {
    if storefront.current_session().is_none() {
        tracing::info!("Not logged in");
    }
    storefront.logout().await;
}

/// Show the logged-in customer.
///
/// # Errors
///
/// Returns an error when nobody is logged in or the server could not be
/// reached to verify the session.
#[allow(clippy::print_stdout)]
pub async fn whoami(storefront: &Storefront, verify: bool) -> Result<(), Box<dyn std::error::Error>> {
    if verify && !storefront.verify_session().await? {
        return Err(CommandError::NotLoggedIn.into());
    }

    let session = storefront
        .current_session()
        .ok_or(CommandError::NotLoggedIn)?;
    println!("{} ({})", session.display_name, session.user_id);
    if let Some(expires_at) = session.expires_at {
        println!("session expires {}", expires_at.to_rfc3339());
    }
    Ok(())
}

#[allow(clippy::print_stderr)]
fn read_password() -> Result<SecretString, CommandError> {
    eprint!("Mot de passe: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    Ok(SecretString::from(password))
}
