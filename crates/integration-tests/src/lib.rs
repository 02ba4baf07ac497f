//! Integration tests for the Reboul storefront client.
//!
//! The tests drive a real [`Storefront`] against a `wiremock` server that
//! plays the storefront API, persisting to a state file in a temporary
//! directory.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p reboul-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - Login, logout, restore and session verification
//! - `cart_sync` - Cart mutations reaching the server cart

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reboul_core::{DisplayMeta, Price};
use reboul_storefront::config::ApiConfig;
use reboul_storefront::remote::HttpRemoteClient;
use reboul_storefront::store::FileStore;
use reboul_storefront::{LoginOutcome, Notification, Storefront};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Customer ID returned by [`TestContext::mount_login`].
pub const USER_ID: &str = "cust-42";
/// Bearer token returned by [`TestContext::mount_login`].
pub const TOKEN: &str = "tok-42";

/// A mock API server and a state directory.
pub struct TestContext {
    pub server: MockServer,
    dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Path of the persisted state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state").join("reboul.json")
    }

    /// A client over the mock server and the state file. Clients created
    /// from the same context share persisted state, like two app launches.
    #[must_use]
    pub fn storefront(&self) -> Storefront {
        let remote = HttpRemoteClient::new(&ApiConfig {
            base_url: Url::parse(&self.server.uri()).unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        Storefront::new(
            Arc::new(remote),
            Arc::new(FileStore::new(self.state_path())),
            64,
        )
    }

    /// Accept any login and serve an empty server cart.
    pub async fn mount_login(&self) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
            .mount(&self.server)
            .await;
        self.mount_server_cart(json!({ "items": [] })).await;
    }

    /// Serve `body` for `GET /cart`.
    pub async fn mount_server_cart(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Accept every cart mutation.
    pub async fn mount_cart_writes(&self) {
        for verb in ["POST", "PUT", "DELETE"] {
            Mock::given(method(verb))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
                .mount(&self.server)
                .await;
        }
    }
}

/// Body of a successful login.
#[must_use]
pub fn login_body() -> Value {
    json!({
        "userId": USER_ID,
        "token": TOKEN,
        "displayName": "Marie",
    })
}

/// A wire cart line.
#[must_use]
pub fn wire_item(key: &str, quantity: i64, unit_price: &str) -> Value {
    json!({
        "itemKey": key,
        "quantity": quantity,
        "unitPrice": unit_price,
        "currencyCode": "EUR",
        "name": key.to_uppercase(),
    })
}

/// Euro price from cents.
#[must_use]
pub fn eur(cents: i64) -> Price {
    Price::eur(Decimal::new(cents, 2)).unwrap()
}

/// Display data named after the key.
#[must_use]
pub fn display(key: &str) -> DisplayMeta {
    DisplayMeta::new(key.to_uppercase(), None)
}

/// Log in as Marie, asserting success.
pub async fn login(storefront: &Storefront) {
    let outcome = storefront
        .login("marie@example.com", SecretString::from("hunter2".to_string()))
        .await
        .unwrap();
    assert!(
        matches!(outcome, LoginOutcome::Authenticated(_)),
        "unexpected login outcome: {outcome:?}"
    );
}

/// Notifications received so far.
pub fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
