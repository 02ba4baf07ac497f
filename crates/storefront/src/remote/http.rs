//! HTTP implementation of [`RemoteSessionClient`] using `reqwest`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reboul_core::{
    AuthToken, CartItem, CurrencyCode, DisplayMeta, ItemKey, Price, Quantity, Session, UserId,
};
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{CartOp, CartSnapshot, Credentials, RemoteSessionClient};
use crate::config::ApiConfig;
use crate::error::{AuthError, CartError, StorefrontError};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user_id: String,
    token: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct WireCart {
    #[serde(default)]
    items: Vec<WireCartItem>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCartItem {
    item_key: String,
    quantity: i64,
    unit_price: Decimal,
    #[serde(default)]
    currency_code: CurrencyCode,
    #[serde(default)]
    name: String,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Serialize)]
struct QuantityBody {
    quantity: u32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConflictBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    item_key: Option<String>,
}

impl From<&CartItem> for WireCartItem {
    fn from(item: &CartItem) -> Self {
        Self {
            item_key: item.item_key.as_str().to_string(),
            quantity: i64::from(item.quantity.get()),
            unit_price: item.unit_price.amount(),
            currency_code: item.unit_price.currency_code(),
            name: item.display.name.clone(),
            image: item.display.image.clone(),
        }
    }
}

impl WireCartItem {
    fn into_item(self) -> Result<CartItem, String> {
        let item_key = ItemKey::parse(&self.item_key).map_err(|e| e.to_string())?;
        let quantity = Quantity::new(self.quantity).map_err(|e| e.to_string())?;
        let unit_price = Price::new(self.unit_price, self.currency_code).map_err(|e| e.to_string())?;
        Ok(CartItem::new(
            item_key,
            quantity,
            unit_price,
            DisplayMeta::new(self.name, self.image),
        ))
    }
}

// =============================================================================
// Responses
// =============================================================================

/// A received response, body already read.
struct Reply {
    status: StatusCode,
    body: String,
    retry_after: Option<u64>,
}

impl Reply {
    /// First 200 characters of the body, for error messages.
    fn excerpt(&self) -> String {
        self.body.chars().take(200).collect()
    }

    fn server_message(&self) -> String {
        if self.status == StatusCode::TOO_MANY_REQUESTS {
            return format!("rate limited, retry after {}s", self.retry_after.unwrap_or(1));
        }
        format!("HTTP {}: {}", self.status, self.excerpt())
    }

    fn log_failure(&self, endpoint: &str) {
        tracing::error!(
            status = %self.status,
            endpoint,
            body = %self.body.chars().take(500).collect::<String>(),
            "Storefront API returned non-success status"
        );
    }
}

// =============================================================================
// HttpRemoteClient
// =============================================================================

/// Client for the storefront REST API.
#[derive(Clone)]
pub struct HttpRemoteClient {
    inner: Arc<HttpRemoteClientInner>,
}

struct HttpRemoteClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteClient {
    /// Create a client for the configured API.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, StorefrontError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("reboul-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpRemoteClientInner {
                client,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// Build an endpoint URL from path segments. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request and read the body as text.
    async fn send(&self, request: RequestBuilder) -> Result<Reply, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;
        Ok(Reply {
            status,
            body,
            retry_after,
        })
    }

    async fn cart_call(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<CartSnapshot, CartError> {
        let reply = self
            .send(request)
            .await
            .map_err(|e| CartError::Network(e.to_string()))?;

        match reply.status {
            status if status.is_success() => parse_cart(&reply),
            StatusCode::CONFLICT => {
                let body: ConflictBody = serde_json::from_str(&reply.body).unwrap_or_default();
                debug!(endpoint, message = ?body.message, "Cart change rejected");
                Err(CartError::Conflict {
                    item_key: body.item_key.and_then(|k| ItemKey::parse(&k).ok()),
                    message: body.message.unwrap_or_else(|| reply.excerpt()),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CartError::Unauthorized),
            status => {
                reply.log_failure(endpoint);
                Err(CartError::Server {
                    status: Some(status.as_u16()),
                    message: reply.server_message(),
                })
            }
        }
    }
}

fn parse_cart(reply: &Reply) -> Result<CartSnapshot, CartError> {
    let parse_failure = |message: String| {
        tracing::error!(
            error = %message,
            body = %reply.body.chars().take(500).collect::<String>(),
            "Failed to parse cart response"
        );
        CartError::Server {
            status: Some(reply.status.as_u16()),
            message,
        }
    };

    let wire: WireCart = serde_json::from_str(&reply.body).map_err(|e| parse_failure(e.to_string()))?;
    let items = wire
        .items
        .into_iter()
        .map(WireCartItem::into_item)
        .collect::<Result<Vec<_>, _>>()
        .map_err(parse_failure)?;
    Ok(CartSnapshot { items })
}

#[async_trait]
impl RemoteSessionClient for HttpRemoteClient {
    #[instrument(skip(self, credentials), fields(email_domain = %credentials.email.domain()))]
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let request = self
            .inner
            .client
            .post(self.endpoint(&["auth", "login"]))
            .json(&LoginRequest {
                email: credentials.email.as_str(),
                password: credentials.password.expose_secret(),
            });
        let reply = self
            .send(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        match reply.status {
            status if status.is_success() => {
                let server_error = |message: String| AuthError::Server {
                    status: Some(status.as_u16()),
                    message,
                };
                let body: LoginResponse = serde_json::from_str(&reply.body).map_err(|e| {
                    tracing::error!(
                        error = %e,
                        body = %reply.body.chars().take(500).collect::<String>(),
                        "Failed to parse login response"
                    );
                    server_error(e.to_string())
                })?;
                let user_id = UserId::parse(&body.user_id).map_err(|e| server_error(e.to_string()))?;
                if body.token.trim().is_empty() {
                    return Err(server_error("login response carried an empty token".to_string()));
                }
                let display_name = body
                    .display_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| credentials.email.as_str().to_string());
                Ok(Session::new(
                    user_id,
                    display_name,
                    AuthToken::new(body.token),
                    body.expires_at,
                ))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Credentials rejected");
                Err(AuthError::InvalidCredentials)
            }
            status => {
                reply.log_failure("auth/login");
                Err(AuthError::Server {
                    status: Some(status.as_u16()),
                    message: reply.server_message(),
                })
            }
        }
    }

    #[instrument(skip_all)]
    async fn validate_session(&self, token: &AuthToken) -> Result<(), AuthError> {
        let request = self
            .inner
            .client
            .get(self.endpoint(&["auth", "session"]))
            .bearer_auth(token.expose());
        let reply = self
            .send(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        match reply.status {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::Expired),
            status => {
                reply.log_failure("auth/session");
                Err(AuthError::Server {
                    status: Some(status.as_u16()),
                    message: reply.server_message(),
                })
            }
        }
    }

    #[instrument(skip_all)]
    async fn fetch_cart(&self, token: &AuthToken) -> Result<CartSnapshot, CartError> {
        let request = self
            .inner
            .client
            .get(self.endpoint(&["cart"]))
            .bearer_auth(token.expose());
        self.cart_call("cart", request).await
    }

    #[instrument(skip(self, token), fields(item_key = ?op.item_key().map(ItemKey::as_str)))]
    async fn mutate_cart(&self, token: &AuthToken, op: &CartOp) -> Result<CartSnapshot, CartError> {
        let client = &self.inner.client;
        let request = match op {
            CartOp::Add(item) => client
                .post(self.endpoint(&["cart", "items"]))
                .json(&WireCartItem::from(item)),
            CartOp::SetQuantity { item_key, quantity } => client
                .put(self.endpoint(&["cart", "items", item_key.as_str()]))
                .json(&QuantityBody {
                    quantity: quantity.get(),
                }),
            CartOp::Remove { item_key } => {
                client.delete(self.endpoint(&["cart", "items", item_key.as_str()]))
            }
            CartOp::Clear => client.delete(self.endpoint(&["cart", "items"])),
        };
        self.cart_call("cart/items", request.bearer_auth(token.expose()))
            .await
    }
}
