//! Authenticated session types.

use core::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Opaque bearer token issued by the remote API.
///
/// Implements `Debug` manually to redact the token value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token string.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// The raw token, for building an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Expiry taken from the `exp` claim when the token is a JWT.
    ///
    /// The signature is not verified; the value is only used to avoid
    /// restoring a session the server will reject anyway.
    #[must_use]
    pub fn jwt_expiry(&self) -> Option<DateTime<Utc>> {
        #[derive(Deserialize)]
        struct Claims {
            exp: Option<i64>,
        }

        let mut segments = self.0.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return None;
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let claims: Claims = serde_json::from_slice(&bytes).ok()?;
        DateTime::from_timestamp(claims.exp?, 0)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// The authenticated identity of the current customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Customer ID issued by the remote API.
    pub user_id: UserId,
    /// Name shown in the UI ("Bienvenue, ...").
    pub display_name: String,
    /// Bearer token for authenticated calls.
    pub token: AuthToken,
    /// When the token stops being valid, if known.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session, falling back to the token's JWT expiry when the
    /// server did not send one.
    #[must_use]
    pub fn new(
        user_id: UserId,
        display_name: String,
        token: AuthToken,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let expires_at = expires_at.or_else(|| token.jwt_expiry());
        Self {
            user_id,
            display_name,
            token,
            expires_at,
        }
    }

    /// Whether the session is past its expiry. Sessions without a known
    /// expiry never expire locally.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
