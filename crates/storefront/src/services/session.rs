//! Session manager: `Anonymous → Authenticating → Authenticated → Anonymous`.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use reboul_core::{AuthToken, Cart, CartOwner, Email, Session};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::{CartManager, Shared, lock};
use crate::epoch::{Epoch, Ticket};
use crate::error::{self, AuthError, PersistenceError, SessionError, ValidationError};
use crate::notify::Notification;
use crate::remote::Credentials;
use crate::store::PersistedState;

/// Where the customer is in the login lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nobody is logged in.
    #[default]
    Anonymous,
    /// A login is waiting for the server.
    Authenticating {
        /// Email the login was attempted with.
        email: Email,
    },
    /// A customer is logged in.
    Authenticated(Session),
}

impl SessionState {
    /// The session, when authenticated.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Anonymous | Self::Authenticating { .. } => None,
        }
    }
}

/// Result of a login that passed input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The customer is now logged in.
    Authenticated(Session),
    /// The server refused the login, or could not be reached.
    Rejected(AuthError),
    /// A logout superseded the login; its result was discarded.
    Cancelled,
}

/// Result of restoring persisted state at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No usable session was stored.
    Anonymous,
    /// The stored session was reinstated without contacting the server.
    Restored(Session),
    /// The stored session had expired and was discarded.
    Expired,
}

// =============================================================================
// State Cell
// =============================================================================

struct SessionCore {
    state: SessionState,
    epoch: Epoch,
}

/// Authoritative session state plus its change feed.
pub(crate) struct SessionCell {
    core: Mutex<SessionCore>,
    tx: watch::Sender<SessionState>,
}

impl Default for SessionCell {
    fn default() -> Self {
        let (tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            core: Mutex::new(SessionCore {
                state: SessionState::Anonymous,
                epoch: Epoch::default(),
            }),
            tx,
        }
    }
}

impl SessionCell {
    pub(crate) fn state(&self) -> SessionState {
        lock(&self.core).state.clone()
    }

    pub(crate) fn current_session(&self) -> Option<Session> {
        lock(&self.core).state.session().cloned()
    }

    /// Replace the state and publish it. Call with the core locked.
    fn commit(&self, core: &mut SessionCore, state: SessionState) {
        core.state = state.clone();
        self.tx.send_replace(state);
    }
}

/// Resets a login that never finished back to `Anonymous`, including when
/// the `login` future is dropped mid-flight.
struct PendingLogin<'a> {
    cell: &'a SessionCell,
    ticket: Ticket,
}

impl Drop for PendingLogin<'_> {
    fn drop(&mut self) {
        let mut core = lock(&self.cell.core);
        if core.epoch.is_current(&self.ticket)
            && matches!(core.state, SessionState::Authenticating { .. })
        {
            self.cell.commit(&mut core, SessionState::Anonymous);
        }
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Owns the customer session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn cart(&self) -> CartManager {
        CartManager::new(Arc::clone(&self.shared))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.session.state()
    }

    /// The logged-in session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.shared.session.current_session()
    }

    /// Whether a customer is logged in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    /// Watch every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.session.tx.subscribe()
    }

    /// Log in with email and password.
    ///
    /// On success the anonymous cart is merged into the customer's server
    /// cart. Every outcome is also published as a notification.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for a malformed email or empty
    /// password, `SessionError::LoginInProgress` while another login is
    /// pending, and `SessionError::AlreadyAuthenticated` when logged in.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<LoginOutcome, SessionError> {
        let email = Email::parse(email).map_err(ValidationError::from)?;
        if password.expose_secret().is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        let cell = &self.shared.session;
        let ticket = {
            let mut core = lock(&cell.core);
            match core.state {
                SessionState::Authenticating { .. } => return Err(SessionError::LoginInProgress),
                SessionState::Authenticated(_) => return Err(SessionError::AlreadyAuthenticated),
                SessionState::Anonymous => {}
            }
            cell.commit(
                &mut core,
                SessionState::Authenticating {
                    email: email.clone(),
                },
            );
            core.epoch.ticket()
        };
        let pending = PendingLogin {
            cell,
            ticket: ticket.clone(),
        };

        error::add_breadcrumb("auth", "Login attempt", Some(&[("email_domain", email.domain())]));
        let credentials = Credentials { email, password };
        let Some(result) = ticket
            .run(self.shared.remote.authenticate(&credentials))
            .await
        else {
            debug!("Login superseded by logout");
            return Ok(LoginOutcome::Cancelled);
        };

        match result {
            Ok(session) => {
                let committed = {
                    let mut core = lock(&cell.core);
                    let current = core.epoch.is_current(&ticket)
                        && matches!(core.state, SessionState::Authenticating { .. });
                    if current {
                        cell.commit(&mut core, SessionState::Authenticated(session.clone()));
                    }
                    current
                };
                drop(pending);
                if !committed {
                    return Ok(LoginOutcome::Cancelled);
                }

                info!(user_id = %session.user_id, "Logged in");
                error::set_sentry_user(&session.user_id, &session.display_name);
                self.shared.notifier.emit(Notification::LoggedIn {
                    display_name: session.display_name.clone(),
                });
                self.cart().adopt(&session).await;
                Ok(LoginOutcome::Authenticated(session))
            }
            Err(err) => {
                drop(pending);
                if !lock(&cell.core).epoch.is_current(&ticket) {
                    return Ok(LoginOutcome::Cancelled);
                }

                if err.is_server_fault() {
                    error::capture(&err, "Login failed");
                } else {
                    info!(error = %err, "Login rejected");
                }
                self.shared
                    .notifier
                    .emit(Notification::LoginFailed(err.clone()));
                Ok(LoginOutcome::Rejected(err))
            }
        }
    }

    /// Log out: drop the session and its cart, clear persisted state and
    /// cancel pending calls. Does nothing when nobody is logged in.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        {
            let mut core = lock(&self.shared.session.core);
            if core.state == SessionState::Anonymous {
                return;
            }
            core.epoch.advance();
            self.shared.session.commit(&mut core, SessionState::Anonymous);
        }

        self.cart().reset();
        error::clear_sentry_user();
        error::add_breadcrumb("auth", "Logout", None);
        self.shared.forget().await;

        info!("Logged out");
        self.shared.notifier.emit(Notification::LoggedOut);
    }

    /// Reinstate the persisted session and cart. Call once at startup.
    ///
    /// A session that has not expired locally becomes `Authenticated` without
    /// a server round trip; use [`SessionManager::verify_session`] to confirm
    /// it. An expired session is discarded together with its cart.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> RestoreOutcome {
        match self.state() {
            SessionState::Anonymous => {}
            SessionState::Authenticated(session) => return RestoreOutcome::Restored(session),
            SessionState::Authenticating { .. } => return RestoreOutcome::Anonymous,
        }

        let PersistedState { session, cart, .. } = match self.shared.persister.load().await {
            Ok(Some(state)) => state,
            Ok(None) => return RestoreOutcome::Anonymous,
            Err(PersistenceError::Corrupt(reason)) => {
                warn!(%reason, "Discarding corrupt persisted state");
                self.shared.forget().await;
                return RestoreOutcome::Anonymous;
            }
            Err(err) => {
                self.shared.report_persistence(err);
                return RestoreOutcome::Anonymous;
            }
        };

        match session {
            Some(session) if session.is_expired(Utc::now()) => {
                info!(user_id = %session.user_id, "Persisted session has expired");
                self.cart().reset();
                self.shared.forget().await;
                self.shared.notifier.emit(Notification::SessionExpired);
                RestoreOutcome::Expired
            }
            Some(session) => {
                {
                    let mut core = lock(&self.shared.session.core);
                    if core.state != SessionState::Anonymous {
                        return RestoreOutcome::Anonymous;
                    }
                    self.shared
                        .session
                        .commit(&mut core, SessionState::Authenticated(session.clone()));
                }
                error::set_sentry_user(&session.user_id, &session.display_name);
                if cart.owner().user_id() == Some(&session.user_id) {
                    self.cart().install(cart);
                } else if cart.owner().is_anonymous() {
                    debug!(items = cart.len(), "Attaching anonymous cart to restored session");
                    self.cart().adopt_restored(cart, &session).await;
                } else {
                    debug!("Persisted cart belongs to another owner, starting empty");
                    self.cart().install(Cart::new(CartOwner::Customer {
                        user_id: session.user_id.clone(),
                    }));
                }
                info!(user_id = %session.user_id, "Session restored");
                RestoreOutcome::Restored(session)
            }
            None => {
                if cart.owner().is_anonymous() {
                    self.cart().install(cart);
                } else {
                    debug!("Dropping cart of an ended session");
                    self.shared.forget().await;
                }
                RestoreOutcome::Anonymous
            }
        }
    }

    /// Confirm the current session with the server.
    ///
    /// Returns `Ok(true)` when the server accepts the token and `Ok(false)`
    /// when there is no session or the server rejected it (the session is
    /// then expired locally).
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` when the server could not give an answer; the
    /// session is kept in that case.
    #[instrument(skip(self))]
    pub async fn verify_session(&self) -> Result<bool, AuthError> {
        let (ticket, token) = {
            let core = lock(&self.shared.session.core);
            match &core.state {
                SessionState::Authenticated(session) => {
                    (core.epoch.ticket(), session.token.clone())
                }
                SessionState::Anonymous | SessionState::Authenticating { .. } => {
                    return Ok(false);
                }
            }
        };

        match ticket
            .run(self.shared.remote.validate_session(&token))
            .await
        {
            None => Ok(false),
            Some(Ok(())) => Ok(true),
            Some(Err(AuthError::Expired | AuthError::InvalidCredentials)) => {
                self.expire_if_token(&token).await;
                Ok(false)
            }
            Some(Err(err)) => {
                if err.is_server_fault() {
                    error::capture(&err, "Session verification failed");
                } else {
                    warn!(error = %err, "Could not verify session, keeping it");
                }
                Err(err)
            }
        }
    }

    /// Run the expiry path if `token` is still the current session's token.
    ///
    /// Returns whether the session was expired.
    pub(crate) async fn expire_if_token(&self, token: &AuthToken) -> bool {
        {
            let mut core = lock(&self.shared.session.core);
            match &core.state {
                SessionState::Authenticated(session) if &session.token == token => {}
                _ => return false,
            }
            core.epoch.advance();
            self.shared.session.commit(&mut core, SessionState::Anonymous);
        }

        warn!("Session rejected by the server, logging out");
        self.cart().reset();
        error::clear_sentry_user();
        self.shared.forget().await;
        self.shared.notifier.emit(Notification::SessionExpired);
        true
    }
}
