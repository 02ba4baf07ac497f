//! Notification sink: user-facing outcome events.
//!
//! Every login result, cart conflict and storage failure is published here.
//! Subscribers that fall behind lose the oldest events, never block the
//! managers.

use reboul_core::ItemKey;
use tokio::sync::broadcast;

use crate::error::{AuthError, CartError, PersistenceError};

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Something the user asked for worked.
    Success,
    /// Neutral state change.
    Info,
    /// Something failed.
    Error,
}

/// An outcome worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Login succeeded.
    LoggedIn {
        /// Name of the customer now logged in.
        display_name: String,
    },
    /// Login failed.
    LoginFailed(AuthError),
    /// The customer logged out.
    LoggedOut,
    /// The session is no longer valid and was discarded.
    SessionExpired,
    /// Units of a product were added to the cart.
    ItemAdded {
        /// Product identity.
        item_key: ItemKey,
        /// Product name.
        name: String,
        /// Units added by this call.
        quantity: u32,
    },
    /// The server refused a cart change. Local state is kept.
    CartConflict {
        /// Line the conflict concerns, if known.
        item_key: Option<ItemKey>,
        /// Server-provided explanation.
        message: String,
    },
    /// A cart change could not be sent to the server.
    CartSyncFailed(CartError),
    /// State could not be saved or loaded. The client keeps working in memory.
    PersistenceFailed(PersistenceError),
}

impl Notification {
    /// Presentation severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::LoggedIn { .. } | Self::ItemAdded { .. } => Severity::Success,
            Self::LoggedOut | Self::SessionExpired => Severity::Info,
            Self::LoginFailed(_)
            | Self::CartConflict { .. }
            | Self::CartSyncFailed(_)
            | Self::PersistenceFailed(_) => Severity::Error,
        }
    }

    /// Short headline.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::LoggedIn { .. } => "Connexion réussie",
            Self::LoginFailed(_) => "Erreur de connexion",
            Self::LoggedOut => "Déconnexion",
            Self::SessionExpired => "Session expirée",
            Self::ItemAdded { .. } => "Produit ajouté au panier",
            Self::CartConflict { .. } | Self::CartSyncFailed(_) | Self::PersistenceFailed(_) => {
                "Erreur"
            }
        }
    }

    /// Longer explanation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::LoggedIn { .. } => "Bienvenue sur votre compte Reboul Store.".to_string(),
            Self::LoginFailed(AuthError::InvalidCredentials) => {
                "Email ou mot de passe incorrect.".to_string()
            }
            Self::LoginFailed(AuthError::Network(_)) => {
                "Impossible de joindre le serveur. Vérifiez votre connexion.".to_string()
            }
            Self::LoginFailed(_) => {
                "Le service de connexion est indisponible. Réessayez plus tard.".to_string()
            }
            Self::LoggedOut => "Vous êtes déconnecté.".to_string(),
            Self::SessionExpired => {
                "Votre session a expiré. Veuillez vous reconnecter.".to_string()
            }
            Self::ItemAdded { name, .. } => format!("{name} a été ajouté à votre panier."),
            Self::CartConflict { message, .. } => message.clone(),
            Self::CartSyncFailed(_) => "Impossible de synchroniser votre panier.".to_string(),
            Self::PersistenceFailed(_) => {
                "Impossible d'enregistrer votre panier sur cet appareil.".to_string()
            }
        }
    }
}

/// Fan-out sender for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// A notifier buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every notification emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Dropped silently when nobody listens.
    pub fn emit(&self, notification: Notification) {
        tracing::debug!(title = notification.title(), "Notification");
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_failure_descriptions_distinguish_cause() {
        let credentials = Notification::LoginFailed(AuthError::InvalidCredentials);
        let network = Notification::LoginFailed(AuthError::Network("timeout".to_string()));
        assert_eq!(credentials.description(), "Email ou mot de passe incorrect.");
        assert_ne!(credentials.description(), network.description());
        assert_eq!(credentials.title(), "Erreur de connexion");
        assert_eq!(credentials.severity(), Severity::Error);
    }

    #[test]
    fn test_item_added_description() {
        let n = Notification::ItemAdded {
            item_key: ItemKey::parse("k").unwrap(),
            name: "T-shirt Reboul".to_string(),
            quantity: 1,
        };
        assert_eq!(n.description(), "T-shirt Reboul a été ajouté à votre panier.");
        assert_eq!(n.severity(), Severity::Success);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();
        notifier.emit(Notification::LoggedOut);
        assert_eq!(rx.recv().await.unwrap(), Notification::LoggedOut);
    }

    #[test]
    fn test_emit_without_subscribers() {
        Notifier::new(1).emit(Notification::SessionExpired);
    }
}
