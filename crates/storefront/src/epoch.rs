//! Generation tracking for cancellable remote calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// The current generation of a manager's state.
///
/// Logout and cart clears advance the epoch: calls started under an older
/// generation are cancelled and their late results are ignored.
#[derive(Debug, Default)]
pub(crate) struct Epoch {
    generation: u64,
    token: CancellationToken,
}

impl Epoch {
    /// A ticket for a call started now.
    pub(crate) fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            token: self.token.clone(),
        }
    }

    /// Cancel every outstanding ticket and start a new generation.
    pub(crate) fn advance(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;
    }

    /// Whether `ticket` belongs to the current generation.
    pub(crate) fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && !ticket.token.is_cancelled()
    }
}

/// Proof that a call was started under a given generation.
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    generation: u64,
    token: CancellationToken,
}

impl Ticket {
    /// Drive `fut` until it completes or the ticket's generation ends.
    ///
    /// Returns `None` when cancelled; `fut` is dropped at that point.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_advance_invalidates_tickets() {
        let mut epoch = Epoch::default();
        let ticket = epoch.ticket();
        assert!(epoch.is_current(&ticket));

        epoch.advance();
        assert!(!epoch.is_current(&ticket));
        assert!(epoch.is_current(&epoch.ticket()));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let epoch = Epoch::default();
        assert_eq!(epoch.ticket().run(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_run_cancelled_by_advance() {
        let mut epoch = Epoch::default();
        let ticket = epoch.ticket();
        let pending = tokio::spawn(async move {
            ticket
                .run(tokio::time::sleep(Duration::from_secs(60)))
                .await
        });
        tokio::task::yield_now().await;
        epoch.advance();
        assert_eq!(pending.await.ok().flatten(), None);
    }
}
