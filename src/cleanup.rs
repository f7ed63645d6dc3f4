//! Background sweep of expired pending logins and sessions.
//!
//! Neither consumption nor session lookup depends on the sweep: expired records
//! are rejected on access whether or not they have been purged yet.

use crate::auth::nonce::NonceStore;
use crate::auth::session::SessionIssuer;
use std::sync::Arc;
use std::time::Duration;

/// How many records one sweep dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Swept {
    pub pending_logins: usize,
    pub sessions: usize,
}

/// Run the cleanup loop.
///
/// Calls `purge_expired` on both stores every `interval`. Errors are logged and
/// the loop keeps going.
pub async fn run_cleanup_loop(
    nonces: Arc<dyn NonceStore>,
    sessions: Arc<dyn SessionIssuer>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        sweep_once(nonces.as_ref(), sessions.as_ref()).await;
    }
}

/// One sweep over both stores.
pub async fn sweep_once(nonces: &dyn NonceStore, sessions: &dyn SessionIssuer) -> Swept {
    let pending_logins = match nonces.purge_expired().await {
        Ok(purged) => purged,
        Err(e) => {
            tracing::error!(
                action = "cleanup",
                store = "nonces",
                error = %e,
                "Cleanup job failed"
            );
            0
        }
    };

    let sessions = match sessions.purge_expired().await {
        Ok(purged) => purged,
        Err(e) => {
            tracing::error!(
                action = "cleanup",
                store = "sessions",
                error = %e,
                "Cleanup job failed"
            );
            0
        }
    };

    if pending_logins > 0 || sessions > 0 {
        tracing::info!(
            action = "cleanup",
            pending_logins = pending_logins,
            sessions = sessions,
            "Expired records purged"
        );
    }

    Swept {
        pending_logins,
        sessions,
    }
}
