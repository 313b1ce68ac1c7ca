use crate::auth::TokenAuthority;
use crate::utils::time::current_timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Background task removing expired sessions on a fixed interval
pub struct Sweeper {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn spawn(authority: Arc<TokenAuthority>, period: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                debug!("Running session sweep");
                match authority.sweep_expired(current_timestamp()).await {
                    Ok(0) => debug!("Session sweep completed, nothing expired"),
                    Ok(removed) => info!(removed_sessions = removed, "Session sweep completed"),
                    Err(e) => warn!(error = %e, "Session sweep failed"),
                }
            }

            debug!("Session sweeper stopped");
        });

        Self { stop_tx, handle }
    }

    /// Stop the task and wait until it has exited
    pub async fn stop(self) {
        // The task may already be gone if it panicked
        let _ = self.stop_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session sweeper exited abnormally");
        }
    }
}
