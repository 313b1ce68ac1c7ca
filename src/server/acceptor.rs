use crate::core::state::AppState;
use crate::handlers::handle_connection;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};

/// Wait after a failed accept so a persistent error (e.g. EMFILE) does not spin
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

async fn pause_after_accept_error(e: &io::Error) {
    warn!(error = %e, backoff_ms = ACCEPT_ERROR_BACKOFF.as_millis() as u64, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Accept loop. Each connection gets its own task and never blocks the loop.
pub struct Acceptor {
    listener: TcpListener,
    app: Arc<AppState>,
    accept_timeout: Duration,
    state: ServerState,
}

impl Acceptor {
    pub async fn bind(addr: &str, app: Arc<AppState>, accept_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind TCP listener to {}", addr))?;

        Ok(Self {
            listener,
            app,
            accept_timeout,
            state: ServerState::Starting,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read listener address")
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    fn transition(&mut self, next: ServerState) {
        debug!(from = ?self.state, to = ?next, "Server state change");
        self.state = next;
    }

    /// Run until the shutdown flag is set. Open connections are left to
    /// finish on their own.
    pub async fn run(&mut self) {
        self.transition(ServerState::Listening);
        let mut conn_id: u64 = 0;

        loop {
            if self.app.shutdown.is_triggered() {
                self.transition(ServerState::ShuttingDown);
                break;
            }

            // A timeout only means no client arrived; re-check the flag
            let accepted = match timeout(self.accept_timeout, self.listener.accept()).await {
                Ok(accepted) => accepted,
                Err(_) => continue,
            };

            match accepted {
                Ok((stream, peer)) => {
                    conn_id += 1;
                    let span = info_span!("connection", conn_id, peer = %peer);
                    tokio::spawn(handle_connection(Arc::clone(&self.app), stream).instrument(span));
                }
                Err(e) => pause_after_accept_error(&e).await,
            }
        }

        info!(connections_accepted = conn_id, "Acceptor stopped");
        self.transition(ServerState::Stopped);
    }
}
