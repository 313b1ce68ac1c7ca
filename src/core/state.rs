// Application state (AppState)

use crate::auth::TokenAuthority;
use crate::server::shutdown::Shutdown;
use crate::stores::Backend;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
///
/// Everything a connection handler needs, injected at spawn time. Cloning is
/// cheap; all fields are shared handles.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend for users and sessions
    pub backend: Arc<dyn Backend>,

    /// Issues and resolves session tokens
    pub authority: Arc<TokenAuthority>,

    /// Set by the shutdown opcode and by OS signals
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, session_ttl: Duration) -> Self {
        let authority = Arc::new(TokenAuthority::new(Arc::clone(&backend), session_ttl));

        Self {
            backend,
            authority,
            shutdown: Shutdown::new(),
        }
    }
}
