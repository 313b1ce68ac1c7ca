use crate::core::error::{AuthError, BackendError};
use crate::models::role::Role;
use crate::models::token::{Token, MAX_TOKEN};
use crate::stores::Backend;
use crate::utils::auth::digests_match;
use crate::utils::time::{current_timestamp, current_timestamp_nanos};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Issues, resolves and retires session tokens
pub struct TokenAuthority {
    backend: Arc<dyn Backend>,
    ttl_seconds: i64,
}

/// Draw a candidate from a generator reseeded from the clock on every call
fn time_seeded_candidate() -> Token {
    let mut rng = StdRng::seed_from_u64(current_timestamp_nanos());
    Token::new(rng.random_range(0..=MAX_TOKEN))
}

impl TokenAuthority {
    pub fn new(backend: Arc<dyn Backend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl_seconds: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub async fn generate_token(&self) -> Result<Token, BackendError> {
        self.generate_token_with(time_seeded_candidate).await
    }

    /// Keep drawing candidates until one is not bound to an active session.
    ///
    /// There is deliberately no attempt limit.
    pub async fn generate_token_with<F>(&self, mut candidate: F) -> Result<Token, BackendError>
    where
        F: FnMut() -> Token + Send,
    {
        loop {
            let token = candidate();
            if !self.backend.token_exists(token).await? {
                return Ok(token);
            }
            debug!(token = %token, "Token candidate already active, drawing again");
        }
    }

    /// Username owning `token`
    pub async fn resolve(&self, token: Token) -> Result<String, BackendError> {
        self.backend.user_by_token(token).await
    }

    /// Role name of the user owning `token`
    pub async fn resolve_role(&self, token: Token) -> Result<String, BackendError> {
        self.backend.role_by_token(token).await
    }

    pub async fn invalidate(&self, token: Token) -> Result<(), BackendError> {
        self.backend.delete_session_by_token(token).await
    }

    pub async fn invalidate_all_for_user(&self, username: &str) -> Result<usize, BackendError> {
        self.backend.delete_sessions_for_user(username).await
    }

    pub async fn sweep_expired(&self, now: i64) -> Result<usize, BackendError> {
        self.backend.delete_expired_sessions(now).await
    }

    /// Check credentials and open a session. Returns the user's role and the
    /// new token.
    pub async fn authenticate(&self, username: &str, digest: &[u8]) -> Result<(Role, Token), AuthError> {
        self.authenticate_with(username, digest, time_seeded_candidate).await
    }

    pub async fn authenticate_with<F>(
        &self,
        username: &str,
        digest: &[u8],
        mut candidate: F,
    ) -> Result<(Role, Token), AuthError>
    where
        F: FnMut() -> Token + Send,
    {
        let user = match self.backend.find_user(username).await {
            Ok(user) => user,
            Err(BackendError::NotFound(_)) => return Err(AuthError::UnknownUser(username.to_string())),
            Err(e) => return Err(e.into()),
        };

        if !digests_match(digest, &user.digest) {
            return Err(AuthError::IncorrectCredential(username.to_string()));
        }

        if self.backend.has_active_session(username).await? {
            return Err(AuthError::AlreadyConnected(username.to_string()));
        }

        // The checks above are advisory; create_session is the atomic one.
        loop {
            let token = self.generate_token_with(&mut candidate).await?;
            let created_at = current_timestamp();
            let expires_at = created_at.saturating_add(self.ttl_seconds);

            match self
                .backend
                .create_session(username, token, created_at, expires_at)
                .await
            {
                Ok(()) => {
                    info!(username = %username, role = %user.role, expires_at, "Session opened");
                    return Ok((user.role, token));
                }
                Err(e) if e.is_retryable() => {
                    debug!(token = %token, error = %e, "Token claimed concurrently, retrying");
                }
                Err(BackendError::AlreadyConnected(name)) => return Err(AuthError::AlreadyConnected(name)),
                Err(BackendError::NotFound(name)) => return Err(AuthError::UnknownUser(name)),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
