//! Persistence backends for users, roles and sessions.
//!
//! The request core only talks to [`Backend`]. Uniqueness of usernames,
//! uniqueness of tokens and the one-session-per-user rule are enforced by
//! the backend as conditional writes; the read-only checks the core does
//! beforehand are advisory.

pub mod memory;

pub use memory::MemoryBackend;

use crate::core::error::BackendError;
use crate::models::role::Role;
use crate::models::token::Token;
use crate::models::user::User;
use async_trait::async_trait;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether the backend can currently serve queries
    fn is_connected(&self) -> bool;

    /// Role name of the user owning `token` (session -> user -> role join)
    async fn role_by_token(&self, token: Token) -> Result<String, BackendError>;

    /// Username owning `token`
    async fn user_by_token(&self, token: Token) -> Result<String, BackendError>;

    async fn find_user(&self, username: &str) -> Result<User, BackendError>;

    async fn stored_digest(&self, username: &str) -> Result<Vec<u8>, BackendError>;

    /// Fails with `DuplicateUsername` if the name is taken
    async fn insert_user(&self, username: &str, digest: &[u8], role: Role) -> Result<(), BackendError>;

    /// Removes the user and every session they own
    async fn remove_user(&self, username: &str) -> Result<(), BackendError>;

    async fn set_digest(&self, username: &str, digest: &[u8]) -> Result<(), BackendError>;

    /// `role_name` is resolved against the role table; unknown names fail
    async fn set_role(&self, username: &str, role_name: &str) -> Result<(), BackendError>;

    async fn has_active_session(&self, username: &str) -> Result<bool, BackendError>;

    async fn token_exists(&self, token: Token) -> Result<bool, BackendError>;

    /// Conditional insert: fails with `AlreadyConnected` when the user has a
    /// live session and with `TokenTaken` when the token is bound elsewhere.
    async fn create_session(
        &self,
        username: &str,
        token: Token,
        created_at: i64,
        expires_at: i64,
    ) -> Result<(), BackendError>;

    async fn delete_session_by_token(&self, token: Token) -> Result<(), BackendError>;

    /// Returns the number of sessions removed
    async fn delete_sessions_for_user(&self, username: &str) -> Result<usize, BackendError>;

    /// Removes every session whose deadline is at or before `now`
    async fn delete_expired_sessions(&self, now: i64) -> Result<usize, BackendError>;

    async fn clear_all_sessions(&self) -> Result<(), BackendError>;
}
