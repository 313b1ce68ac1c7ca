use crate::core::error::BackendError;
use crate::models::role::Role;
use crate::models::session::Session;
use crate::models::token::Token;
use crate::models::user::User;
use crate::stores::Backend;
use crate::utils::time::current_timestamp;
use crate::wal::wal::{Wal, WalOperation};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::warn;

/// In-memory persistence backend
///
/// Users may be journaled to a [`Wal`] so they survive restarts. Sessions
/// live only in memory.
///
/// User mutations are journaled before they are applied; if the journal
/// write fails the mutation is not applied.
///
/// Lock order: when several maps are touched under one guard they are taken
/// as `users`, then `user_sessions`, then `sessions`.
pub struct MemoryBackend {
    users: DashMap<String, User>,
    sessions: DashMap<Token, Session>,
    /// Username -> token of the user's current session. Entries are only
    /// trusted after checking `sessions` agrees.
    user_sessions: DashMap<String, Token>,
    next_user_id: AtomicU32,
    connected: AtomicBool,
    wal: Option<Arc<Wal>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            next_user_id: AtomicU32::new(1),
            connected: AtomicBool::new(true),
            wal: None,
        }
    }

    pub fn with_wal(wal: Arc<Wal>) -> Self {
        Self {
            wal: Some(wal),
            ..Self::new()
        }
    }

    pub fn wal(&self) -> Option<&Arc<Wal>> {
        self.wal.as_ref()
    }

    /// Apply a replayed journal entry without journaling it again
    pub fn apply(&self, op: &WalOperation) {
        match op {
            WalOperation::AddUser {
                id,
                username,
                digest,
                role,
            } => {
                let Some(role) = Role::from_id(*role) else {
                    warn!(username = %username, role, "Unknown role ID in WAL, skipping user");
                    return;
                };
                self.users
                    .insert(username.clone(), User::new(*id, username.clone(), digest.clone(), role));
                self.next_user_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
            }
            WalOperation::RemoveUser { username } => {
                self.users.remove(username);
            }
            WalOperation::SetDigest { username, digest } => {
                if let Some(mut user) = self.users.get_mut(username) {
                    user.digest = digest.clone();
                }
            }
            WalOperation::SetRole { username, role } => {
                match (self.users.get_mut(username), Role::from_id(*role)) {
                    (Some(mut user), Some(role)) => user.role = role,
                    _ => warn!(username = %username, role, "Cannot apply role change from WAL"),
                }
            }
        }
    }

    /// Snapshot of every user, ordered by ID
    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by_key(|user| user.id);
        users
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of stored sessions, including expired ones not yet swept
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable)
        }
    }

    /// Record `op` before it is applied. Callers hold the affected entry
    /// while journaling and only mutate memory on success.
    fn journal(&self, op: WalOperation) -> Result<(), BackendError> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        wal.log_operation(op).map_err(|e| {
            warn!(error = %e, "Failed to log user change to WAL");
            BackendError::Journal(format!("{:#}", e))
        })
    }

    /// The user `session` was issued for, if that exact account still exists
    fn session_owner(&self, session: &Session) -> Option<User> {
        self.users
            .get(&session.username)
            .filter(|user| user.id == session.user_id)
            .map(|user| user.value().clone())
    }

    /// Live session for `token`, if any
    fn live_session(&self, token: Token, now: i64) -> Option<Session> {
        self.sessions
            .get(&token)
            .filter(|session| !session.is_expired(now))
            .map(|session| session.value().clone())
    }

    fn owns_live_session(&self, username: &str, token: Token, now: i64) -> bool {
        self.sessions
            .get(&token)
            .map(|session| session.username == username && !session.is_expired(now))
            .unwrap_or(false)
    }

    /// Bind `session.token` unless a live session already holds it
    fn claim_token(&self, session: Session) -> Result<(), BackendError> {
        let now = session.created_at;
        match self.sessions.entry(session.token) {
            Entry::Occupied(mut existing) => {
                if !existing.get().is_expired(now) {
                    return Err(BackendError::TokenTaken(session.token));
                }
                existing.insert(session);
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn role_by_token(&self, token: Token) -> Result<String, BackendError> {
        self.ensure_connected()?;
        let session = self
            .live_session(token, current_timestamp())
            .ok_or(BackendError::TokenNotFound(token))?;

        // An orphaned session (owner removed or name reused) resolves to nothing
        self.session_owner(&session)
            .map(|user| user.role.name().to_string())
            .ok_or(BackendError::TokenNotFound(token))
    }

    async fn user_by_token(&self, token: Token) -> Result<String, BackendError> {
        self.ensure_connected()?;
        let session = self
            .live_session(token, current_timestamp())
            .ok_or(BackendError::TokenNotFound(token))?;

        self.session_owner(&session)
            .map(|user| user.username)
            .ok_or(BackendError::TokenNotFound(token))
    }

    async fn find_user(&self, username: &str) -> Result<User, BackendError> {
        self.ensure_connected()?;
        self.users
            .get(username)
            .map(|user| user.value().clone())
            .ok_or_else(|| BackendError::NotFound(username.to_string()))
    }

    async fn stored_digest(&self, username: &str) -> Result<Vec<u8>, BackendError> {
        self.ensure_connected()?;
        self.users
            .get(username)
            .map(|user| user.digest.clone())
            .ok_or_else(|| BackendError::NotFound(username.to_string()))
    }

    async fn insert_user(&self, username: &str, digest: &[u8], role: Role) -> Result<(), BackendError> {
        self.ensure_connected()?;
        match self.users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(BackendError::DuplicateUsername(username.to_string())),
            Entry::Vacant(slot) => {
                let id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
                self.journal(WalOperation::AddUser {
                    id,
                    username: username.to_string(),
                    digest: digest.to_vec(),
                    role: role.id(),
                })?;
                slot.insert(User::new(id, username, digest, role));
                Ok(())
            }
        }
    }

    async fn remove_user(&self, username: &str) -> Result<(), BackendError> {
        self.ensure_connected()?;
        match self.users.entry(username.to_string()) {
            Entry::Vacant(_) => return Err(BackendError::NotFound(username.to_string())),
            Entry::Occupied(user) => {
                self.journal(WalOperation::RemoveUser {
                    username: username.to_string(),
                })?;
                user.remove();
            }
        }

        self.delete_sessions_for_user(username).await?;
        Ok(())
    }

    async fn set_digest(&self, username: &str, digest: &[u8]) -> Result<(), BackendError> {
        self.ensure_connected()?;
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| BackendError::NotFound(username.to_string()))?;

        self.journal(WalOperation::SetDigest {
            username: username.to_string(),
            digest: digest.to_vec(),
        })?;
        user.digest = digest.to_vec();
        Ok(())
    }

    async fn set_role(&self, username: &str, role_name: &str) -> Result<(), BackendError> {
        self.ensure_connected()?;
        let role = Role::from_name(role_name).ok_or_else(|| BackendError::UnknownRole(role_name.to_string()))?;
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| BackendError::NotFound(username.to_string()))?;

        self.journal(WalOperation::SetRole {
            username: username.to_string(),
            role: role.id(),
        })?;
        user.role = role;
        Ok(())
    }

    async fn has_active_session(&self, username: &str) -> Result<bool, BackendError> {
        self.ensure_connected()?;
        let now = current_timestamp();
        Ok(self
            .user_sessions
            .get(username)
            .map(|token| self.owns_live_session(username, *token, now))
            .unwrap_or(false))
    }

    async fn token_exists(&self, token: Token) -> Result<bool, BackendError> {
        self.ensure_connected()?;
        Ok(self.live_session(token, current_timestamp()).is_some())
    }

    async fn create_session(
        &self,
        username: &str,
        token: Token,
        created_at: i64,
        expires_at: i64,
    ) -> Result<(), BackendError> {
        self.ensure_connected()?;
        // Held until the session is stored, so the owner cannot be removed
        // in between. Lock order: users, user_sessions, sessions.
        let owner = self
            .users
            .get(username)
            .ok_or_else(|| BackendError::NotFound(username.to_string()))?;

        let session = Session {
            token,
            user_id: owner.id,
            username: username.to_string(),
            created_at,
            expires_at,
        };

        // The user's slot stays locked until the token is claimed, so two
        // concurrent logins for one user cannot both succeed.
        match self.user_sessions.entry(username.to_string()) {
            Entry::Occupied(mut slot) => {
                if self.owns_live_session(username, *slot.get(), created_at) {
                    return Err(BackendError::AlreadyConnected(username.to_string()));
                }
                self.claim_token(session)?;
                slot.insert(token);
            }
            Entry::Vacant(slot) => {
                self.claim_token(session)?;
                slot.insert(token);
            }
        }
        drop(owner);
        Ok(())
    }

    async fn delete_session_by_token(&self, token: Token) -> Result<(), BackendError> {
        self.ensure_connected()?;
        let (_, session) = self
            .sessions
            .remove(&token)
            .ok_or(BackendError::TokenNotFound(token))?;
        self.user_sessions
            .remove_if(&session.username, |_, bound| *bound == token);

        if session.is_expired(current_timestamp()) {
            return Err(BackendError::TokenNotFound(token));
        }
        Ok(())
    }

    async fn delete_sessions_for_user(&self, username: &str) -> Result<usize, BackendError> {
        self.ensure_connected()?;
        self.user_sessions.remove(username);

        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.username != username);
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn delete_expired_sessions(&self, now: i64) -> Result<usize, BackendError> {
        self.ensure_connected()?;
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        self.user_sessions.retain(|username, token| {
            self.sessions
                .get(token)
                .map(|session| session.username == *username)
                .unwrap_or(false)
        });
        Ok(removed)
    }

    async fn clear_all_sessions(&self) -> Result<(), BackendError> {
        self.ensure_connected()?;
        self.user_sessions.clear();
        self.sessions.clear();
        Ok(())
    }
}
