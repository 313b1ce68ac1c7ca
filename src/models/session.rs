use crate::models::token::Token;
use crate::utils::time::is_expired;

/// Live binding between a token, its owner and an expiry deadline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: Token,
    pub user_id: u32,
    pub username: String,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds; the session is dead from this instant on
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, current_time: i64) -> bool {
        is_expired(self.expires_at, current_time)
    }
}
