use crate::models::role::Role;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Stable user ID
    pub id: u32,
    /// Unique login name
    pub username: String,
    /// Opaque credential digest, compared byte for byte
    pub digest: Vec<u8>,
    /// Privilege level
    pub role: Role,
}

impl User {
    pub fn new(id: u32, username: impl Into<String>, digest: impl Into<Vec<u8>>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            digest: digest.into(),
            role,
        }
    }
}
