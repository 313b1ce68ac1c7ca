use std::fmt;

/// Privilege levels known to the server.
///
/// Only `Superuser` is ever inspected by the authorization gate; the other
/// levels exist so accounts can be created with a lower privilege.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Role {
    Superuser = 1,
    User = 2,
    Guest = 3,
}

pub const SUPERUSER: &str = "SUPERUSER";

impl Role {
    pub const ALL: [Role; 3] = [Role::Superuser, Role::User, Role::Guest];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Superuser => SUPERUSER,
            Role::User => "USER",
            Role::Guest => "GUEST",
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.id() == id)
    }

    /// Names are matched exactly, the way they are stored.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.name() == name)
    }

    /// Map the CreateUser role-selector byte (0x11, 0x12, 0x13) to a role.
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0x11 => Some(Role::Superuser),
            0x12 => Some(Role::User),
            0x13 => Some(Role::Guest),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
