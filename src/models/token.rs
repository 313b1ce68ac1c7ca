use std::fmt;

/// Largest value a session token may take. Tokens stay inside the
/// non-negative range of a signed 32-bit integer.
pub const MAX_TOKEN: u32 = i32::MAX as u32;

/// Opaque 32-bit session credential.
///
/// On the wire a token is always 4 bytes little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u32);

impl Token {
    pub const WIRE_LEN: usize = 4;

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
