// Centralized error handling for the server

use crate::models::token::Token;
use thiserror::Error;

/// Detail byte sent after the failure status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Persistence backend not connected
    BackendUnavailable = 0x01,
    /// Generic request failure (unauthorized, malformed, domain failure)
    Request = 0x02,
    /// Role lookup failed on the shutdown path
    ShutdownLookup = 0x03,
    /// Ownership or lookup failure on the credential/role change paths
    Ownership = 0x04,
}

impl ErrorCode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ErrorCode::BackendUnavailable),
            0x02 => Some(ErrorCode::Request),
            0x03 => Some(ErrorCode::ShutdownLookup),
            0x04 => Some(ErrorCode::Ownership),
            _ => None,
        }
    }
}

/// Errors raised while turning raw bytes into a typed frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("Truncated field '{field}': needs {needed} bytes, {available} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Field '{0}' is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("Unknown status byte: 0x{0:02x}")]
    UnknownStatus(u8),

    #[error("Decoded fields do not match the schema for opcode 0x{0:02x}")]
    SchemaMismatch(u8),
}

/// Errors reported by the persistence backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Persistence backend is not connected")]
    Unavailable,

    #[error("No active session for token {0}")]
    TokenNotFound(Token),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Late-discovered token collision; the caller may retry with a new token
    #[error("Token {0} is already bound to a session")]
    TokenTaken(Token),

    #[error("User {0} already has an active session")]
    AlreadyConnected(String),

    /// The journal rejected the record; the mutation was not applied
    #[error("Failed to journal change: {0}")]
    Journal(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::TokenTaken(_))
    }
}

/// Errors from the Authenticate flow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Incorrect credential for user {0}")]
    IncorrectCredential(String),

    #[error("User {0} is already connected")]
    AlreadyConnected(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors from the authorization gate and the ownership check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Token does not reference an active session")]
    TokenInvalid,

    #[error("Role {actual} is not permitted, {required} required")]
    Forbidden {
        required: &'static str,
        actual: String,
    },

    #[error("Old credential does not match")]
    CredentialMismatch,

    #[error("Lookup failed: {0}")]
    Lookup(#[source] BackendError),
}

/// Why a request failed, independent of the code reported to the client
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Unknown role selector: 0x{0:02x}")]
    UnknownRoleSelector(u8),
}

/// A failed request: the detail code written to the client plus its cause
#[derive(Error, Debug)]
#[error("{cause} (detail code 0x{:02x})", .code.as_byte())]
pub struct RequestFailure {
    pub code: ErrorCode,
    #[source]
    pub cause: FailureCause,
}

impl RequestFailure {
    pub fn new(code: ErrorCode, cause: impl Into<FailureCause>) -> Self {
        Self {
            code,
            cause: cause.into(),
        }
    }
}

/// Attach the detail code chosen by an operation path to a domain error
pub trait OrCode<T> {
    fn or_code(self, code: ErrorCode) -> Result<T, RequestFailure>;
}

impl<T, E> OrCode<T> for Result<T, E>
where
    E: Into<FailureCause>,
{
    fn or_code(self, code: ErrorCode) -> Result<T, RequestFailure> {
        self.map_err(|e| RequestFailure::new(code, e))
    }
}
