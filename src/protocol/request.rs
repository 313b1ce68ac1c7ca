use crate::core::error::DecodeError;
use crate::models::token::Token;
use crate::protocol::schema::{decode_fields, encode_fields, Field, FieldSpec};

const HELLO: &[FieldSpec] = &[];
const CREATE_USER: &[FieldSpec] = &[
    FieldSpec::token("token"),
    FieldSpec::byte("role_selector"),
    FieldSpec::bytes("username"),
    FieldSpec::bytes("digest"),
];
const REMOVE_USER: &[FieldSpec] = &[FieldSpec::token("token"), FieldSpec::bytes("username")];
const CHANGE_PASSWORD: &[FieldSpec] = &[
    FieldSpec::token("token"),
    FieldSpec::bytes("old_digest"),
    FieldSpec::bytes("new_digest"),
];
const CHANGE_ROLE: &[FieldSpec] = &[
    FieldSpec::token("token"),
    FieldSpec::bytes("username"),
    FieldSpec::bytes("role_name"),
];
const AUTHENTICATE: &[FieldSpec] = &[FieldSpec::bytes("username"), FieldSpec::bytes("digest")];
const TOKEN_ONLY: &[FieldSpec] = &[FieldSpec::token("token")];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Hello = 0xAA,
    CreateUser = 0x10,
    RemoveUser = 0x11,
    ChangePassword = 0x12,
    ChangeRole = 0x13,
    Authenticate = 0x20,
    Logout = 0x21,
    Shutdown = 0x01,
}

impl Opcode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            Opcode::Hello => HELLO,
            Opcode::CreateUser => CREATE_USER,
            Opcode::RemoveUser => REMOVE_USER,
            Opcode::ChangePassword => CHANGE_PASSWORD,
            Opcode::ChangeRole => CHANGE_ROLE,
            Opcode::Authenticate => AUTHENTICATE,
            Opcode::Logout | Opcode::Shutdown => TOKEN_ONLY,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0xAA => Ok(Opcode::Hello),
            0x10 => Ok(Opcode::CreateUser),
            0x11 => Ok(Opcode::RemoveUser),
            0x12 => Ok(Opcode::ChangePassword),
            0x13 => Ok(Opcode::ChangeRole),
            0x20 => Ok(Opcode::Authenticate),
            0x21 => Ok(Opcode::Logout),
            0x01 => Ok(Opcode::Shutdown),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

/// A decoded client command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Hello,
    CreateUser {
        token: Token,
        /// Raw selector byte; mapped to a role only after authorization
        role_selector: u8,
        username: String,
        digest: Vec<u8>,
    },
    RemoveUser {
        token: Token,
        username: String,
    },
    ChangePassword {
        token: Token,
        old_digest: Vec<u8>,
        new_digest: Vec<u8>,
    },
    ChangeRole {
        token: Token,
        username: String,
        role_name: String,
    },
    Authenticate {
        username: String,
        digest: Vec<u8>,
    },
    Logout {
        token: Token,
    },
    Shutdown {
        token: Token,
    },
}

fn text(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8(field))
}

impl Request {
    /// Decode one frame: `[opcode:1][payload...]`
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let (&first, payload) = frame.split_first().ok_or(DecodeError::EmptyFrame)?;
        let opcode = Opcode::try_from(first)?;
        let fields = decode_fields(opcode.schema(), payload)?;

        let request = match (opcode, fields.as_slice()) {
            (Opcode::Hello, []) => Request::Hello,
            (
                Opcode::CreateUser,
                [Field::Token(token), Field::Byte(role_selector), Field::Bytes(username), Field::Bytes(digest)],
            ) => Request::CreateUser {
                token: *token,
                role_selector: *role_selector,
                username: text(username, "username")?,
                digest: digest.to_vec(),
            },
            (Opcode::RemoveUser, [Field::Token(token), Field::Bytes(username)]) => Request::RemoveUser {
                token: *token,
                username: text(username, "username")?,
            },
            (
                Opcode::ChangePassword,
                [Field::Token(token), Field::Bytes(old_digest), Field::Bytes(new_digest)],
            ) => Request::ChangePassword {
                token: *token,
                old_digest: old_digest.to_vec(),
                new_digest: new_digest.to_vec(),
            },
            (Opcode::ChangeRole, [Field::Token(token), Field::Bytes(username), Field::Bytes(role_name)]) => {
                Request::ChangeRole {
                    token: *token,
                    username: text(username, "username")?,
                    role_name: text(role_name, "role_name")?,
                }
            }
            (Opcode::Authenticate, [Field::Bytes(username), Field::Bytes(digest)]) => Request::Authenticate {
                username: text(username, "username")?,
                digest: digest.to_vec(),
            },
            (Opcode::Logout, [Field::Token(token)]) => Request::Logout { token: *token },
            (Opcode::Shutdown, [Field::Token(token)]) => Request::Shutdown { token: *token },
            (opcode, _) => return Err(DecodeError::SchemaMismatch(opcode.as_byte())),
        };

        Ok(request)
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Hello => Opcode::Hello,
            Request::CreateUser { .. } => Opcode::CreateUser,
            Request::RemoveUser { .. } => Opcode::RemoveUser,
            Request::ChangePassword { .. } => Opcode::ChangePassword,
            Request::ChangeRole { .. } => Opcode::ChangeRole,
            Request::Authenticate { .. } => Opcode::Authenticate,
            Request::Logout { .. } => Opcode::Logout,
            Request::Shutdown { .. } => Opcode::Shutdown,
        }
    }

    /// Client-side encoding of the same frame layout
    pub fn encode(&self) -> Vec<u8> {
        let fields = match self {
            Request::Hello => vec![],
            Request::CreateUser {
                token,
                role_selector,
                username,
                digest,
            } => vec![
                Field::Token(*token),
                Field::Byte(*role_selector),
                Field::Bytes(username.as_bytes()),
                Field::Bytes(digest),
            ],
            Request::RemoveUser { token, username } => {
                vec![Field::Token(*token), Field::Bytes(username.as_bytes())]
            }
            Request::ChangePassword {
                token,
                old_digest,
                new_digest,
            } => vec![Field::Token(*token), Field::Bytes(old_digest), Field::Bytes(new_digest)],
            Request::ChangeRole {
                token,
                username,
                role_name,
            } => vec![
                Field::Token(*token),
                Field::Bytes(username.as_bytes()),
                Field::Bytes(role_name.as_bytes()),
            ],
            Request::Authenticate { username, digest } => {
                vec![Field::Bytes(username.as_bytes()), Field::Bytes(digest)]
            }
            Request::Logout { token } | Request::Shutdown { token } => vec![Field::Token(*token)],
        };

        let mut buf = Vec::with_capacity(64);
        buf.push(self.opcode().as_byte());
        encode_fields(&fields, &mut buf);
        buf
    }
}
