use crate::core::error::{DecodeError, ErrorCode};
use crate::models::token::Token;

pub const STATUS_OK: u8 = 0x0F;
pub const STATUS_FAILURE: u8 = 0xF0;
const NO_ERROR: u8 = 0x00;

/// A reply frame: `[status:1][detail...]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    /// `0x0F 0x00`
    Ok,
    /// `0x0F 0x00 <role id> <token: 4 bytes LE>`
    Authenticated { role_id: u8, token: Token },
    /// `0xF0 <code>`
    Failure(ErrorCode),
}

impl Response {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Ok => buf.extend_from_slice(&[STATUS_OK, NO_ERROR]),
            Response::Authenticated { role_id, token } => {
                buf.extend_from_slice(&[STATUS_OK, NO_ERROR, *role_id]);
                buf.extend_from_slice(&token.to_le_bytes());
            }
            Response::Failure(code) => buf.extend_from_slice(&[STATUS_FAILURE, code.as_byte()]),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(7);
        self.encode(&mut buf);
        buf
    }

    /// Client-side parsing. A success frame carrying role and token bytes is
    /// read as `Authenticated`.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        match frame {
            [] => Err(DecodeError::EmptyFrame),
            [STATUS_OK, NO_ERROR, role_id, a, b, c, d, ..] => Ok(Response::Authenticated {
                role_id: *role_id,
                token: Token::from_le_bytes([*a, *b, *c, *d]),
            }),
            [STATUS_OK, NO_ERROR, ..] => Ok(Response::Ok),
            [STATUS_FAILURE, code, ..] => ErrorCode::from_byte(*code)
                .map(Response::Failure)
                .ok_or(DecodeError::UnknownStatus(*code)),
            [STATUS_OK | STATUS_FAILURE] => Err(DecodeError::Truncated {
                field: "detail",
                needed: 1,
                available: 0,
            }),
            [STATUS_OK, other, ..] | [other, ..] => Err(DecodeError::UnknownStatus(*other)),
        }
    }
}
