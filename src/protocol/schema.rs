//! Declarative frame layouts.
//!
//! Every request payload is an ordered list of fields. A schema names each
//! field and its kind; [`decode_fields`] walks the payload once, checking
//! every length against the bytes that remain before slicing.

use crate::core::error::DecodeError;
use crate::models::token::Token;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// 4 bytes, little-endian
    Token,
    /// 1 raw byte
    Byte,
    /// 1-byte length followed by that many bytes
    Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn token(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Token,
        }
    }

    pub const fn byte(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Byte,
        }
    }

    pub const fn bytes(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Bytes,
        }
    }
}

/// One decoded field, borrowing from the frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field<'a> {
    Token(Token),
    Byte(u8),
    Bytes(&'a [u8]),
}

struct Cursor<'a> {
    remaining: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining.len() {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                available: self.remaining.len(),
            });
        }
        let (head, tail) = self.remaining.split_at(len);
        self.remaining = tail;
        Ok(head)
    }
}

/// Decode `payload` according to `schema`.
///
/// Bytes left over after the last field are ignored.
pub fn decode_fields<'a>(schema: &[FieldSpec], payload: &'a [u8]) -> Result<Vec<Field<'a>>, DecodeError> {
    let mut cursor = Cursor { remaining: payload };
    let mut fields = Vec::with_capacity(schema.len());

    for spec in schema {
        let field = match spec.kind {
            FieldKind::Token => {
                let raw = cursor.take(Token::WIRE_LEN, spec.name)?;
                Field::Token(Token::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            FieldKind::Byte => Field::Byte(cursor.take(1, spec.name)?[0]),
            FieldKind::Bytes => {
                let len = cursor.take(1, spec.name)?[0] as usize;
                Field::Bytes(cursor.take(len, spec.name)?)
            }
        };
        fields.push(field);
    }

    Ok(fields)
}

/// Encode `fields` into `buf` following the same layout rules.
///
/// Byte strings longer than 255 bytes do not fit a length prefix and are
/// truncated to 255.
pub fn encode_fields(fields: &[Field<'_>], buf: &mut Vec<u8>) {
    for field in fields {
        match field {
            Field::Token(token) => buf.extend_from_slice(&token.to_le_bytes()),
            Field::Byte(byte) => buf.push(*byte),
            Field::Bytes(bytes) => {
                let len = bytes.len().min(u8::MAX as usize);
                buf.push(len as u8);
                buf.extend_from_slice(&bytes[..len]);
            }
        }
    }
}
