//! Binary wire format.
//!
//! Requests are `[opcode:1][payload...]`, replies are `[status:1][detail...]`.

pub mod request;
pub mod response;
pub mod schema;

pub use request::{Opcode, Request};
pub use response::Response;

/// Largest frame read from a client in one receive
pub const MAX_FRAME_LEN: usize = 1024;
