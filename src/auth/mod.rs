pub mod authorization;
pub mod token_authority;

pub use authorization::{require_role, verify_ownership};
pub use token_authority::TokenAuthority;
