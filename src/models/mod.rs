pub mod role;
pub mod session;
pub mod token;
pub mod user;
