//! Per-opcode operation handlers and the connection loop that drives them.
//!
//! Every handler returns either the reply to send or a [`RequestFailure`]
//! carrying the detail code for its path. Handlers never write to the socket
//! themselves; [`connection`] writes exactly one reply per request.

pub mod account;
pub mod admin;
pub mod connection;
pub mod session;

pub use connection::handle_connection;

use crate::core::error::RequestFailure;
use crate::core::state::AppState;
use crate::protocol::{Request, Response};

pub async fn dispatch(state: &AppState, request: Request) -> Result<Response, RequestFailure> {
    match request {
        Request::Hello => Ok(session::hello()),
        Request::CreateUser {
            token,
            role_selector,
            username,
            digest,
        } => admin::create_user(state, token, role_selector, &username, &digest).await,
        Request::RemoveUser { token, username } => admin::remove_user(state, token, &username).await,
        Request::ChangePassword {
            token,
            old_digest,
            new_digest,
        } => account::change_password(state, token, &old_digest, &new_digest).await,
        Request::ChangeRole {
            token,
            username,
            role_name,
        } => admin::change_role(state, token, &username, &role_name).await,
        Request::Authenticate { username, digest } => session::authenticate(state, &username, &digest).await,
        Request::Logout { token } => session::logout(state, token).await,
        Request::Shutdown { token } => admin::shutdown(state, token).await,
    }
}
