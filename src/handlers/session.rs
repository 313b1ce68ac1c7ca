use crate::core::error::{ErrorCode, OrCode, RequestFailure};
use crate::core::state::AppState;
use crate::models::token::Token;
use crate::protocol::Response;
use tracing::info;

/// Liveness check
pub fn hello() -> Response {
    Response::Ok
}

/// Open a session for `username`, replying with the role ID and the new token
pub async fn authenticate(state: &AppState, username: &str, digest: &[u8]) -> Result<Response, RequestFailure> {
    let (role, token) = state
        .authority
        .authenticate(username, digest)
        .await
        .or_code(ErrorCode::Request)?;

    Ok(Response::Authenticated {
        role_id: role.id(),
        token,
    })
}

/// End the session bound to `token`. Unknown or expired tokens fail.
pub async fn logout(state: &AppState, token: Token) -> Result<Response, RequestFailure> {
    state.authority.invalidate(token).await.or_code(ErrorCode::Request)?;

    info!(token = %token, "Session closed");
    Ok(Response::Ok)
}
