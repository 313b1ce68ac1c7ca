use crate::auth::verify_ownership;
use crate::core::error::{ErrorCode, OrCode, RequestFailure};
use crate::core::state::AppState;
use crate::models::token::Token;
use crate::protocol::Response;
use tracing::info;

/// Replace the caller's own digest. Gated on ownership, not on role: the
/// token must resolve to a user whose stored digest equals `old_digest`.
pub async fn change_password(
    state: &AppState,
    token: Token,
    old_digest: &[u8],
    new_digest: &[u8],
) -> Result<Response, RequestFailure> {
    let username = verify_ownership(&state.authority, token, old_digest)
        .await
        .or_code(ErrorCode::Ownership)?;

    state
        .backend
        .set_digest(&username, new_digest)
        .await
        .or_code(ErrorCode::Ownership)?;

    info!(username = %username, "Credential changed");
    Ok(Response::Ok)
}
