use crate::auth::require_role;
use crate::core::error::{AuthzError, ErrorCode, FailureCause, OrCode, RequestFailure};
use crate::core::state::AppState;
use crate::models::role::Role;
use crate::models::token::Token;
use crate::protocol::Response;
use tracing::info;

/// A caller with the wrong role always gets the generic request error; lookup
/// failures get the code of the operation path.
fn gate_code(err: &AuthzError, lookup_code: ErrorCode) -> ErrorCode {
    match err {
        AuthzError::Forbidden { .. } => ErrorCode::Request,
        _ => lookup_code,
    }
}

async fn require_superuser(state: &AppState, token: Token, lookup_code: ErrorCode) -> Result<(), RequestFailure> {
    require_role(&state.authority, token, Role::Superuser)
        .await
        .map_err(|e| RequestFailure::new(gate_code(&e, lookup_code), e))
}

/// Create a user with the role named by `role_selector`
///
/// The selector is only interpreted once the caller is authorized.
pub async fn create_user(
    state: &AppState,
    token: Token,
    role_selector: u8,
    username: &str,
    digest: &[u8],
) -> Result<Response, RequestFailure> {
    require_superuser(state, token, ErrorCode::Request).await?;

    let role = Role::from_selector(role_selector).ok_or_else(|| {
        RequestFailure::new(ErrorCode::Request, FailureCause::UnknownRoleSelector(role_selector))
    })?;

    state
        .backend
        .insert_user(username, digest, role)
        .await
        .or_code(ErrorCode::Request)?;

    info!(username = %username, role = %role, "User created");
    Ok(Response::Ok)
}

/// Remove a user along with any session they hold
pub async fn remove_user(state: &AppState, token: Token, username: &str) -> Result<Response, RequestFailure> {
    require_superuser(state, token, ErrorCode::Request).await?;

    state.backend.remove_user(username).await.or_code(ErrorCode::Request)?;

    info!(username = %username, "User removed");
    Ok(Response::Ok)
}

pub async fn change_role(
    state: &AppState,
    token: Token,
    username: &str,
    role_name: &str,
) -> Result<Response, RequestFailure> {
    require_superuser(state, token, ErrorCode::Ownership).await?;

    state
        .backend
        .set_role(username, role_name)
        .await
        .or_code(ErrorCode::Ownership)?;

    info!(username = %username, role = %role_name, "Role changed");
    Ok(Response::Ok)
}

/// Authorize a shutdown request. The caller sets the shutdown flag only
/// after this reply has been written.
pub async fn shutdown(state: &AppState, token: Token) -> Result<Response, RequestFailure> {
    require_superuser(state, token, ErrorCode::ShutdownLookup).await?;

    info!(token = %token, "Shutdown authorized");
    Ok(Response::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::BackendError;
    use crate::stores::{Backend, MemoryBackend};
    use crate::utils::time::current_timestamp;
    use std::sync::Arc;
    use std::time::Duration;

    const ROOT: Token = Token::new(1);
    const BOB: Token = Token::new(2);

    /// "root" is a SUPERUSER, "bob" a plain USER; both are logged in
    async fn setup() -> (Arc<MemoryBackend>, AppState) {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_user("root", &[0xAA], Role::Superuser).await.unwrap();
        backend.insert_user("bob", &[0xBB], Role::User).await.unwrap();

        let now = current_timestamp();
        backend.create_session("root", ROOT, now, now + 900).await.unwrap();
        backend.create_session("bob", BOB, now, now + 900).await.unwrap();

        let state = AppState::new(backend.clone(), Duration::from_secs(900));
        (backend, state)
    }

    #[tokio::test]
    async fn test_create_user_as_superuser() {
        let (backend, state) = setup().await;

        create_user(&state, ROOT, 0x13, "carol", &[0xDE, 0xAD]).await.unwrap();
        let carol = backend.find_user("carol").await.unwrap();
        assert_eq!(carol.role, Role::Guest);
        assert_eq!(carol.digest, vec![0xDE, 0xAD]);

        let failure = create_user(&state, ROOT, 0x13, "carol", &[0x00]).await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::Request);
        assert!(matches!(
            failure.cause,
            FailureCause::Backend(BackendError::DuplicateUsername(_))
        ));
    }

    #[tokio::test]
    async fn test_create_user_rejects_unknown_selector() {
        let (backend, state) = setup().await;

        let failure = create_user(&state, ROOT, 0x42, "carol", &[1]).await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::Request);
        assert!(matches!(failure.cause, FailureCause::UnknownRoleSelector(0x42)));
        assert_eq!(backend.user_count(), 2);
    }

    #[tokio::test]
    async fn test_non_superuser_changes_nothing() {
        let (backend, state) = setup().await;
        let before = backend.users();

        let failures = [
            create_user(&state, BOB, 0x11, "mallory", &[1]).await.unwrap_err(),
            remove_user(&state, BOB, "root").await.unwrap_err(),
            change_role(&state, BOB, "bob", "SUPERUSER").await.unwrap_err(),
            shutdown(&state, BOB).await.unwrap_err(),
        ];

        for failure in &failures {
            assert_eq!(failure.code, ErrorCode::Request);
            assert!(matches!(failure.cause, FailureCause::Authz(AuthzError::Forbidden { .. })));
        }
        assert_eq!(backend.users(), before);
        assert_eq!(backend.session_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_token_codes_per_path() {
        let (_, state) = setup().await;
        let stranger = Token::new(999);

        assert_eq!(
            create_user(&state, stranger, 0x11, "x", &[1]).await.unwrap_err().code,
            ErrorCode::Request
        );
        assert_eq!(remove_user(&state, stranger, "bob").await.unwrap_err().code, ErrorCode::Request);
        assert_eq!(
            change_role(&state, stranger, "bob", "GUEST").await.unwrap_err().code,
            ErrorCode::Ownership
        );
        assert_eq!(shutdown(&state, stranger).await.unwrap_err().code, ErrorCode::ShutdownLookup);
    }

    #[tokio::test]
    async fn test_remove_user_ends_their_session() {
        let (backend, state) = setup().await;

        remove_user(&state, ROOT, "bob").await.unwrap();
        assert!(backend.find_user("bob").await.is_err());
        assert!(!backend.token_exists(BOB).await.unwrap());

        let failure = remove_user(&state, ROOT, "bob").await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::Request);
    }

    #[tokio::test]
    async fn test_change_role() {
        let (backend, state) = setup().await;

        change_role(&state, ROOT, "bob", "GUEST").await.unwrap();
        assert_eq!(backend.find_user("bob").await.unwrap().role, Role::Guest);

        let failure = change_role(&state, ROOT, "bob", "guest").await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::Ownership);

        let failure = change_role(&state, ROOT, "nobody", "USER").await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::Ownership);
    }

    #[tokio::test]
    async fn test_shutdown_does_not_set_flag_itself() {
        let (_, state) = setup().await;

        assert_eq!(shutdown(&state, ROOT).await.unwrap(), Response::Ok);
        assert!(!state.shutdown.is_triggered());
    }
}
