use crate::auth::token_authority::TokenAuthority;
use crate::core::error::{AuthzError, BackendError};
use crate::models::role::Role;
use crate::models::token::Token;
use crate::utils::auth::digests_match;
use tracing::debug;

fn lookup_error(e: BackendError) -> AuthzError {
    match e {
        BackendError::TokenNotFound(_) => AuthzError::TokenInvalid,
        other => AuthzError::Lookup(other),
    }
}

/// Gate an operation on the role of the token's owner.
///
/// Role names are compared exactly; there is no hierarchy.
pub async fn require_role(authority: &TokenAuthority, token: Token, required: Role) -> Result<(), AuthzError> {
    let actual = authority.resolve_role(token).await.map_err(lookup_error)?;

    if actual != required.name() {
        debug!(token = %token, required = required.name(), actual = %actual, "Role check failed");
        return Err(AuthzError::Forbidden {
            required: required.name(),
            actual,
        });
    }
    Ok(())
}

/// Confirm that `old_digest` matches the stored digest of the token's owner.
/// Returns the owner's username.
pub async fn verify_ownership(
    authority: &TokenAuthority,
    token: Token,
    old_digest: &[u8],
) -> Result<String, AuthzError> {
    let username = authority.resolve(token).await.map_err(lookup_error)?;
    let stored = authority
        .backend()
        .stored_digest(&username)
        .await
        .map_err(lookup_error)?;

    if !digests_match(old_digest, &stored) {
        return Err(AuthzError::CredentialMismatch);
    }
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{Backend, MemoryBackend};
    use crate::utils::time::current_timestamp;
    use std::sync::Arc;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryBackend>, TokenAuthority) {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_user("root", &[0xAA], Role::Superuser).await.unwrap();
        backend.insert_user("bob", &[0xBB], Role::User).await.unwrap();

        let now = current_timestamp();
        backend.create_session("root", Token::new(1), now, now + 900).await.unwrap();
        backend.create_session("bob", Token::new(2), now, now + 900).await.unwrap();

        let authority = TokenAuthority::new(backend.clone(), Duration::from_secs(900));
        (backend, authority)
    }

    #[tokio::test]
    async fn test_require_role_exact_match() {
        let (_, authority) = setup().await;

        require_role(&authority, Token::new(1), Role::Superuser).await.unwrap();
        require_role(&authority, Token::new(2), Role::User).await.unwrap();
    }

    #[tokio::test]
    async fn test_require_role_has_no_hierarchy() {
        let (_, authority) = setup().await;

        let err = require_role(&authority, Token::new(1), Role::User).await.unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden {
                required: "USER",
                actual: "SUPERUSER".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_require_role_unknown_token() {
        let (_, authority) = setup().await;
        let err = require_role(&authority, Token::new(77), Role::Superuser).await.unwrap_err();
        assert_eq!(err, AuthzError::TokenInvalid);
    }

    #[tokio::test]
    async fn test_require_role_expired_token() {
        let (backend, authority) = setup().await;
        backend.insert_user("old", &[1], Role::Superuser).await.unwrap();
        let now = current_timestamp();
        backend.create_session("old", Token::new(3), now - 100, now).await.unwrap();

        let err = require_role(&authority, Token::new(3), Role::Superuser).await.unwrap_err();
        assert_eq!(err, AuthzError::TokenInvalid);
    }

    #[tokio::test]
    async fn test_require_role_backend_down() {
        let (backend, authority) = setup().await;
        backend.disconnect();

        let err = require_role(&authority, Token::new(1), Role::Superuser).await.unwrap_err();
        assert_eq!(err, AuthzError::Lookup(BackendError::Unavailable));
    }

    #[tokio::test]
    async fn test_verify_ownership() {
        let (_, authority) = setup().await;

        assert_eq!(verify_ownership(&authority, Token::new(2), &[0xBB]).await.unwrap(), "bob");
        assert_eq!(
            verify_ownership(&authority, Token::new(2), &[0xAA]).await.unwrap_err(),
            AuthzError::CredentialMismatch
        );
        assert_eq!(
            verify_ownership(&authority, Token::new(99), &[0xBB]).await.unwrap_err(),
            AuthzError::TokenInvalid
        );
    }
}
