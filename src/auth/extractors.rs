//! Axum extractors for access-token authentication.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::db::UserRole;

/// Role requirement checked after the token is verified.
pub trait RoleConstraint {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: UserRole) -> bool {
        true
    }
}

/// Admins only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

/// Pull the access token from `Authorization: Bearer`, falling back to the cookie.
pub fn access_token_from_parts(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    bearer.or_else(|| get_cookie(&parts.headers, ACCESS_COOKIE_NAME).filter(|t| !t.is_empty()))
}

/// Extractor for endpoints that require a valid access token.
///
/// Verification is stateless: signature and expiry only.
/// Missing token -> 401, bad token -> 401, role not allowed -> 403.
pub struct Auth<R: RoleConstraint = AnyRole>(pub AuthenticatedUser, PhantomData<R>);

impl<R: RoleConstraint> Auth<R> {
    pub fn user(&self) -> &AuthenticatedUser {
        &self.0
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = access_token_from_parts(parts)
            .ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        let claims = state.jwt().validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ApiAuthError::new(AuthErrorKind::InvalidToken)
        })?;

        if !R::allows(claims.role) {
            tracing::info!(user_id = claims.sub, "Insufficient role");
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }

        Ok(Auth(AuthenticatedUser { claims }, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use axum::http::Request;
    use std::sync::Arc;

    #[derive(Clone)]
    struct TestState {
        jwt: Arc<JwtConfig>,
    }

    crate::impl_has_auth_backend!(TestState);

    fn state() -> TestState {
        TestState {
            jwt: Arc::new(JwtConfig::new(b"access", b"refresh")),
        }
    }

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_bearer_wins_over_cookie() {
        let state = state();
        let token = state
            .jwt
            .generate_access_token(7, "a@example.com", UserRole::User)
            .unwrap()
            .token;

        let mut parts = parts(
            Request::builder()
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::COOKIE, "accessToken=garbage"),
        );

        let Auth(user, _) = Auth::<AnyRole>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(user.user_id(), 7);
    }

    #[tokio::test]
    async fn test_cookie_fallback() {
        let state = state();
        let token = state
            .jwt
            .generate_access_token(3, "a@example.com", UserRole::Admin)
            .unwrap()
            .token;

        let mut parts = parts(
            Request::builder().header(header::COOKIE, format!("accessToken={}", token)),
        );

        let auth = Auth::<AdminOnly>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(auth.user().role(), UserRole::Admin);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens() {
        let state = state();

        let mut empty = parts(Request::builder());
        let err = Auth::<AnyRole>::from_request_parts(&mut empty, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::NotAuthenticated);

        let mut bad = parts(Request::builder().header(header::AUTHORIZATION, "Bearer nope"));
        let err = Auth::<AnyRole>::from_request_parts(&mut bad, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let state = state();
        let refresh = state.jwt.generate_refresh_token(1).unwrap().token;

        let mut parts = parts(
            Request::builder().header(header::AUTHORIZATION, format!("Bearer {}", refresh)),
        );
        let err = Auth::<AnyRole>::from_request_parts(&mut parts, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn test_user_rejected_from_admin_route() {
        let state = state();
        let token = state
            .jwt
            .generate_access_token(1, "a@example.com", UserRole::User)
            .unwrap()
            .token;

        let mut parts = parts(
            Request::builder().header(header::AUTHORIZATION, format!("Bearer {}", token)),
        );
        let err = Auth::<AdminOnly>::from_request_parts(&mut parts, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InsufficientRole);
    }
}
