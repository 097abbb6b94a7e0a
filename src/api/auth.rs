//! Authentication endpoints.
//!
//! - POST `/register` - Create a `USER` account and issue a token pair
//! - POST `/login` - Check credentials and issue a token pair
//! - POST `/refresh` - Rotate a refresh token (cookie first, then body)
//! - POST `/logout` - Revoke a refresh token and clear both cookies
//! - GET `/me` - Claims of the current access token
//! - GET `/sessions` - Caller's active refresh records

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, AnyRole, Auth, CookieSettings, REFRESH_COOKIE_NAME, get_cookie,
};
use crate::authority::{IssuedTokens, TokenAuthority};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, unix_now};
use crate::rate_limit::{RateLimitConfig, rate_limit_credentials};
use crate::wire::{AuthData, Credentials, Envelope, RefreshRequest, SessionInfo, UserProfile};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub authority: Arc<TokenAuthority>,
    pub cookies: Arc<CookieSettings>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let credential_router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_credentials,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/sessions", get(sessions))
        .with_state(state);

    Router::new().merge(credential_router).merge(session_router)
}

/// Parse a JSON body, treating an empty body as the type's default shape.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Malformed JSON body"))
}

fn parse_credentials(body: &Bytes) -> Result<Credentials, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Malformed JSON body"))
}

/// Refresh token from the cookie, else from the JSON body.
fn presented_refresh_token(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    if let Some(token) = get_cookie(headers, REFRESH_COOKIE_NAME).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    // A malformed body on refresh/logout is treated like an absent token
    parse_body::<RefreshRequest>(body)
        .ok()
        .and_then(|r| r.refresh_token)
}

type IssuedResponse = (
    StatusCode,
    AppendHeaders<[(HeaderName, String); 2]>,
    Json<Envelope<AuthData>>,
);

/// Build the response for a freshly issued pair: both cookies plus the body.
fn issued_response(
    cookies: &CookieSettings,
    status: StatusCode,
    message: &str,
    issued: IssuedTokens,
) -> IssuedResponse {
    let access_cookie = cookies.set(
        ACCESS_COOKIE_NAME,
        &issued.access.token,
        issued.access.duration,
    );
    let refresh_cookie = cookies.set(
        REFRESH_COOKIE_NAME,
        &issued.refresh.token,
        issued.refresh.duration,
    );

    (
        status,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(Envelope::ok(message, issued.into_auth_data())),
    )
}

async fn register(
    State(state): State<AuthState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = parse_credentials(&body)?;
    let issued = state
        .authority
        .register(&credentials.email, &credentials.password)
        .await?;

    Ok(issued_response(
        &state.cookies,
        StatusCode::CREATED,
        "User registered successfully",
        issued,
    ))
}

async fn login(
    State(state): State<AuthState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = parse_credentials(&body)?;
    let issued = state
        .authority
        .login(&credentials.email, &credentials.password)
        .await?;

    Ok(issued_response(
        &state.cookies,
        StatusCode::OK,
        "Login successful",
        issued,
    ))
}

async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let token = presented_refresh_token(&headers, &body);
    let issued = state.authority.refresh(token.as_deref()).await?;

    Ok(issued_response(
        &state.cookies,
        StatusCode::OK,
        "Token refreshed successfully",
        issued,
    ))
}

/// Always succeeds and always clears both cookies.
async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let token = presented_refresh_token(&headers, &body);
    state.authority.logout(token.as_deref()).await;

    let clear_access = state.cookies.clear(ACCESS_COOKIE_NAME);
    let clear_refresh = state.cookies.clear(REFRESH_COOKIE_NAME);

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(Envelope::message("Logged out successfully")),
    )
}

async fn me(auth: Auth<AnyRole>) -> impl IntoResponse {
    let claims = &auth.user().claims;
    Json(Envelope::ok(
        "Current user",
        UserProfile {
            id: claims.sub,
            email: claims.email.clone(),
            role: claims.role,
        },
    ))
}

async fn sessions(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let now = unix_now().map_err(|_| ApiError::Internal("System time error".into()))?;
    let records = state
        .db
        .tokens()
        .list_active_by_user(auth.user().user_id(), now)
        .await
        .db_err("Failed to list sessions")?;

    let sessions: Vec<SessionInfo> = records
        .into_iter()
        .map(|r| SessionInfo {
            jti: r.jti,
            created_at: r.created_at,
            expires_at: r.expires_at,
        })
        .collect();

    Ok(Json(Envelope::ok("Active sessions", sessions)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_refresh_cookie_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("refreshToken=from-cookie"),
        );
        let body = Bytes::from_static(br#"{"refreshToken":"from-body"}"#);

        assert_eq!(
            presented_refresh_token(&headers, &body).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_refresh_token_from_body() {
        let body = Bytes::from_static(br#"{"refreshToken":"from-body"}"#);
        assert_eq!(
            presented_refresh_token(&HeaderMap::new(), &body).as_deref(),
            Some("from-body")
        );
    }

    #[test]
    fn test_missing_or_malformed_body_means_no_token() {
        assert_eq!(presented_refresh_token(&HeaderMap::new(), &Bytes::new()), None);
        assert_eq!(
            presented_refresh_token(&HeaderMap::new(), &Bytes::from_static(b"{not json")),
            None
        );
    }
}
