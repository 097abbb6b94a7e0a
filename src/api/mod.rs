mod admin;
mod auth;
mod error;

use axum::{Json, Router, routing::get};
use std::sync::Arc;

use crate::auth::CookieSettings;
use crate::authority::TokenAuthority;
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::wire::Envelope;

pub use error::{ApiError, ResultExt};

/// Create the `/api/v1` router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    cookies: CookieSettings,
    rate_limit_config: RateLimitConfig,
) -> Router {
    let authority = Arc::new(TokenAuthority::new(db.clone(), jwt.clone()));

    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
        authority,
        cookies: Arc::new(cookies),
        rate_limit_config: Arc::new(rate_limit_config),
    };

    let admin_state = admin::AdminState { db, jwt };

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(auth_state))
        .nest("/admin", admin::router(admin_state))
}

async fn health() -> Json<Envelope<()>> {
    Json(Envelope::message("OK"))
}
