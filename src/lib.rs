pub mod api;
pub mod auth;
pub mod authority;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod validation;
pub mod wire;

use api::create_api_router;
use auth::CookieSettings;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{Json, Router};
use db::Database;
use jwt::{JwtConfig, TokenLifetimes};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wire::Envelope;

/// Prefix for every API route.
pub const API_PREFIX: &str = "/api/v1";

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens
    pub refresh_secret: Vec<u8>,
    /// Access and refresh token lifetimes
    pub lifetimes: TokenLifetimes,
    /// Attributes for the auth cookies
    pub cookies: CookieSettings,
    /// Browser origin allowed to call the API with credentials
    pub client_origin: Option<HeaderValue>,
    /// Register/login attempts per minute per IP
    pub auth_rate_limit_per_minute: u32,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_lifetimes(
        &config.access_secret,
        &config.refresh_secret,
        config.lifetimes,
    ));

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        config.cookies.clone(),
        RateLimitConfig::new(config.auth_rate_limit_per_minute),
    );

    let app = Router::new()
        .nest(API_PREFIX, api_router)
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http());

    match &config.client_origin {
        Some(origin) => app.layer(
            CorsLayer::new()
                .allow_origin(origin.clone())
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        ),
        None => app,
    }
}

async fn route_not_found() -> (StatusCode, Json<Envelope<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(Envelope::failure("Route not found", Vec::new())),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on 127.0.0.1 in a background task. Use port 0 to let the OS choose.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
