#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::Value;
use std::net::SocketAddr;
use storefront_auth::{
    ServerConfig, auth::CookieSettings, create_app, db::Database, jwt::TokenLifetimes,
    start_server,
};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "Secret123";

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        lifetimes: TokenLifetimes::default(),
        cookies: CookieSettings::default(),
        client_origin: None,
        auth_rate_limit_per_minute: 1000,
    }
}

/// Create a test app over an in-memory database and return (app, db).
pub async fn create_test_app() -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db)
}

/// Status, headers and decoded JSON body of one request.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        self.set_cookies()
            .into_iter()
            .find(|c| c.starts_with(&prefix))
    }

    pub fn access_token(&self) -> String {
        self.json["data"]["accessToken"]
            .as_str()
            .expect("accessToken missing")
            .to_string()
    }

    pub fn refresh_token(&self) -> String {
        self.json["data"]["refreshToken"]
            .as_str()
            .expect("refreshToken missing")
            .to_string()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        json,
    }
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> TestResponse {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn get_with_bearer(app: &Router, uri: &str, token: &str) -> TestResponse {
    send(
        app,
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn register(app: &Router, email: &str, password: &str) -> TestResponse {
    post_json(
        app,
        "/api/v1/auth/register",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}

pub async fn login(app: &Router, email: &str, password: &str) -> TestResponse {
    post_json(
        app,
        "/api/v1/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}

pub async fn refresh(app: &Router, refresh_token: &str) -> TestResponse {
    post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": refresh_token }),
    )
    .await
}

/// Start a live server on an ephemeral port backed by an on-disk database.
/// Returns (base_url, db, tempdir guard).
pub async fn start_live_server() -> (String, Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storefront.db");
    let db = Database::open(path.to_str().unwrap()).await.unwrap();

    let (_handle, addr): (_, SocketAddr) = start_server(test_config(db.clone()), 0)
        .await
        .expect("Failed to start server");

    (format!("http://{}/api/v1", addr), db, dir)
}
