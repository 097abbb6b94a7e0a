//! Tests for the token authority endpoints.
//!
//! Tests cover:
//! - Register/login responses, cookies and claims
//! - Validation, conflict and credential errors
//! - Refresh rotation, reuse and stored expiry
//! - Logout semantics
//! - Rate limiting of credential endpoints

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::*;
use serde_json::json;
use storefront_auth::{create_app, db::Database, db::UserRole, jwt::JwtConfig};

fn jwt() -> JwtConfig {
    JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET)
}

#[tokio::test]
async fn test_health() {
    let (app, _db) = create_test_app().await;

    let response = send(
        &app,
        Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["success"], true);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (app, _db) = create_test_app().await;

    let response = send(
        &app,
        Request::builder()
            .uri("/api/v1/products")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json["message"], "Route not found");
}

#[tokio::test]
async fn test_register_returns_pair_and_cookies() {
    let (app, db) = create_test_app().await;

    let response = register(&app, "Alice@Example.com", PASSWORD).await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json["success"], true);
    assert_eq!(response.json["data"]["user"]["email"], EMAIL);
    assert_eq!(response.json["data"]["user"]["role"], "USER");

    let user_id = response.json["data"]["user"]["id"].as_i64().unwrap();
    let claims = jwt().validate_access_token(&response.access_token()).unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, UserRole::User);

    let access_cookie = response.cookie("accessToken").unwrap();
    assert!(access_cookie.contains("HttpOnly"));
    assert!(access_cookie.contains("SameSite=Lax"));
    assert!(access_cookie.contains("Max-Age=900"));
    assert!(!access_cookie.contains("Secure"));

    let refresh_cookie = response.cookie("refreshToken").unwrap();
    assert!(refresh_cookie.contains(&format!("Max-Age={}", 7 * 24 * 60 * 60)));

    assert_eq!(db.tokens().count_by_user(user_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_secure_cookie_settings_applied() {
    let db = Database::open(":memory:").await.unwrap();
    let mut config = test_config(db);
    config.cookies.secure = true;
    config.cookies.domain = Some("shop.example.com".into());
    let app = create_app(&config);

    let response = register(&app, EMAIL, PASSWORD).await;
    let cookie = response.cookie("refreshToken").unwrap();
    assert!(cookie.contains("; Secure"));
    assert!(cookie.contains("; Domain=shop.example.com"));
}

#[tokio::test]
async fn test_register_validation_errors() {
    let (app, _db) = create_test_app().await;

    let response = register(&app, "not-an-email", "weak").await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json["success"], false);
    let errors = response.json["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e["path"] == "email"));
    assert!(errors.iter().any(|e| e["path"] == "password"));
}

#[tokio::test]
async fn test_register_missing_fields_is_validation_error() {
    let (app, _db) = create_test_app().await;

    let response = post_json(&app, "/api/v1/auth/register", json!({})).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_register_malformed_json() {
    let (app, _db) = create_test_app().await;

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{nope"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["success"], false);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let (app, _db) = create_test_app().await;

    assert_eq!(register(&app, EMAIL, PASSWORD).await.status, StatusCode::CREATED);
    let response = register(&app, "ALICE@example.com", PASSWORD).await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json["success"], false);
}

#[tokio::test]
async fn test_login_success() {
    let (app, _db) = create_test_app().await;
    register(&app, EMAIL, PASSWORD).await;

    let response = login(&app, EMAIL, PASSWORD).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["data"]["user"]["email"], EMAIL);
    assert!(response.cookie("accessToken").is_some());
    assert!(response.cookie("refreshToken").is_some());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (app, _db) = create_test_app().await;
    register(&app, EMAIL, PASSWORD).await;

    let wrong_password = login(&app, EMAIL, "Wrong1234").await;
    let unknown_user = login(&app, "bob@example.com", PASSWORD).await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json, unknown_user.json);
    assert_eq!(wrong_password.json["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_refresh_rotates_pair() {
    let (app, db) = create_test_app().await;
    let registered = register(&app, EMAIL, PASSWORD).await;
    let user_id = registered.json["data"]["user"]["id"].as_i64().unwrap();

    let response = refresh(&app, &registered.refresh_token()).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_ne!(response.refresh_token(), registered.refresh_token());
    assert!(response.cookie("refreshToken").is_some());
    assert_eq!(db.tokens().count_by_user(user_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_refresh_token_reuse_fails() {
    let (app, _db) = create_test_app().await;
    let registered = register(&app, EMAIL, PASSWORD).await;
    let token = registered.refresh_token();

    assert_eq!(refresh(&app, &token).await.status, StatusCode::OK);

    let reused = refresh(&app, &token).await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reused.json["message"], "Invalid or expired token");
}

#[tokio::test]
async fn test_refresh_from_cookie_wins_over_body() {
    let (app, _db) = create_test_app().await;
    let first = register(&app, EMAIL, PASSWORD).await;
    let second = login(&app, EMAIL, PASSWORD).await;

    // Spend the second token so only the cookie's token is usable
    assert_eq!(refresh(&app, &second.refresh_token()).await.status, StatusCode::OK);

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::COOKIE,
                format!("refreshToken={}", first.refresh_token()),
            )
            .body(Body::from(
                json!({ "refreshToken": second.refresh_token() }).to_string(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_token() {
    let (app, _db) = create_test_app().await;

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json["success"], false);
}

#[tokio::test]
async fn test_refresh_with_stored_expiry_passed_revokes_record() {
    let (app, db) = create_test_app().await;
    let registered = register(&app, EMAIL, PASSWORD).await;
    let token = registered.refresh_token();
    let jti = jwt().validate_refresh_token(&token).unwrap().jti;

    // The JWT is still valid; only the stored expiry has passed
    sqlx::query("UPDATE refresh_tokens SET expires_at = 0 WHERE jti = ?")
        .bind(&jti)
        .execute(db.pool())
        .await
        .unwrap();

    let response = refresh(&app, &token).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let record = db.tokens().get_by_jti(&jti).await.unwrap().unwrap();
    assert!(record.revoked);
}

#[tokio::test]
async fn test_refresh_after_user_deleted_is_not_found() {
    let (app, db) = create_test_app().await;
    let registered = register(&app, EMAIL, PASSWORD).await;
    let user_id = registered.json["data"]["user"]["id"].as_i64().unwrap();

    assert!(db.users().delete(user_id).await.unwrap());

    let response = refresh(&app, &registered.refresh_token()).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_revokes_and_clears_cookies() {
    let (app, _db) = create_test_app().await;
    let registered = register(&app, EMAIL, PASSWORD).await;
    let token = registered.refresh_token();

    let response = post_json(
        &app,
        "/api/v1/auth/logout",
        json!({ "refreshToken": token }),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["success"], true);
    assert!(response.cookie("accessToken").unwrap().contains("Max-Age=0"));
    assert!(response.cookie("refreshToken").unwrap().contains("Max-Age=0"));

    assert_eq!(refresh(&app, &token).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_always_succeeds() {
    let (app, _db) = create_test_app().await;

    let without_token = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(without_token.status, StatusCode::OK);
    assert_eq!(without_token.set_cookies().len(), 2);

    let unknown_token = post_json(
        &app,
        "/api/v1/auth/logout",
        json!({ "refreshToken": "garbage" }),
    )
    .await;
    assert_eq!(unknown_token.status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_with_expired_refresh_token_succeeds() {
    let (app, db) = create_test_app().await;
    let token = register(&app, EMAIL, PASSWORD).await.refresh_token();
    let jti = jwt().validate_refresh_token(&token).unwrap().jti;

    sqlx::query("UPDATE refresh_tokens SET expires_at = 0 WHERE jti = ?")
        .bind(&jti)
        .execute(db.pool())
        .await
        .unwrap();

    let response = post_json(
        &app,
        "/api/v1/auth/logout",
        json!({ "refreshToken": token }),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["success"], true);
    assert!(response.cookie("accessToken").unwrap().contains("Max-Age=0"));
    assert!(response.cookie("refreshToken").unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited() {
    let db = Database::open(":memory:").await.unwrap();
    let mut config = test_config(db);
    config.auth_rate_limit_per_minute = 2;
    let app = create_app(&config);

    for _ in 0..2 {
        assert_eq!(
            login(&app, EMAIL, PASSWORD).await.status,
            StatusCode::UNAUTHORIZED
        );
    }

    let limited = login(&app, EMAIL, PASSWORD).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.json["success"], false);
}
