//! Calls to the `/auth` endpoints made on behalf of the session.
//!
//! Tokens travel in JSON bodies; the client keeps no cookie jar.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use url::Url;

use super::http::{ApiResponse, endpoint};
use super::{SessionError, TokenRefresher};
use crate::wire::{AuthData, Credentials, RefreshRequest};

pub struct AuthApi {
    http: reqwest::Client,
    base: Url,
}

impl AuthApi {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthData, SessionError> {
        self.post("auth/register", &credentials(email, password))
            .await?
            .data()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthData, SessionError> {
        self.post("auth/login", &credentials(email, password))
            .await?
            .data()
    }

    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<AuthData, SessionError> {
        let body = RefreshRequest {
            refresh_token: Some(refresh_token.to_string()),
        };
        self.post("auth/refresh", &body).await?.data()
    }

    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), SessionError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.map(str::to_string),
        };
        self.post("auth/logout", &body).await.map(|_| ())
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse, SessionError> {
        let url = endpoint(&self.base, path)?;
        let response = self.http.post(url).json(body).send().await?;
        ApiResponse::read(response).await?.into_result()
    }
}

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[async_trait]
impl TokenRefresher for AuthApi {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthData, SessionError> {
        self.refresh_tokens(refresh_token).await
    }

    async fn discard(&self, refresh_token: &str) {
        if let Err(e) = self.logout(Some(refresh_token)).await {
            warn!(error = %e, "Failed to revoke discarded refresh token");
        }
    }
}
