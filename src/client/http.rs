//! Authenticated HTTP client with transparent token refresh.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::{SessionCoordinator, SessionError};
use crate::validation::FieldError;

/// Parse an API base URL, making sure relative joins land under its path.
pub fn normalize_base_url(base: &str) -> Result<Url, SessionError> {
    let mut url =
        Url::parse(base).map_err(|e| SessionError::InvalidUrl(format!("{}: {}", base, e)))?;
    if url.cannot_be_a_base() {
        return Err(SessionError::InvalidUrl(base.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve an API path (with or without a leading slash) against the base.
pub fn endpoint(base: &Url, path: &str) -> Result<Url, SessionError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| SessionError::InvalidUrl(format!("{}: {}", path, e)))
}

/// A request to the storefront API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Set once the request has been replayed after a refresh
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and decoded JSON body. Non-JSON bodies become a JSON string.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, SessionError> {
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok(Self { status, body })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into `SessionError::Api`.
    pub fn into_result(self) -> Result<Self, SessionError> {
        if self.is_success() {
            return Ok(self);
        }

        let message = self
            .body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", self.status));
        let errors = self
            .body
            .get("errors")
            .cloned()
            .and_then(|e| serde_json::from_value::<Vec<FieldError>>(e).ok())
            .unwrap_or_default();

        Err(SessionError::Api {
            status: self.status,
            message,
            errors,
        })
    }

    /// Decode the envelope's `data` field.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        let data = self.body.get("data").cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| SessionError::Decode(e.to_string()))
    }
}

/// Client for gated API routes.
///
/// Attaches the current access token as a bearer header. A 401 on a request
/// that has not been retried yet goes through the coordinator for a fresh
/// token and is replayed once.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    coordinator: Arc<SessionCoordinator>,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base: Url, coordinator: Arc<SessionCoordinator>) -> Self {
        Self {
            http,
            base,
            coordinator,
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::delete(path)).await
    }

    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, SessionError> {
        loop {
            let token = self.coordinator.store().access_token().await;
            let response = self.execute(&request, token.as_deref()).await?;

            if response.status == 401 && !request.retried {
                debug!(path = %request.path, "Access token rejected, refreshing");
                request.retried = true;
                self.coordinator
                    .refreshed_access_token(token.as_deref())
                    .await?;
                continue;
            }

            return response.into_result();
        }
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, SessionError> {
        let url = endpoint(&self.base, &request.path)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        ApiResponse::read(builder.send().await?).await
    }
}
