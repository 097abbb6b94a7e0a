//! Session client for the storefront API.
//!
//! Holds the session (user plus token pair), signs API calls with the access
//! token and renews it through a single coordinated refresh when the server
//! answers 401. A failed refresh ends the session and emits
//! [`SessionEvent::Expired`].

mod auth_api;
mod coordinator;
mod error;
mod http;
mod state;

pub use auth_api::AuthApi;
pub use coordinator::{DEFAULT_REFRESH_TIMEOUT, SessionCoordinator, SessionEvent, TokenRefresher};
pub use error::SessionError;
pub use http::{ApiClient, ApiRequest, ApiResponse, endpoint, normalize_base_url};
pub use state::{SessionState, SessionStatus, SessionStore};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::wire::{AuthData, UserProfile};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach the API and where to keep the session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base, e.g. `http://localhost:4000/api/v1`
    pub base_url: String,
    /// Upper bound on one refresh call
    pub refresh_timeout: Duration,
    /// Persist the session to this JSON file
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            session_file: None,
        }
    }
}

pub struct SessionClient {
    auth: Arc<AuthApi>,
    coordinator: Arc<SessionCoordinator>,
    api: ApiClient,
}

impl SessionClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, SessionError> {
        let base = normalize_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let store = match &config.session_file {
            Some(path) => SessionStore::load(path).await?,
            None => SessionStore::new(),
        };

        let auth = Arc::new(AuthApi::new(http.clone(), base.clone()));
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::new(store),
            auth.clone(),
            config.refresh_timeout,
        ));
        let api = ApiClient::new(http, base, coordinator.clone());

        Ok(Self {
            auth,
            coordinator,
            api,
        })
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.store().begin().await;
        let result = self.auth.register(email, password).await;
        self.finish_sign_in(result).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.store().begin().await;
        let result = self.auth.login(email, password).await;
        self.finish_sign_in(result).await
    }

    /// End the session. Local state is cleared even if the server call fails.
    ///
    /// A refresh already in flight is allowed to finish first so the server
    /// revokes the token it rotated to.
    pub async fn logout(&self) {
        self.coordinator.wait_for_refresh().await;
        let refresh_token = self.store().refresh_token().await;
        if let Err(e) = self.auth.logout(refresh_token.as_deref()).await {
            warn!(error = %e, "Server logout failed, clearing local session anyway");
        }
        self.store().clear().await;
        self.coordinator.emit(SessionEvent::LoggedOut);
    }

    /// Profile of the caller as seen by the server.
    pub async fn current_user(&self) -> Result<UserProfile, SessionError> {
        self.api.get("/auth/me").await?.data()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.coordinator.store()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    async fn finish_sign_in(
        &self,
        result: Result<AuthData, SessionError>,
    ) -> Result<UserProfile, SessionError> {
        match result {
            Ok(data) => {
                let user = data.user.clone();
                self.store().set_authenticated(data).await;
                info!(user_id = user.id, "Signed in");
                self.coordinator.emit(SessionEvent::LoggedIn);
                Ok(user)
            }
            Err(e) => {
                self.store().fail(e.user_message()).await;
                Err(e)
            }
        }
    }
}
