//! Single-flight token refresh.
//!
//! The first request to see a 401 starts a refresh; every other request that
//! hits a 401 while it runs joins the waiter queue and receives the same
//! outcome. The refresh itself runs on its own task so a cancelled caller
//! cannot strand the queue.
//!
//! A refresh only lands if the session is still the one it started from. If
//! the user logged out or signed in again meanwhile, the new pair is dropped
//! and its refresh token handed back to [`TokenRefresher::discard`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

use super::{SessionError, SessionStore};
use crate::wire::AuthData;

/// Default bound on a single refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CAPACITY: usize = 16;

/// Exchanges a refresh token for a new pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthData, SessionError>;

    /// Give up a refresh token nobody will use. Best effort.
    async fn discard(&self, refresh_token: &str);
}

/// Notifications about session lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    TokensRefreshed,
    /// The session could not be renewed and was cleared.
    Expired { message: String },
    LoggedOut,
}

type Waiter = oneshot::Sender<Result<String, SessionError>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<Waiter>,
}

pub struct SessionCoordinator {
    store: Arc<SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
    timeout: Duration,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            refresher,
            state: Mutex::new(RefreshState::default()),
            events,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.refreshing
    }

    /// Wait until the running refresh, if any, has settled.
    pub async fn wait_for_refresh(&self) {
        let rx = {
            let mut state = self.state.lock().await;
            if !state.refreshing {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }

    /// Get an access token to retry with after `rejected` drew a 401.
    ///
    /// If the stored token already differs from the rejected one, a refresh
    /// finished in the meantime and the stored token is returned as is.
    /// Otherwise joins the running refresh, or starts one.
    pub async fn refreshed_access_token(
        self: &Arc<Self>,
        rejected: Option<&str>,
    ) -> Result<String, SessionError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            if state.refreshing {
                debug!("Refresh in flight, queueing request");
                state.waiters.push(tx);
            } else {
                if let Some(current) = self.store.access_token().await {
                    if rejected != Some(current.as_str()) {
                        return Ok(current);
                    }
                }
                // Nothing to renew with; the session is already over
                if self.store.refresh_token().await.is_none() {
                    return Err(SessionError::NotAuthenticated);
                }
                state.refreshing = true;
                state.waiters.push(tx);

                let coordinator = Arc::clone(self);
                tokio::spawn(async move { coordinator.run_refresh().await });
            }
        }

        rx.await.unwrap_or(Err(SessionError::RefreshAbandoned))
    }

    async fn run_refresh(&self) {
        let outcome = self.refresh_once().await;

        let waiters = {
            let mut state = self.state.lock().await;
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Releasing refresh waiters");
        for waiter in waiters {
            // A waiter whose caller went away is not an error
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn refresh_once(&self) -> Result<String, SessionError> {
        let (refresh_token, generation) = self
            .store
            .refresh_ticket()
            .await
            .ok_or(SessionError::NotAuthenticated)?;

        let result = tokio::time::timeout(self.timeout, self.refresher.refresh(&refresh_token))
            .await
            .map_err(|_| SessionError::RefreshTimeout)
            .and_then(|r| r);

        match result {
            Ok(data) => {
                let access_token = data.access_token.clone();
                let rotated = data.refresh_token.clone();
                if !self.store.set_tokens(data, generation).await {
                    debug!("Session changed during refresh, discarding new tokens");
                    self.refresher.discard(&rotated).await;
                    return self.current_access_token().await;
                }
                info!("Session tokens refreshed");
                self.emit(SessionEvent::TokensRefreshed);
                Ok(access_token)
            }
            Err(e) => {
                if !self.store.clear_if_current(generation).await {
                    debug!(error = %e, "Refresh failed for a session that already ended");
                    return self.current_access_token().await;
                }
                warn!(error = %e, "Token refresh failed, ending session");
                self.emit(SessionEvent::Expired {
                    message: "Session expired".to_string(),
                });
                Err(e)
            }
        }
    }

    /// Token of whatever session replaced the one being refreshed.
    async fn current_access_token(&self) -> Result<String, SessionError> {
        self.store
            .access_token()
            .await
            .ok_or(SessionError::NotAuthenticated)
    }
}
