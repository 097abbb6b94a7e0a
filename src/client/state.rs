//! Client-side session state.
//!
//! One [`SessionStore`] per client. Every mutation goes through the store so
//! the optional session file always mirrors memory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::warn;

use super::SessionError;
use crate::wire::{AuthData, UserProfile};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// Snapshot of the client session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub status: SessionStatus,
    pub error: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Session plus a generation that moves on every sign-in and clear.
#[derive(Default)]
struct Slot {
    session: SessionState,
    generation: u64,
}

pub struct SessionStore {
    slot: RwLock<Slot>,
    persist_path: Option<PathBuf>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::default()),
            persist_path: None,
        }
    }

    /// Store mirrored to a JSON file, resuming whatever the file holds.
    ///
    /// A missing file starts an empty session.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut state: SessionState = serde_json::from_slice(&bytes)
                    .map_err(|e| SessionError::Persistence(e.to_string()))?;
                // In-flight statuses do not survive a restart
                if state.status == SessionStatus::Loading {
                    state.status = SessionStatus::Idle;
                }
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => return Err(SessionError::Persistence(e.to_string())),
        };

        Ok(Self {
            slot: RwLock::new(Slot {
                session: state,
                generation: 0,
            }),
            persist_path: Some(path),
        })
    }

    pub async fn snapshot(&self) -> SessionState {
        self.slot.read().await.session.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.slot.read().await.session.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.slot.read().await.session.refresh_token.clone()
    }

    /// Refresh token together with the generation it belongs to.
    pub async fn refresh_ticket(&self) -> Option<(String, u64)> {
        let slot = self.slot.read().await;
        let token = slot.session.refresh_token.clone()?;
        Some((token, slot.generation))
    }

    /// Login or register started.
    pub async fn begin(&self) {
        self.update(None, |s| {
            s.status = SessionStatus::Loading;
            s.error = None;
        })
        .await;
    }

    /// Login or register succeeded.
    pub async fn set_authenticated(&self, data: AuthData) {
        self.update_and_bump(|s| {
            s.user = Some(data.user);
            s.access_token = Some(data.access_token);
            s.refresh_token = Some(data.refresh_token);
            s.status = SessionStatus::Succeeded;
            s.error = None;
        })
        .await;
    }

    /// A refresh replaced the token pair. Status is left as is.
    ///
    /// Applies only while the store is still at `generation`; returns false
    /// when a sign-in or clear happened since the refresh token was read.
    pub async fn set_tokens(&self, data: AuthData, generation: u64) -> bool {
        self.update(Some(generation), |s| {
            s.user = Some(data.user);
            s.access_token = Some(data.access_token);
            s.refresh_token = Some(data.refresh_token);
        })
        .await
    }

    /// Login or register failed.
    pub async fn fail(&self, message: String) {
        self.update(None, |s| {
            s.status = SessionStatus::Failed;
            s.error = Some(message);
        })
        .await;
    }

    /// Drop everything on logout.
    pub async fn clear(&self) {
        self.update_and_bump(|s| *s = SessionState::default()).await;
    }

    /// Drop everything after a failed refresh, unless the session already
    /// moved past `generation`.
    pub async fn clear_if_current(&self, generation: u64) -> bool {
        self.write(|slot| {
            if slot.generation != generation {
                return false;
            }
            *slot = Slot {
                session: SessionState::default(),
                generation: generation + 1,
            };
            true
        })
        .await
    }

    async fn update_and_bump(&self, f: impl FnOnce(&mut SessionState)) {
        self.write(|slot| {
            f(&mut slot.session);
            slot.generation += 1;
            true
        })
        .await;
    }

    async fn update(&self, expected: Option<u64>, f: impl FnOnce(&mut SessionState)) -> bool {
        self.write(|slot| {
            if expected.is_some_and(|g| g != slot.generation) {
                return false;
            }
            f(&mut slot.session);
            true
        })
        .await
    }

    async fn write(&self, f: impl FnOnce(&mut Slot) -> bool) -> bool {
        let snapshot = {
            let mut slot = self.slot.write().await;
            if !f(&mut slot) {
                return false;
            }
            self.persist_path.as_ref().map(|_| slot.session.clone())
        };

        if let (Some(path), Some(snapshot)) = (&self.persist_path, snapshot) {
            if let Err(e) = persist(path, &snapshot).await {
                warn!(path = %path.display(), error = %e, "Failed to persist session");
            }
        }
        true
    }
}

async fn persist(path: &Path, state: &SessionState) -> Result<(), SessionError> {
    let json = serde_json::to_vec_pretty(state).map_err(|e| SessionError::Persistence(e.to_string()))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SessionError::Persistence(e.to_string()))
}
