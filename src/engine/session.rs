//! Session lifecycle: `Idle -> Authenticating -> Active -> Closed`, with
//! `Authenticating -> Failed` on a rejected login and `Active -> Failed` on
//! session loss. A [`Session`] is bound to one account and one run.

use crate::platform::types::SessionHandle;
use crate::platform::{Platform, PlatformError};
use crate::vault::Credentials;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Authenticating,
    Active,
    Closed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Auth(#[from] PlatformError),

    #[error("account {0} already has an active session")]
    AccountBusy(String),
}

/// Which account currently holds a live session. Passed by reference to every
/// [`SessionManager`] that must not alias sessions across concurrent runs.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, account_id: &str) -> Result<(), SessionError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| SessionError::AccountBusy(account_id.to_string()))?;
        if active.contains_key(account_id) {
            return Err(SessionError::AccountBusy(account_id.to_string()));
        }
        active.insert(account_id.to_string(), Utc::now());
        Ok(())
    }

    fn release(&self, account_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(account_id);
        }
    }

    pub fn is_active(&self, account_id: &str) -> bool {
        self.active
            .lock()
            .map(|a| a.contains_key(account_id))
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }
}

pub struct Session {
    handle: SessionHandle,
    state: SessionState,
    opened_at: DateTime<Utc>,
    failure: Option<String>,
    registry: Arc<SessionRegistry>,
}

impl Session {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Why the session went to `Failed`, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// `Active -> Failed` on session loss. No-op in any other state.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.state != SessionState::Active {
            return;
        }
        let reason = reason.into();
        tracing::warn!(
            session = %self.handle.session_id,
            reason = %reason,
            "session lost"
        );
        self.failure = Some(reason);
        self.state = SessionState::Failed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            tracing::warn!(
                session = %self.handle.session_id,
                state = ?self.state,
                "session dropped without close"
            );
            self.registry.release(&self.handle.account_id);
        }
    }
}

pub struct SessionManager {
    platform: Arc<dyn Platform>,
    registry: Arc<SessionRegistry>,
}

impl SessionManager {
    pub fn new(platform: Arc<dyn Platform>, registry: Arc<SessionRegistry>) -> Self {
        Self { platform, registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Log in once. Never retries: retry policy belongs to the caller.
    pub async fn open(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let account = credentials.account_id.as_str();
        let mut state = SessionState::Idle;
        self.registry.claim(account)?;

        tracing::debug!(account, from = ?state, "session authenticating");
        state = SessionState::Authenticating;

        match self.platform.login(credentials).await {
            Ok(handle) => {
                tracing::info!(
                    account,
                    session = %handle.session_id,
                    from = ?state,
                    "session active"
                );
                Ok(Session {
                    handle,
                    state: SessionState::Active,
                    opened_at: Utc::now(),
                    failure: None,
                    registry: self.registry.clone(),
                })
            }
            Err(e) => {
                self.registry.release(account);
                tracing::warn!(account, from = ?state, error = %e, "session failed to open");
                Err(SessionError::Auth(e))
            }
        }
    }

    /// Release the remote session. Idempotent; safe on a `Failed` session.
    pub async fn close(&self, session: &mut Session) {
        if session.state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.platform.logout(&session.handle).await {
            tracing::warn!(
                session = %session.handle.session_id,
                error = %e,
                "logout failed; releasing session anyway"
            );
        }
        self.registry.release(&session.handle.account_id);
        tracing::info!(
            session = %session.handle.session_id,
            from = ?session.state,
            held_s = (Utc::now() - session.opened_at).num_seconds(),
            "session closed"
        );
        session.state = SessionState::Closed;
    }
}
