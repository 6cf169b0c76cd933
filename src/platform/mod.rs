//! Narrow capability interface over the blogging platform.
//!
//! Everything page-specific (selectors, navigation, login forms) lives behind
//! [`Platform`]; the engine only sees sessions, feed pages and single actions.

pub mod rest;
pub mod scripted;
pub mod types;

use crate::vault::Credentials;
use async_trait::async_trait;
use types::{FeedPage, NeighborPost, SessionHandle};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("login rejected: {0}")]
    AuthRejected(String),

    #[error("account locked or rate limited: {0}")]
    Locked(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("action rejected: {0}")]
    Rejected(String),

    #[error("platform call timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Http(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// The session can no longer be used; the run must stop.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<SessionHandle, PlatformError>;

    /// Fetch feed page `page` (0-based).
    async fn feed_page(&self, handle: &SessionHandle, page: u32) -> Result<FeedPage, PlatformError>;

    async fn like(&self, handle: &SessionHandle, post: &NeighborPost) -> Result<(), PlatformError>;

    async fn comment(
        &self,
        handle: &SessionHandle,
        post: &NeighborPost,
        text: &str,
    ) -> Result<(), PlatformError>;

    async fn logout(&self, handle: &SessionHandle) -> Result<(), PlatformError>;
}
