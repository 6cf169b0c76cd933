use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the neighbor feed, read from the live session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborPost {
    pub author_nickname: String,
    pub post_id: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub already_liked: bool,
    #[serde(default)]
    pub title: String,
}

/// One page of the remote feed, in the platform's native order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    #[serde(default)]
    pub posts: Vec<NeighborPost>,
    #[serde(default)]
    pub has_more: bool,
}

impl FeedPage {
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.posts.iter().map(|p| p.published_at).max()
    }
}

/// Opaque handle to one logged-in automation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub account_id: String,
}

// ── Bridge wire types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest<'a> {
    pub account_id: &'a str,
    pub account_secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub session_id: String,
}

#[derive(Serialize)]
pub(crate) struct CommentRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: String,
}
