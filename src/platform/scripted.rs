//! Deterministic in-process [`Platform`] with scripted feed pages, latency and
//! failure injection. Every call is recorded so tests can assert on ordering,
//! spacing and whether a call happened at all.

use super::types::{FeedPage, NeighborPost, SessionHandle};
use super::{Platform, PlatformError};
use crate::vault::Credentials;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    AuthRejected(String),
    Locked(String),
    SessionExpired,
    Rejected(String),
    Timeout,
    Network(String),
}

impl Failure {
    fn to_error(&self) -> PlatformError {
        match self {
            Self::AuthRejected(m) => PlatformError::AuthRejected(m.clone()),
            Self::Locked(m) => PlatformError::Locked(m.clone()),
            Self::SessionExpired => PlatformError::SessionExpired("scripted expiry".to_string()),
            Self::Rejected(m) => PlatformError::Rejected(m.clone()),
            Self::Timeout => PlatformError::Timeout,
            Self::Network(m) => PlatformError::Http(m.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Login { account_id: String },
    FeedPage(u32),
    Like(String),
    Comment { post_id: String, text: String },
    Logout,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub at: Instant,
}

#[derive(Default)]
pub struct ScriptedPlatform {
    pages: Vec<Vec<NeighborPost>>,
    login_failure: Option<Failure>,
    feed_failure: Option<(u32, Failure)>,
    like_failures: HashMap<String, Failure>,
    comment_failures: HashMap<String, Failure>,
    login_latency: Duration,
    feed_latency: Duration,
    action_latency: Duration,
    expired: AtomicBool,
    next_session: AtomicU64,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedPlatform {
    pub fn new(pages: Vec<Vec<NeighborPost>>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    /// Split `posts` into pages of `page_size`.
    pub fn paged(posts: Vec<NeighborPost>, page_size: usize) -> Self {
        let pages = posts
            .chunks(page_size.max(1))
            .map(<[NeighborPost]>::to_vec)
            .collect();
        Self::new(pages)
    }

    pub fn failing_login(mut self, failure: Failure) -> Self {
        self.login_failure = Some(failure);
        self
    }

    pub fn failing_feed_at(mut self, page: u32, failure: Failure) -> Self {
        self.feed_failure = Some((page, failure));
        self
    }

    pub fn failing_like(mut self, post_id: &str, failure: Failure) -> Self {
        self.like_failures.insert(post_id.to_string(), failure);
        self
    }

    pub fn failing_comment(mut self, post_id: &str, failure: Failure) -> Self {
        self.comment_failures.insert(post_id.to_string(), failure);
        self
    }

    pub fn with_login_latency(mut self, latency: Duration) -> Self {
        self.login_latency = latency;
        self
    }

    pub fn with_feed_latency(mut self, latency: Duration) -> Self {
        self.feed_latency = latency;
        self
    }

    pub fn with_action_latency(mut self, latency: Duration) -> Self {
        self.action_latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn login_count(&self) -> usize {
        self.count(|k| matches!(k, CallKind::Login { .. }))
    }

    pub fn logout_count(&self) -> usize {
        self.count(|k| matches!(k, CallKind::Logout))
    }

    pub fn feed_pages_fetched(&self) -> usize {
        self.count(|k| matches!(k, CallKind::FeedPage(_)))
    }

    /// Post ids liked, in call order.
    pub fn likes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.kind {
                CallKind::Like(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// `(post_id, text)` pairs, in call order.
    pub fn comments(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.kind {
                CallKind::Comment { post_id, text } => Some((post_id, text)),
                _ => None,
            })
            .collect()
    }

    /// Start instants of every like call.
    pub fn like_starts(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c.kind, CallKind::Like(_)))
            .map(|c| c.at)
            .collect()
    }

    fn count(&self, pred: impl Fn(&CallKind) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(&c.kind)).count()
    }

    fn record(&self, kind: CallKind) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                kind,
                at: Instant::now(),
            });
        }
    }

    fn check_alive(&self) -> Result<(), PlatformError> {
        if self.expired.load(Ordering::SeqCst) {
            return Err(Failure::SessionExpired.to_error());
        }
        Ok(())
    }

    fn fail_with(&self, failure: &Failure) -> PlatformError {
        if *failure == Failure::SessionExpired {
            self.expired.store(true, Ordering::SeqCst);
        }
        failure.to_error()
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    async fn login(&self, credentials: &Credentials) -> Result<SessionHandle, PlatformError> {
        self.record(CallKind::Login {
            account_id: credentials.account_id.clone(),
        });
        tokio::time::sleep(self.login_latency).await;
        if let Some(failure) = &self.login_failure {
            return Err(failure.to_error());
        }
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle {
            session_id: format!("scripted-{}", n),
            account_id: credentials.account_id.clone(),
        })
    }

    async fn feed_page(&self, _handle: &SessionHandle, page: u32) -> Result<FeedPage, PlatformError> {
        self.record(CallKind::FeedPage(page));
        tokio::time::sleep(self.feed_latency).await;
        self.check_alive()?;
        if let Some((at, failure)) = &self.feed_failure {
            if *at == page {
                return Err(self.fail_with(failure));
            }
        }
        let idx = page as usize;
        Ok(FeedPage {
            posts: self.pages.get(idx).cloned().unwrap_or_default(),
            has_more: idx + 1 < self.pages.len(),
        })
    }

    async fn like(&self, _handle: &SessionHandle, post: &NeighborPost) -> Result<(), PlatformError> {
        self.record(CallKind::Like(post.post_id.clone()));
        tokio::time::sleep(self.action_latency).await;
        self.check_alive()?;
        match self.like_failures.get(&post.post_id) {
            Some(failure) => Err(self.fail_with(failure)),
            None => Ok(()),
        }
    }

    async fn comment(
        &self,
        _handle: &SessionHandle,
        post: &NeighborPost,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.record(CallKind::Comment {
            post_id: post.post_id.clone(),
            text: text.to_string(),
        });
        tokio::time::sleep(self.action_latency).await;
        self.check_alive()?;
        match self.comment_failures.get(&post.post_id) {
            Some(failure) => Err(self.fail_with(failure)),
            None => Ok(()),
        }
    }

    async fn logout(&self, _handle: &SessionHandle) -> Result<(), PlatformError> {
        self.record(CallKind::Logout);
        Ok(())
    }
}

/// Build a post published `age_hours` ago.
pub fn post(author: &str, post_id: &str, age_hours: i64) -> NeighborPost {
    NeighborPost {
        author_nickname: author.to_string(),
        post_id: post_id.to_string(),
        published_at: Utc::now() - chrono::Duration::hours(age_hours),
        already_liked: false,
        title: format!("post {}", post_id),
    }
}

/// Like [`post`], but already liked by the account.
pub fn liked_post(author: &str, post_id: &str, age_hours: i64) -> NeighborPost {
    NeighborPost {
        already_liked: true,
        ..post(author, post_id, age_hours)
    }
}
