//! Single-pass enumeration of the neighbor feed.
//!
//! Pages are fetched lazily. Enumeration ends when `max_authors` distinct
//! authors have been yielded, when a page's newest post is older than the
//! recency cutoff (the feed is reverse-chronological), when the feed runs out,
//! or when a page fetch fails. A failed fetch ends the sequence instead of
//! raising; the reason is kept in [`FeedEnumerator::interruption`].

use super::session::Session;
use crate::platform::types::NeighborPost;
use crate::platform::Platform;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

/// Hard stop so a misbehaving feed can never paginate forever.
pub const MAX_FEED_PAGES: u32 = 50;

pub struct FeedEnumerator<'a> {
    platform: &'a dyn Platform,
    cutoff: DateTime<Utc>,
    max_authors: usize,
    next_page: u32,
    buffer: VecDeque<NeighborPost>,
    seen_authors: HashSet<String>,
    seen_posts: HashSet<String>,
    exhausted: bool,
    interruption: Option<String>,
}

impl<'a> FeedEnumerator<'a> {
    pub fn new(platform: &'a dyn Platform, days_limit: u32, max_authors: usize) -> Self {
        Self {
            platform,
            cutoff: Utc::now() - chrono::Duration::days(i64::from(days_limit)),
            max_authors,
            next_page: 0,
            buffer: VecDeque::new(),
            seen_authors: HashSet::new(),
            seen_posts: HashSet::new(),
            exhausted: false,
            interruption: None,
        }
    }

    /// Oldest publish time still inside the recency window.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Why enumeration ended early, if a page fetch failed.
    pub fn interruption(&self) -> Option<&str> {
        self.interruption.as_deref()
    }

    pub fn pages_fetched(&self) -> u32 {
        self.next_page
    }

    pub async fn next(&mut self, session: &mut Session) -> Option<NeighborPost> {
        loop {
            while let Some(post) = self.buffer.pop_front() {
                if !self.seen_posts.insert(post.post_id.clone()) {
                    continue;
                }
                if !self.seen_authors.contains(&post.author_nickname) {
                    if self.seen_authors.len() >= self.max_authors {
                        tracing::debug!(authors = self.seen_authors.len(), "author limit reached");
                        self.finish();
                        return None;
                    }
                    self.seen_authors.insert(post.author_nickname.clone());
                }
                return Some(post);
            }

            if self.exhausted {
                return None;
            }
            // Another page could only add authors past the limit.
            if self.seen_authors.len() >= self.max_authors {
                tracing::debug!(authors = self.seen_authors.len(), "author limit reached");
                self.finish();
                return None;
            }
            if !session.is_active() {
                self.interrupt("session is no longer active");
                return None;
            }
            if self.next_page >= MAX_FEED_PAGES {
                tracing::warn!(pages = self.next_page, "feed page limit reached");
                self.finish();
                return None;
            }

            let page_no = self.next_page;
            let page = match self.platform.feed_page(session.handle(), page_no).await {
                Ok(page) => page,
                Err(e) => {
                    if e.is_session_loss() {
                        session.mark_failed(e.to_string());
                    }
                    self.interrupt(format!("feed page {} failed: {}", page_no, e));
                    return None;
                }
            };
            self.next_page += 1;
            tracing::debug!(
                page = page_no,
                posts = page.posts.len(),
                has_more = page.has_more,
                "feed page fetched"
            );

            match page.newest() {
                None => {
                    self.finish();
                    return None;
                }
                Some(newest) if newest < self.cutoff => {
                    tracing::debug!(page = page_no, "page older than recency window");
                    self.finish();
                    return None;
                }
                Some(_) => {}
            }
            if !page.has_more {
                self.exhausted = true;
            }
            self.buffer.extend(page.posts);
        }
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
    }

    fn interrupt(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "feed enumeration interrupted");
        self.interruption = Some(reason);
        self.finish();
    }
}
