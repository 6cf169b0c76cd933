use crate::engine::session::Session;
use crate::engine::summary::{ActionOutcome, ALREADY_LIKED};
use crate::platform::types::NeighborPost;
use crate::platform::{Platform, PlatformError};
use std::future::Future;
use std::time::Duration;

/// What to do to one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    pub like: bool,
    pub comment: Option<String>,
}

impl ActionPlan {
    pub fn like_only() -> Self {
        Self {
            like: true,
            comment: None,
        }
    }

    pub fn like_and_comment(text: impl Into<String>) -> Self {
        Self {
            like: true,
            comment: Some(text.into()),
        }
    }
}

/// Applies a single engagement action. Never sleeps (spacing is the
/// controller's job) and never returns an error: every failure becomes a
/// skipped [`ActionOutcome`].
pub struct ActionExecutor {
    dry_run: bool,
    action_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(dry_run: bool, action_timeout: Duration) -> Self {
        Self {
            dry_run,
            action_timeout,
        }
    }

    /// Whether `apply` would touch the platform for this post.
    pub fn requires_remote(post: &NeighborPost, plan: &ActionPlan) -> bool {
        !post.already_liked && (plan.like || plan.comment.is_some())
    }

    pub async fn apply(
        &self,
        platform: &dyn Platform,
        session: &mut Session,
        post: &NeighborPost,
        plan: &ActionPlan,
    ) -> ActionOutcome {
        // Never double-like, whatever the remote UI would allow.
        if post.already_liked {
            return ActionOutcome::skipped(post, ALREADY_LIKED);
        }
        if !plan.like && plan.comment.is_none() {
            return ActionOutcome::skipped(post, "no action requested");
        }
        if !session.is_active() {
            return ActionOutcome::skipped(post, "session is no longer active");
        }

        if self.dry_run {
            tracing::info!(
                post_id = %post.post_id,
                author = %post.author_nickname,
                like = plan.like,
                comment = plan.comment.is_some(),
                "DRY RUN: would engage post"
            );
            return ActionOutcome::performed(post, plan.like, plan.comment.is_some());
        }

        let mut liked = false;
        if plan.like {
            let result = self
                .bounded(platform.like(session.handle(), post))
                .await;
            if let Err(e) = result {
                Self::note_failure(session, post, "like", &e);
                return ActionOutcome::skipped(post, format!("like failed: {}", e));
            }
            liked = true;
        }

        let Some(text) = plan.comment.as_deref() else {
            return ActionOutcome::performed(post, liked, false);
        };
        let result = self
            .bounded(platform.comment(session.handle(), post, text))
            .await;
        match result {
            Ok(()) => ActionOutcome::performed(post, liked, true),
            Err(e) => {
                Self::note_failure(session, post, "comment", &e);
                let reason = format!("comment failed: {}", e);
                if liked {
                    ActionOutcome::performed(post, true, false).with_note(reason)
                } else {
                    ActionOutcome::skipped(post, reason)
                }
            }
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<(), PlatformError>
    where
        F: Future<Output = Result<(), PlatformError>>,
    {
        match tokio::time::timeout(self.action_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout),
        }
    }

    fn note_failure(session: &mut Session, post: &NeighborPost, action: &str, e: &PlatformError) {
        tracing::warn!(
            post_id = %post.post_id,
            author = %post.author_nickname,
            action,
            error = %e,
            "action failed"
        );
        if e.is_session_loss() {
            session.mark_failed(e.to_string());
        }
    }
}
