//! Orchestrates one run: open a session, walk the feed, apply actions one at a
//! time spaced by `min_interval`, stop at the deadline, always close the
//! session, and return a sealed [`RunSummary`].
//!
//! Two public modes share the loop:
//! - [`RunController::run`]: bounded by post count; likes and comments within
//!   `max_posts`, then optionally keeps liking (no comments) until the feed,
//!   `keep_liking_cap` or the deadline runs out.
//! - [`RunController::sweep`]: like-only, bounded by recency and neighbor
//!   count, with a hard wall-clock ceiling on top of the caller's deadline.

use super::deadline::Deadline;
use super::feed::FeedEnumerator;
use super::session::{SessionManager, SessionRegistry};
use super::summary::{ActionOutcome, RunLog, RunSummary, NOT_TARGETED, OUTSIDE_WINDOW};
use crate::comments::CommentWriter;
use crate::execution::{ActionExecutor, ActionPlan};
use crate::platform::Platform;
use crate::targets::{TargetError, TargetStore, DEFAULT_OWNER};
use crate::vault::Credentials;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub days_limit: u32,
    pub max_posts: usize,
    pub min_interval: Duration,
    pub keep_liking_after: bool,
    /// Upper bound on posts processed when `keep_liking_after` is set.
    pub keep_liking_cap: usize,
    pub global_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            days_limit: 7,
            max_posts: 5,
            min_interval: Duration::from_secs(3),
            keep_liking_after: false,
            keep_liking_cap: 30,
            global_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub days_limit: u32,
    pub max_neighbors: usize,
    pub min_interval: Duration,
    pub global_timeout: Duration,
    /// Ceiling applied regardless of `global_timeout`.
    pub hard_limit: Duration,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            days_limit: 7,
            max_neighbors: 10,
            min_interval: Duration::from_secs(3),
            global_timeout: Duration::from_secs(600),
            hard_limit: Duration::from_secs(600),
        }
    }
}

/// Internal shape shared by both modes.
struct LoopPlan {
    days_limit: u32,
    max_authors: usize,
    /// Posts that get like + comment. `None`: no comment phase.
    comment_quota: Option<usize>,
    /// Stop after this many processed posts.
    overall_cap: Option<usize>,
    min_interval: Duration,
}

pub struct RunController {
    platform: Arc<dyn Platform>,
    sessions: SessionManager,
    targets: Arc<dyn TargetStore>,
    comments: Arc<dyn CommentWriter>,
    executor: ActionExecutor,
    owner_id: String,
}

impl RunController {
    pub fn new(
        platform: Arc<dyn Platform>,
        registry: Arc<SessionRegistry>,
        targets: Arc<dyn TargetStore>,
        comments: Arc<dyn CommentWriter>,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            sessions: SessionManager::new(platform.clone(), registry),
            platform,
            targets,
            comments,
            executor,
            owner_id: DEFAULT_OWNER.to_string(),
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub async fn run(
        &self,
        credentials: &Credentials,
        options: &RunOptions,
        cancel: Option<watch::Receiver<bool>>,
    ) -> RunSummary {
        let cap = if options.keep_liking_after {
            options.keep_liking_cap.max(options.max_posts)
        } else {
            options.max_posts
        };
        let plan = LoopPlan {
            days_limit: options.days_limit,
            max_authors: cap,
            comment_quota: Some(options.max_posts),
            overall_cap: Some(cap),
            min_interval: options.min_interval,
        };
        let deadline = Deadline::after(options.global_timeout).with_cancel(cancel);
        tracing::info!(
            account = %credentials.account_id,
            max_posts = options.max_posts,
            keep_liking = options.keep_liking_after,
            interval_s = options.min_interval.as_secs_f64(),
            "run starting"
        );
        self.execute(credentials, &plan, deadline).await
    }

    pub async fn sweep(
        &self,
        credentials: &Credentials,
        options: &SweepOptions,
        cancel: Option<watch::Receiver<bool>>,
    ) -> RunSummary {
        let plan = LoopPlan {
            days_limit: options.days_limit,
            max_authors: options.max_neighbors,
            comment_quota: None,
            overall_cap: None,
            min_interval: options.min_interval,
        };
        let deadline = Deadline::after(options.global_timeout)
            .tighten(options.hard_limit)
            .with_cancel(cancel);
        tracing::info!(
            account = %credentials.account_id,
            days = options.days_limit,
            neighbors = options.max_neighbors,
            "sweep starting"
        );
        self.execute(credentials, &plan, deadline).await
    }

    fn load_targets(&self) -> Result<BTreeSet<String>, TargetError> {
        match self.targets.get(&self.owner_id) {
            Ok(list) => {
                if list.is_empty() {
                    tracing::warn!(owner = %self.owner_id, "target list is empty; every post will be skipped");
                }
                Ok(list.nicknames)
            }
            Err(TargetError::NotFound(_)) => {
                tracing::warn!(owner = %self.owner_id, "no target list; every post will be skipped");
                Ok(BTreeSet::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, credentials: &Credentials, plan: &LoopPlan, deadline: Deadline) -> RunSummary {
        let mut log = RunLog::start();

        let allow = match self.load_targets() {
            Ok(allow) => allow,
            Err(e) => {
                log.fail(format!("target list unavailable: {}", e));
                return log.seal();
            }
        };

        let mut session = match self.sessions.open(credentials).await {
            Ok(session) => session,
            Err(e) => {
                log.fail(e.to_string());
                return log.seal();
            }
        };

        let mut feed = FeedEnumerator::new(self.platform.as_ref(), plan.days_limit, plan.max_authors);
        let mut last_action_end: Option<Instant> = None;

        loop {
            if deadline.expired() {
                log.mark_timed_out();
                break;
            }
            if !session.is_active() {
                break;
            }
            if plan.overall_cap.is_some_and(|cap| log.processed() >= cap) {
                break;
            }

            let Some(post) = feed.next(&mut session).await else {
                break;
            };
            // A page fetch may have run past the deadline.
            if deadline.expired() {
                log.mark_timed_out();
                break;
            }

            if post.published_at < feed.cutoff() {
                log.push(ActionOutcome::skipped(&post, OUTSIDE_WINDOW));
                continue;
            }
            if !allow.contains(post.author_nickname.trim()) {
                log.push(ActionOutcome::skipped(&post, NOT_TARGETED));
                continue;
            }

            let in_comment_phase = plan.comment_quota.is_some_and(|q| log.processed() < q);
            let mut note = None;
            let action = if in_comment_phase && !post.already_liked {
                match self.comments.compose(&post).await {
                    Ok(Some(text)) => ActionPlan::like_and_comment(text),
                    Ok(None) => ActionPlan::like_only(),
                    Err(e) => {
                        tracing::warn!(post_id = %post.post_id, error = %e, "comment composition failed");
                        note = Some(format!("comment unavailable: {:#}", e));
                        ActionPlan::like_only()
                    }
                }
            } else {
                ActionPlan::like_only()
            };
            if deadline.expired() {
                log.mark_timed_out();
                break;
            }

            if ActionExecutor::requires_remote(&post, &action) {
                if let Some(prev) = last_action_end {
                    if !deadline.sleep_until(prev + plan.min_interval).await {
                        log.mark_timed_out();
                        break;
                    }
                }
            }

            let mut outcome = self
                .executor
                .apply(self.platform.as_ref(), &mut session, &post, &action)
                .await;
            if ActionExecutor::requires_remote(&post, &action) {
                last_action_end = Some(Instant::now());
            }
            if let Some(note) = note {
                outcome = outcome.with_note(note);
            }
            log.push(outcome);

            if let Some(reason) = session.failure() {
                log.error(format!("session lost at post {}: {}", post.post_id, reason));
                break;
            }
        }

        if let Some(reason) = feed.interruption() {
            log.error(format!("feed enumeration ended early: {}", reason));
        }

        self.sessions.close(&mut session).await;
        let summary = log.seal();
        tracing::info!(
            pages = feed.pages_fetched(),
            processed = summary.total_processed,
            liked = summary.total_liked,
            commented = summary.total_commented,
            skipped = summary.total_skipped,
            timed_out = summary.timed_out,
            elapsed_ms = summary.elapsed_ms,
            "run complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::{NoComments, TemplateComments};
    use crate::platform::scripted::{liked_post, post, Failure, ScriptedPlatform};
    use crate::targets::MemoryTargetStore;

    fn controller(platform: Arc<ScriptedPlatform>, targets: &[&str]) -> RunController {
        RunController::new(
            platform,
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, targets.iter().copied())),
            Arc::new(TemplateComments::with_seed(vec!["hi {nickname}".into()], 3)),
            ActionExecutor::new(false, Duration::from_secs(20)),
        )
    }

    fn creds() -> Credentials {
        Credentials::new("acct", "pw")
    }

    fn fast(max_posts: usize) -> RunOptions {
        RunOptions {
            max_posts,
            min_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_comment_phase_then_stop_at_max_posts() {
        let platform = Arc::new(ScriptedPlatform::paged(
            (1..=6).map(|i| post(&format!("n{}", i), &i.to_string(), 1)).collect(),
            3,
        ));
        let targets: Vec<String> = (1..=6).map(|i| format!("n{}", i)).collect();
        let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
        let summary = controller(platform.clone(), &targets)
            .run(&creds(), &fast(2), None)
            .await;
        assert!(summary.success);
        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.total_commented, 2);
        assert_eq!(platform.comments()[0].1, "hi n1");
        assert_eq!(platform.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_keep_liking_after_quota_likes_without_comments() {
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![
            post("a", "1", 1),
            post("b", "2", 1),
            post("c", "3", 1),
            post("d", "4", 1),
        ]]));
        let options = RunOptions {
            keep_liking_after: true,
            ..fast(2)
        };
        let summary = controller(platform.clone(), &["a", "b", "c", "d"])
            .run(&creds(), &options, None)
            .await;
        assert_eq!(summary.total_processed, 4);
        assert_eq!(summary.total_liked, 4);
        assert_eq!(summary.total_commented, 2);
        let commented: Vec<String> = platform.comments().into_iter().map(|(id, _)| id).collect();
        assert_eq!(commented, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_keep_liking_respects_cap() {
        let platform = Arc::new(ScriptedPlatform::new(vec![(1..=10)
            .map(|i| post("a", &i.to_string(), 1))
            .collect()]));
        let options = RunOptions {
            keep_liking_after: true,
            keep_liking_cap: 6,
            ..fast(2)
        };
        let summary = controller(platform, &["a"]).run(&creds(), &options, None).await;
        assert_eq!(summary.total_processed, 6);
    }

    #[tokio::test]
    async fn test_stale_posts_are_skipped_as_outside_window() {
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![
            post("a", "1", 1),
            post("a", "2", 24 * 8),
        ]]));
        let summary = controller(platform.clone(), &["a"])
            .run(&creds(), &fast(5), None)
            .await;
        assert_eq!(summary.details[1].reason.as_deref(), Some(OUTSIDE_WINDOW));
        assert_eq!(platform.likes(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_auth_failure_is_run_failure_with_no_details() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![vec![post("a", "1", 1)]])
                .failing_login(Failure::Locked("too many attempts".into())),
        );
        let summary = controller(platform.clone(), &["a"])
            .run(&creds(), &fast(5), None)
            .await;
        assert!(!summary.success);
        assert!(summary.error.unwrap().contains("too many attempts"));
        assert!(summary.details.is_empty());
        assert_eq!(platform.feed_pages_fetched(), 0);
    }

    #[tokio::test]
    async fn test_session_loss_stops_run_and_keeps_partial_results() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![vec![post("a", "1", 1), post("a", "2", 1), post("a", "3", 1)]])
                .failing_like("2", Failure::SessionExpired),
        );
        let summary = controller(platform.clone(), &["a"])
            .run(&creds(), &fast(5), None)
            .await;
        assert!(summary.success);
        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.total_liked, 1);
        assert!(summary.errors.iter().any(|e| e.contains("session lost at post 2")));
        assert_eq!(platform.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_recorded_as_run_error() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![vec![post("a", "1", 1)], vec![post("a", "2", 1)]])
                .failing_feed_at(1, Failure::Network("reset".into())),
        );
        let summary = controller(platform, &["a"]).run(&creds(), &fast(5), None).await;
        assert!(summary.success);
        assert_eq!(summary.total_processed, 1);
        assert!(summary.errors.iter().any(|e| e.contains("feed enumeration ended early")));
    }

    #[tokio::test]
    async fn test_comment_writer_failure_downgrades_to_like() {
        struct Broken;
        #[async_trait::async_trait]
        impl CommentWriter for Broken {
            async fn compose(&self, _post: &crate::platform::types::NeighborPost) -> anyhow::Result<Option<String>> {
                anyhow::bail!("generator offline")
            }
        }
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![post("a", "1", 1)]]));
        let controller = RunController::new(
            platform.clone(),
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, ["a"])),
            Arc::new(Broken),
            ActionExecutor::new(false, Duration::from_secs(20)),
        );
        let summary = controller.run(&creds(), &fast(5), None).await;
        let outcome = &summary.details[0];
        assert!(outcome.liked && !outcome.commented && !outcome.skipped);
        assert!(outcome.reason.as_deref().unwrap().contains("generator offline"));
    }

    #[tokio::test]
    async fn test_sweep_is_like_only_across_neighbors() {
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![
            post("a", "1", 1),
            post("b", "2", 2),
            liked_post("a", "3", 3),
            post("c", "4", 4),
        ]]));
        let controller = RunController::new(
            platform.clone(),
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, ["a", "b", "c"])),
            Arc::new(NoComments),
            ActionExecutor::new(false, Duration::from_secs(20)),
        );
        let options = SweepOptions {
            max_neighbors: 2,
            min_interval: Duration::ZERO,
            ..Default::default()
        };
        let summary = controller.sweep(&creds(), &options, None).await;
        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.total_liked, 2);
        assert_eq!(summary.total_commented, 0);
        assert!(platform.comments().is_empty());
        let stats = summary.neighbor_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!((stats[0].posts_seen, stats[0].liked, stats[0].skipped), (2, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_hard_limit_overrides_caller_deadline() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![(1..=50).map(|i| post("a", &i.to_string(), 1)).collect()])
                .with_action_latency(Duration::from_secs(30)),
        );
        let controller = controller(platform, &["a"]);
        let options = SweepOptions {
            max_neighbors: 1,
            min_interval: Duration::from_secs(3),
            global_timeout: Duration::from_secs(3600),
            hard_limit: Duration::from_secs(600),
            ..Default::default()
        };
        let summary = controller.sweep(&creds(), &options, None).await;
        assert!(summary.timed_out);
        assert!(summary.elapsed_ms <= 630_000, "elapsed {}", summary.elapsed_ms);
        assert!(summary.total_processed < 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_run_and_closes_session() {
        let platform = Arc::new(ScriptedPlatform::new(vec![(1..=20)
            .map(|i| post("a", &i.to_string(), 1))
            .collect()]));
        let controller = Arc::new(controller(platform.clone(), &["a"]));
        let (tx, rx) = watch::channel(false);
        let options = RunOptions {
            min_interval: Duration::from_secs(10),
            ..fast(20)
        };
        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run(&creds(), &options, Some(rx)).await })
        };
        tokio::time::sleep(Duration::from_secs(15)).await;
        tx.send(true).unwrap();
        let summary = task.await.unwrap();
        assert!(summary.timed_out);
        assert_eq!(summary.total_processed, 2);
        assert_eq!(platform.logout_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_feed_page_past_deadline_sends_no_action() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![(1..=10).map(|i| post("a", &i.to_string(), 1)).collect()])
                .with_feed_latency(Duration::from_secs(5))
                .with_action_latency(Duration::from_secs(5)),
        );
        let options = RunOptions {
            global_timeout: Duration::from_secs(2),
            ..fast(10)
        };
        let summary = controller(platform.clone(), &["a"]).run(&creds(), &options, None).await;
        assert!(summary.timed_out);
        assert!(summary.elapsed_ms <= 7_000, "elapsed {}", summary.elapsed_ms);
        assert!(platform.likes().is_empty());
        assert_eq!(summary.total_processed, 0);
        assert_eq!(platform.logout_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_comment_composition_past_deadline_sends_no_action() {
        struct Slow;
        #[async_trait::async_trait]
        impl CommentWriter for Slow {
            async fn compose(&self, _post: &crate::platform::types::NeighborPost) -> anyhow::Result<Option<String>> {
                tokio::time::sleep(Duration::from_secs(15)).await;
                Ok(Some("late".to_string()))
            }
        }
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![post("a", "1", 1), post("a", "2", 1)]]));
        let controller = RunController::new(
            platform.clone(),
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, ["a"])),
            Arc::new(Slow),
            ActionExecutor::new(false, Duration::from_secs(20)),
        );
        let options = RunOptions {
            global_timeout: Duration::from_secs(2),
            ..fast(5)
        };
        let summary = controller.run(&creds(), &options, None).await;
        assert!(summary.timed_out);
        assert!(platform.likes().is_empty());
        assert!(platform.comments().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_login_counts_against_deadline() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![vec![post("a", "1", 1)]])
                .with_login_latency(Duration::from_secs(5)),
        );
        let options = RunOptions {
            global_timeout: Duration::from_secs(2),
            ..fast(5)
        };
        let summary = controller(platform.clone(), &["a"]).run(&creds(), &options, None).await;
        assert!(summary.success);
        assert!(summary.timed_out);
        assert_eq!(platform.feed_pages_fetched(), 0);
        assert_eq!(platform.logout_count(), 1);
    }
}
