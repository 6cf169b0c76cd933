use crate::platform::types::NeighborPost;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

pub const ALREADY_LIKED: &str = "already-liked";
pub const NOT_TARGETED: &str = "not-targeted";
pub const OUTSIDE_WINDOW: &str = "outside-recency-window";

/// Result of processing one post. Exactly one per processed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub post_id: String,
    pub author_nickname: String,
    pub liked: bool,
    pub commented: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionOutcome {
    pub fn skipped(post: &NeighborPost, reason: impl Into<String>) -> Self {
        Self {
            post_id: post.post_id.clone(),
            author_nickname: post.author_nickname.clone(),
            liked: false,
            commented: false,
            skipped: true,
            reason: Some(reason.into()),
        }
    }

    pub fn performed(post: &NeighborPost, liked: bool, commented: bool) -> Self {
        Self {
            post_id: post.post_id.clone(),
            author_nickname: post.author_nickname.clone(),
            liked,
            commented,
            skipped: false,
            reason: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.reason.get_or_insert_with(|| note.into());
        self
    }
}

/// Per-author roll-up, used by the like-only sweep report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborStat {
    pub nickname: String,
    pub posts_seen: usize,
    pub liked: usize,
    pub skipped: usize,
}

/// Sealed result of one run. Built once by [`RunLog::seal`] and never
/// mutated by the engine afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_processed: usize,
    pub total_commented: usize,
    pub total_liked: usize,
    pub total_skipped: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// The run stopped because the global deadline (or cancel) fired.
    pub timed_out: bool,
    pub details: Vec<ActionOutcome>,
    pub errors: Vec<String>,
}

impl RunSummary {
    /// Rejected before any remote call: zeroed counters, no details.
    pub fn rejected(error: impl Into<String>) -> Self {
        let mut log = RunLog::start();
        log.fail(error);
        log.seal()
    }

    /// Group details by author in first-seen order.
    pub fn neighbor_stats(&self) -> Vec<NeighborStat> {
        let mut stats: Vec<NeighborStat> = Vec::new();
        for outcome in &self.details {
            let idx = match stats
                .iter()
                .position(|s| s.nickname == outcome.author_nickname)
            {
                Some(i) => i,
                None => {
                    stats.push(NeighborStat {
                        nickname: outcome.author_nickname.clone(),
                        posts_seen: 0,
                        liked: 0,
                        skipped: 0,
                    });
                    stats.len() - 1
                }
            };
            let stat = &mut stats[idx];
            stat.posts_seen += 1;
            if outcome.liked {
                stat.liked += 1;
            }
            if outcome.skipped {
                stat.skipped += 1;
            }
        }
        stats
    }
}

/// Mutable accumulator owned by a single run.
pub struct RunLog {
    started_at: DateTime<Utc>,
    started: Instant,
    details: Vec<ActionOutcome>,
    errors: Vec<String>,
    fatal: Option<String>,
    timed_out: bool,
}

impl RunLog {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            details: Vec::new(),
            errors: Vec::new(),
            fatal: None,
            timed_out: false,
        }
    }

    pub fn push(&mut self, outcome: ActionOutcome) {
        tracing::info!(
            post_id = %outcome.post_id,
            author = %outcome.author_nickname,
            liked = outcome.liked,
            commented = outcome.commented,
            skipped = outcome.skipped,
            reason = outcome.reason.as_deref().unwrap_or(""),
            "post processed"
        );
        self.details.push(outcome);
    }

    pub fn processed(&self) -> usize {
        self.details.len()
    }

    /// Run-level problem that does not fail the run.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "run error");
        self.errors.push(message);
    }

    /// Run-level failure: the summary will report `success = false`.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(error = %message, "run failed");
        self.errors.push(message.clone());
        self.fatal.get_or_insert(message);
    }

    pub fn mark_timed_out(&mut self) {
        if !self.timed_out {
            tracing::info!(processed = self.details.len(), "run stopped at deadline");
            self.timed_out = true;
        }
    }

    pub fn seal(self) -> RunSummary {
        let count = |pred: fn(&ActionOutcome) -> bool| self.details.iter().filter(|o| pred(o)).count();
        let total_liked = count(|o| o.liked);
        let total_commented = count(|o| o.commented);
        let total_skipped = count(|o| o.skipped);
        let mut errors = self.errors;
        if self.timed_out {
            errors.push("run was time-bounded: stopped at the global deadline".to_string());
        }
        RunSummary {
            success: self.fatal.is_none(),
            error: self.fatal,
            total_processed: self.details.len(),
            total_commented,
            total_liked,
            total_skipped,
            started_at: self.started_at,
            completed_at: Utc::now(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            timed_out: self.timed_out,
            details: self.details,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::scripted::post;

    #[test]
    fn test_seal_counts_outcomes() {
        let mut log = RunLog::start();
        log.push(ActionOutcome::performed(&post("a", "1", 1), true, true));
        log.push(ActionOutcome::performed(&post("b", "2", 1), true, false));
        log.push(ActionOutcome::skipped(&post("c", "3", 1), NOT_TARGETED));
        let summary = log.seal();
        assert!(summary.success);
        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.total_liked, 2);
        assert_eq!(summary.total_commented, 1);
        assert_eq!(summary.total_skipped, 1);
        assert!(summary.completed_at >= summary.started_at);
    }

    #[test]
    fn test_rejected_has_zero_counters() {
        let summary = RunSummary::rejected("forbidden");
        assert!(!summary.success);
        assert_eq!(summary.error.as_deref(), Some("forbidden"));
        assert_eq!(summary.total_processed, 0);
        assert!(summary.details.is_empty());
    }

    #[test]
    fn test_timeout_is_noted_but_not_a_failure() {
        let mut log = RunLog::start();
        log.mark_timed_out();
        let summary = log.seal();
        assert!(summary.success);
        assert!(summary.timed_out);
        assert!(summary.errors.iter().any(|e| e.contains("time-bounded")));
    }

    #[test]
    fn test_neighbor_stats_group_in_first_seen_order() {
        let mut log = RunLog::start();
        log.push(ActionOutcome::performed(&post("bob", "1", 1), true, false));
        log.push(ActionOutcome::performed(&post("amy", "2", 1), true, false));
        log.push(ActionOutcome::skipped(&post("bob", "3", 1), ALREADY_LIKED));
        let stats = log.seal().neighbor_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].nickname, "bob");
        assert_eq!((stats[0].posts_seen, stats[0].liked, stats[0].skipped), (2, 1, 1));
        assert_eq!(stats[1].nickname, "amy");
    }

    #[test]
    fn test_with_note_keeps_existing_reason() {
        let p = post("a", "1", 1);
        let outcome = ActionOutcome::skipped(&p, ALREADY_LIKED).with_note("other");
        assert_eq!(outcome.reason.as_deref(), Some(ALREADY_LIKED));
        let outcome = ActionOutcome::performed(&p, true, false).with_note("comment skipped");
        assert_eq!(outcome.reason.as_deref(), Some("comment skipped"));
    }
}
