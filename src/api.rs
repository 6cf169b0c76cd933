//! Request/response contracts around the engine.
//!
//! Both entry points check the environment gate first, then validate the
//! request, and only then open a session. Rejections come back as sealed
//! summaries with zeroed counters, never as errors.

use crate::engine::{NeighborStat, RunController, RunOptions, RunSummary, SweepOptions};
use crate::vault::Credentials;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// Env var that marks the deployment as local/interactive.
pub const ENV_RUNTIME: &str = "ENGAGE_RUNTIME";
pub const FORBIDDEN: &str = "forbidden";

pub const MAX_POSTS_LIMIT: u32 = 10;
pub const MAX_INTERVAL_SECONDS: u64 = 300;
pub const MAX_DAYS_LIMIT: u32 = 365;
pub const MAX_NEIGHBORS_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request: {0}")]
pub struct ValidationError(pub String);

/// Refuses credential-bearing automation outside a local/interactive
/// deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentGate {
    allowed: bool,
}

impl EnvironmentGate {
    pub fn from_env() -> Self {
        Self::from_value(&std::env::var(ENV_RUNTIME).unwrap_or_default())
    }

    pub fn from_value(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        Self {
            allowed: matches!(value.as_str(), "local" | "interactive"),
        }
    }

    pub fn allow() -> Self {
        Self { allowed: true }
    }

    pub fn deny() -> Self {
        Self { allowed: false }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

fn credentials(account_id: &str, account_secret: &str) -> Result<Credentials, ValidationError> {
    let account_id = account_id.trim();
    if account_id.is_empty() {
        return Err(ValidationError("accountId is required".to_string()));
    }
    if account_secret.trim().is_empty() {
        return Err(ValidationError("accountSecret is required".to_string()));
    }
    Ok(Credentials::new(account_id, account_secret))
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<T, ValidationError> {
    if value < min || value > max {
        return Err(ValidationError(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(value)
}

/// Post-bounded run: like + comment up to `maxPosts`.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub account_secret: String,
    pub max_posts: Option<u32>,
    pub min_interval_seconds: Option<u64>,
    pub keep_liking_after: Option<bool>,
}

impl RunRequest {
    pub fn credentials(&self) -> Result<Credentials, ValidationError> {
        credentials(&self.account_id, &self.account_secret)
    }

    pub fn options(&self, defaults: &RunOptions) -> Result<RunOptions, ValidationError> {
        let max_posts = match self.max_posts {
            Some(n) => check_range("maxPosts", n, 1, MAX_POSTS_LIMIT)? as usize,
            None => defaults.max_posts.min(MAX_POSTS_LIMIT as usize),
        };
        let min_interval = match self.min_interval_seconds {
            Some(s) => Duration::from_secs(check_range("minIntervalSeconds", s, 0, MAX_INTERVAL_SECONDS)?),
            None => defaults.min_interval,
        };
        Ok(RunOptions {
            max_posts,
            min_interval,
            keep_liking_after: self.keep_liking_after.unwrap_or(defaults.keep_liking_after),
            ..defaults.clone()
        })
    }
}

/// Like-only sweep bounded by recency and neighbor count.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub account_secret: String,
    pub days_limit: Option<u32>,
    pub max_neighbors: Option<u32>,
}

impl SweepRequest {
    pub fn credentials(&self) -> Result<Credentials, ValidationError> {
        credentials(&self.account_id, &self.account_secret)
    }

    pub fn options(&self, defaults: &SweepOptions) -> Result<SweepOptions, ValidationError> {
        let days_limit = match self.days_limit {
            Some(d) => check_range("daysLimit", d, 1, MAX_DAYS_LIMIT)?,
            None => defaults.days_limit,
        };
        let max_neighbors = match self.max_neighbors {
            Some(n) => check_range("maxNeighbors", n, 1, MAX_NEIGHBORS_LIMIT)? as usize,
            None => defaults.max_neighbors,
        };
        Ok(SweepOptions {
            days_limit,
            max_neighbors,
            ..defaults.clone()
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_processed: usize,
    pub total_liked: usize,
    pub neighbor_stats: Vec<NeighborStat>,
    pub errors: Vec<String>,
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl From<RunSummary> for SweepResult {
    fn from(summary: RunSummary) -> Self {
        Self {
            neighbor_stats: summary.neighbor_stats(),
            success: summary.success,
            error: summary.error,
            total_processed: summary.total_processed,
            total_liked: summary.total_liked,
            errors: summary.errors,
            timed_out: summary.timed_out,
            started_at: summary.started_at,
            completed_at: summary.completed_at,
        }
    }
}

pub struct Engine {
    controller: RunController,
    gate: EnvironmentGate,
    run_defaults: RunOptions,
    sweep_defaults: SweepOptions,
}

impl Engine {
    pub fn new(controller: RunController, gate: EnvironmentGate) -> Self {
        Self {
            controller,
            gate,
            run_defaults: RunOptions::default(),
            sweep_defaults: SweepOptions::default(),
        }
    }

    pub fn with_run_defaults(mut self, defaults: RunOptions) -> Self {
        self.run_defaults = defaults;
        self
    }

    pub fn with_sweep_defaults(mut self, defaults: SweepOptions) -> Self {
        self.sweep_defaults = defaults;
        self
    }

    pub async fn run(&self, request: &RunRequest, cancel: Option<watch::Receiver<bool>>) -> RunSummary {
        if !self.gate.is_allowed() {
            tracing::warn!("run refused: deployment is not flagged local/interactive");
            return RunSummary::rejected(FORBIDDEN);
        }
        let prepared = request
            .credentials()
            .and_then(|c| Ok((c, request.options(&self.run_defaults)?)));
        match prepared {
            Ok((credentials, options)) => self.controller.run(&credentials, &options, cancel).await,
            Err(e) => RunSummary::rejected(e.to_string()),
        }
    }

    pub async fn sweep(&self, request: &SweepRequest, cancel: Option<watch::Receiver<bool>>) -> SweepResult {
        if !self.gate.is_allowed() {
            tracing::warn!("sweep refused: deployment is not flagged local/interactive");
            return RunSummary::rejected(FORBIDDEN).into();
        }
        let prepared = request
            .credentials()
            .and_then(|c| Ok((c, request.options(&self.sweep_defaults)?)));
        match prepared {
            Ok((credentials, options)) => self
                .controller
                .sweep(&credentials, &options, cancel)
                .await
                .into(),
            Err(e) => RunSummary::rejected(e.to_string()).into(),
        }
    }
}
