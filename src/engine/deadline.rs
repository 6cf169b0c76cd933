use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Global run deadline. A caller cancel signal is folded into the same check,
/// so there is exactly one way for a run to stop early.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    at: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + limit,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<watch::Receiver<bool>>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Clamp to at most `limit` after start.
    pub fn tighten(mut self, limit: Duration) -> Self {
        self.at = self.at.min(self.started + limit);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at || self.is_cancelled()
    }

    /// Sleep until `until`, waking early if the deadline passes or the run is
    /// cancelled. Returns `true` only if the full wait completed in time.
    pub async fn sleep_until(&self, until: Instant) -> bool {
        let wake = until.min(self.at);
        match self.cancel.clone() {
            Some(mut rx) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(wake) => {}
                    _ = wait_for_cancel(&mut rx) => {}
                }
            }
            None => tokio::time::sleep_until(wake).await,
        }
        !self.expired() && Instant::now() >= until
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling: never fires.
            std::future::pending::<()>().await;
        }
    }
}
