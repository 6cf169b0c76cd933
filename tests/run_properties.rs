// End-to-end behavior of the engine against the scripted platform

#[cfg(test)]
mod tests {
    use neighbor_engage::api::{Engine, EnvironmentGate, RunRequest, SweepRequest, FORBIDDEN};
    use neighbor_engage::comments::TemplateComments;
    use neighbor_engage::engine::summary::{ALREADY_LIKED, NOT_TARGETED};
    use neighbor_engage::engine::{RunController, RunOptions, SessionRegistry};
    use neighbor_engage::execution::ActionExecutor;
    use neighbor_engage::platform::scripted::{liked_post, post, ScriptedPlatform};
    use neighbor_engage::targets::{MemoryTargetStore, DEFAULT_OWNER};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(platform: Arc<ScriptedPlatform>, targets: &[&str]) -> Engine {
        let controller = RunController::new(
            platform,
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, targets.iter().copied())),
            Arc::new(TemplateComments::with_seed(vec!["nice post, {nickname}".into()], 7)),
            ActionExecutor::new(false, Duration::from_secs(20)),
        );
        Engine::new(controller, EnvironmentGate::allow())
    }

    fn request(max_posts: u32, interval: u64) -> RunRequest {
        RunRequest {
            account_id: "me".to_string(),
            account_secret: "pw".to_string(),
            max_posts: Some(max_posts),
            min_interval_seconds: Some(interval),
            keep_liking_after: None,
        }
    }

    #[tokio::test]
    async fn test_mixed_feed_stops_at_max_posts_with_reasons() {
        let posts = vec![
            post("ann", "1", 1),
            post("bo", "2", 2),
            liked_post("ann", "3", 3),
            post("cy", "4", 4),
            post("stranger", "5", 5),
            post("ann", "6", 6),
            post("bo", "7", 7),
            post("cy", "8", 8),
        ];
        let platform = Arc::new(ScriptedPlatform::paged(posts, 3));
        let summary = engine(platform.clone(), &["ann", "bo", "cy"])
            .run(&request(5, 0), None)
            .await;

        assert!(summary.success);
        assert_eq!(summary.details.len(), 5);
        assert_eq!(summary.total_processed, 5);
        assert_eq!(summary.total_liked, 3);
        assert_eq!(summary.total_skipped, 2);
        assert_eq!(summary.details[2].reason.as_deref(), Some(ALREADY_LIKED));
        assert_eq!(summary.details[4].reason.as_deref(), Some(NOT_TARGETED));
        assert_eq!(platform.likes(), vec!["1", "2", "4"]);
        assert_eq!(platform.logout_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_spaced_by_min_interval() {
        let platform = Arc::new(ScriptedPlatform::new(vec![(1..=4)
            .map(|i| post("ann", &i.to_string(), 1))
            .collect()]));
        let summary = engine(platform.clone(), &["ann"])
            .run(&request(4, 3), None)
            .await;

        assert_eq!(summary.total_liked, 4);
        let starts = platform.like_starts();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
        assert!(starts[3] - starts[0] >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_slow_actions() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![(1..=100)
                .map(|i| post("ann", &i.to_string(), 1))
                .collect()])
            .with_action_latency(Duration::from_secs(5)),
        );
        let engine = engine(platform.clone(), &["ann"]).with_run_defaults(RunOptions {
            global_timeout: Duration::from_secs(2),
            ..Default::default()
        });
        let summary = engine.run(&request(10, 0), None).await;

        assert!(summary.success);
        assert!(summary.timed_out);
        // One in-flight action is a like plus a comment, 5s each.
        assert!(summary.elapsed_ms <= 12_000, "elapsed {}", summary.elapsed_ms);
        assert_eq!(summary.total_processed, 1);
        assert_eq!(platform.comments().len(), 1);
        assert!(summary.errors.iter().any(|e| e.contains("time-bounded")));
        assert_eq!(platform.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_never_opens_session() {
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![post("ann", "1", 1)]]));
        let engine = engine(platform.clone(), &["ann"]);

        let mut req = request(5, 0);
        req.account_id = "   ".to_string();
        let summary = engine.run(&req, None).await;
        assert!(!summary.success);
        assert!(summary.error.unwrap().contains("accountId"));
        assert_eq!(
            (summary.total_processed, summary.total_liked, summary.total_commented),
            (0, 0, 0)
        );

        let summary = engine.run(&request(11, 0), None).await;
        assert!(!summary.success);

        let sweep = engine
            .sweep(
                &SweepRequest {
                    account_id: "me".to_string(),
                    account_secret: "pw".to_string(),
                    days_limit: None,
                    max_neighbors: Some(51),
                },
                None,
            )
            .await;
        assert!(!sweep.success);
        assert_eq!(platform.login_count(), 0);
    }

    #[tokio::test]
    async fn test_gate_refuses_with_forbidden() {
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![post("ann", "1", 1)]]));
        let controller = RunController::new(
            platform.clone(),
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryTargetStore::with_targets(DEFAULT_OWNER, ["ann"])),
            Arc::new(TemplateComments::new(vec!["hi".into()])),
            ActionExecutor::new(false, Duration::from_secs(20)),
        );
        let engine = Engine::new(controller, EnvironmentGate::deny());

        let summary = engine.run(&request(5, 0), None).await;
        assert!(!summary.success);
        assert_eq!(summary.error.as_deref(), Some(FORBIDDEN));
        assert_eq!(summary.total_processed, 0);
        assert_eq!(platform.login_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_on_one_account_are_refused() {
        let platform = Arc::new(
            ScriptedPlatform::new(vec![(1..=3)
                .map(|i| post("ann", &i.to_string(), 1))
                .collect()])
            .with_action_latency(Duration::from_secs(1)),
        );
        let engine = engine(platform.clone(), &["ann"]);
        let req = request(3, 0);

        let (first, second) = tokio::join!(engine.run(&req, None), engine.run(&req, None));
        assert!(first.success);
        assert_eq!(first.total_liked, 3);
        assert!(!second.success);
        assert!(second.error.unwrap().contains("active session"));
        assert_eq!(platform.login_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_reports_per_neighbor_stats() {
        let platform = Arc::new(ScriptedPlatform::new(vec![vec![
            post("ann", "1", 1),
            post("bo", "2", 2),
            post("ann", "3", 24 * 3),
            post("bo", "4", 24 * 10),
        ]]));
        let result = engine(platform.clone(), &["ann", "bo"])
            .with_sweep_defaults(neighbor_engage::engine::SweepOptions {
                min_interval: Duration::ZERO,
                ..Default::default()
            })
            .sweep(
                &SweepRequest {
                    account_id: "me".to_string(),
                    account_secret: "pw".to_string(),
                    days_limit: Some(7),
                    max_neighbors: Some(5),
                },
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.total_liked, 3);
        assert!(platform.comments().is_empty());
        let ann = result
            .neighbor_stats
            .iter()
            .find(|s| s.nickname == "ann")
            .unwrap();
        assert_eq!((ann.posts_seen, ann.liked), (2, 2));
    }
}
