#[cfg(test)]
mod tests {
    use crate::utils::{
        Harness, POLL, Script, ScriptedExecutor, TEST_USER, cluster, files_in, read_lines, request,
    };
    use engine_runtime::error::{EngineError, ValidationError};
    use model::{
        core::identifiers::ExecutionId,
        execution::status::{ExecutionStatus, TargetStatus},
    };
    use std::time::Duration;
    use tracing_test::traced_test;

    async fn submit_and_wait(harness: &Harness, sql: &str, clusters: &[u64]) -> model::execution::view::ExecutionView {
        let pending = harness
            .orchestrator
            .submit(request(sql, clusters))
            .await
            .expect("submit");
        harness
            .orchestrator
            .wait_for(&ExecutionId::from(pending.execution_id.as_str()), POLL)
            .await
            .expect("wait")
    }

    // Scenario: three slow databases, one of them failing, while the status is
    // polled between targets.
    // Expected Outcome:
    // - Every snapshot has completed + failed <= total.
    // - Progress is visible while RUNNING and the counters add up at the end.
    #[traced_test]
    #[tokio::test]
    async fn progress_counters_never_exceed_total() {
        let step = Duration::from_millis(80);
        let executor = ScriptedExecutor::new()
            .script("a", Script::Slow(step, 2))
            .script("b", Script::Refuse("connection refused".into()))
            .script("c", Script::Slow(step, 1))
            .script("d", Script::Slow(step, 1));
        let harness = Harness::start(vec![cluster(1, "east", true, &["a", "b", "c", "d"])], executor);

        let pending = harness.orchestrator.submit(request("SELECT 1", &[1])).await.unwrap();
        let id = ExecutionId::from(pending.execution_id.as_str());

        let mut saw_partial_progress = false;
        let done = loop {
            let view = harness.orchestrator.status(&id).await.unwrap();
            assert!(
                view.completed_targets + view.failed_targets <= view.total_targets,
                "{} + {} > {}",
                view.completed_targets,
                view.failed_targets,
                view.total_targets
            );
            if view.status.is_terminal() {
                break view;
            }
            let finished = view.completed_targets + view.failed_targets;
            if view.status == ExecutionStatus::Running && finished > 0 && finished < view.total_targets {
                saw_partial_progress = true;
            }
            tokio::time::sleep(POLL).await;
        };

        assert!(saw_partial_progress);
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.total_targets, 4);
        assert_eq!(done.completed_targets, 3);
        assert_eq!(done.failed_targets, 1);
        assert_eq!(done.total_rows, 4);

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: one of three databases rejects the statement.
    // Expected Outcome:
    // - The execution still completes.
    // - Counters add up and the failing target carries the server message.
    // - Targets keep plan order.
    #[traced_test]
    #[tokio::test]
    async fn partial_failure_completes_execution() {
        let executor = ScriptedExecutor::new()
            .script("sales", Script::Rows(3))
            .script("hr", Script::Rows(2))
            .script("legacy", Script::Fail("relation \"orders\" does not exist".into()));
        let harness = Harness::start(vec![cluster(1, "east", true, &["sales", "legacy", "hr"])], executor);

        let done = submit_and_wait(&harness, "SELECT * FROM orders", &[1]).await;

        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.total_targets, 3);
        assert_eq!(done.completed_targets, 2);
        assert_eq!(done.failed_targets, 1);
        assert_eq!(done.total_rows, 5);
        assert!(done.duration_ms.is_some());
        assert!(done.completed_at.is_some());

        let databases: Vec<&str> = done.targets.iter().map(|t| t.database.as_str()).collect();
        assert_eq!(databases, vec!["sales", "legacy", "hr"]);

        let failed = &done.targets[1];
        assert_eq!(failed.status, TargetStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap_or_default().contains("does not exist"));
        assert!(failed.file_path.is_none());
        assert_eq!(harness.executor.calls(), vec!["sales", "legacy", "hr"]);

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: two clusters each answer with rows.
    // Expected Outcome: the consolidated file starts with the provenance
    // columns and holds every row, tagged with the file it came from.
    #[traced_test]
    #[tokio::test]
    async fn consolidated_file_tags_provenance() {
        let executor = ScriptedExecutor::new().script("sales", Script::Rows(2));
        let harness = Harness::start(
            vec![
                cluster(1, "east", true, &["sales"]),
                cluster(2, "west", true, &["sales"]),
            ],
            executor,
        );

        let done = submit_and_wait(&harness, "SELECT id FROM t", &[1, 2]).await;
        assert_eq!(done.total_rows, 4);

        let consolidated = done.consolidated_path.clone().expect("consolidated path");
        assert!(consolidated.ends_with(&format!("{}_consolidated.csv", done.execution_id)));

        let lines = read_lines(&consolidated);
        assert_eq!(lines[0], "cluster,database,source_file,id,db");
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("east,sales,east_sales_"));
        assert!(lines[4].starts_with("west,sales,west_sales_"));
        assert!(lines[4].ends_with(",1,sales"));

        // Per-target files plus the consolidated file.
        let dir = harness.results_root().join(&done.execution_id);
        assert_eq!(files_in(&dir).len(), 3);

        let bytes = harness
            .orchestrator
            .download(&ExecutionId::from(done.execution_id.as_str()))
            .await
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().lines().count(), 5);

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: every target fails.
    // Expected Outcome: COMPLETED with no rows and nothing to download.
    #[traced_test]
    #[tokio::test]
    async fn all_targets_failing_still_completes() {
        let executor = ScriptedExecutor::new()
            .script("a", Script::Refuse("connection refused".into()))
            .script("b", Script::Fail("permission denied".into()));
        let harness = Harness::start(vec![cluster(1, "east", true, &["a", "b"])], executor);

        let done = submit_and_wait(&harness, "SELECT 1", &[1]).await;
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.failed_targets, 2);
        assert_eq!(done.total_rows, 0);
        assert!(done.consolidated_path.is_none());

        let err = harness
            .orchestrator
            .download(&ExecutionId::from(done.execution_id.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: the database filter matches nothing on the selected cluster.
    // Expected Outcome: FAILED with a "no targets" message and no files.
    #[traced_test]
    #[tokio::test]
    async fn empty_plan_fails_execution() {
        let harness = Harness::start(vec![cluster(1, "east", true, &["sales"])], ScriptedExecutor::new());

        let mut req = request("SELECT 1", &[1]);
        req.database_names = Some(vec!["archive".into()]);
        let pending = harness.orchestrator.submit(req).await.unwrap();
        let done = harness
            .orchestrator
            .wait_for(&ExecutionId::from(pending.execution_id.as_str()), POLL)
            .await
            .unwrap();

        assert_eq!(done.status, ExecutionStatus::Failed);
        assert!(done.error_message.unwrap_or_default().contains("no targets"));
        assert!(done.targets.is_empty());
        assert!(harness.executor.calls().is_empty());
        assert!(!harness.results_root().join(&done.execution_id).exists());

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: the database filter narrows an active cluster.
    // Expected Outcome: only matching databases become targets.
    #[traced_test]
    #[tokio::test]
    async fn database_filter_restricts_targets() {
        let harness = Harness::start(
            vec![cluster(1, "east", true, &["sales", "hr", "ops"])],
            ScriptedExecutor::new(),
        );

        let mut req = request("SELECT 1", &[1]);
        req.database_names = Some(vec!["ops".into(), "sales".into()]);
        let pending = harness.orchestrator.submit(req).await.unwrap();
        let done = harness
            .orchestrator
            .wait_for(&ExecutionId::from(pending.execution_id.as_str()), POLL)
            .await
            .unwrap();

        assert_eq!(done.total_targets, 2);
        assert_eq!(harness.executor.calls(), vec!["sales", "ops"]);

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: an inactive cluster that discovery cannot revive, next to one
    // that discovery brings back.
    // Expected Outcome:
    // - The dead cluster's known databases are recorded as failed targets.
    // - The revived cluster runs against its freshly discovered databases.
    #[traced_test]
    #[tokio::test]
    async fn inactive_clusters_are_rediscovered_or_failed() {
        let executor = ScriptedExecutor::new().discovers(2, &["fresh"]);
        let harness = Harness::start(
            vec![
                cluster(1, "dead", false, &["stale"]),
                cluster(2, "revived", false, &["gone"]),
            ],
            executor,
        );

        let done = submit_and_wait(&harness, "SELECT 1", &[1, 2]).await;
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.total_targets, 2);

        let dead = &done.targets[0];
        assert_eq!(dead.cluster_alias, "dead");
        assert_eq!(dead.status, TargetStatus::Failed);
        assert!(dead.error_message.as_deref().unwrap_or_default().contains("inactive"));

        let revived = &done.targets[1];
        assert_eq!(revived.database, "fresh");
        assert_eq!(revived.status, TargetStatus::Completed);
        assert_eq!(harness.executor.calls(), vec!["fresh"]);

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: cancel arrives while the first target is still running.
    // Expected Outcome: the execution stays CANCELLED after the worker
    // finishes its remaining targets.
    #[traced_test]
    #[tokio::test]
    async fn cancellation_is_never_overwritten() {
        let executor = ScriptedExecutor::new()
            .script("slow", Script::Slow(Duration::from_millis(300), 1));
        let harness = Harness::start(vec![cluster(1, "east", true, &["slow", "fast"])], executor);

        let pending = harness.orchestrator.submit(request("SELECT 1", &[1])).await.unwrap();
        let id = ExecutionId::from(pending.execution_id.as_str());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.orchestrator.cancel(&id).await.unwrap());
        assert!(!harness.orchestrator.cancel(&id).await.unwrap());

        // Let the worker run past the slow target and finish.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let view = harness.orchestrator.status(&id).await.unwrap();
        assert_eq!(view.status, ExecutionStatus::Cancelled);
        assert_eq!(view.error_message.as_deref(), Some("cancelled by user"));
        assert!(harness.orchestrator.running().await.unwrap().is_empty());

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: the executor caps rows per target.
    // Expected Outcome: only the capped rows are counted and written.
    #[traced_test]
    #[tokio::test]
    async fn row_cap_limits_each_target() {
        let executor = ScriptedExecutor::with_max_rows(3).script("big", Script::Rows(50));
        let harness = Harness::start(vec![cluster(1, "east", true, &["big"])], executor);

        let done = submit_and_wait(&harness, "SELECT * FROM events", &[1]).await;
        assert_eq!(done.total_rows, 3);

        let file = done.targets[0].file_path.clone().expect("target file");
        // Header plus three rows.
        assert_eq!(read_lines(file).len(), 4);

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: submissions that fail validation.
    // Expected Outcome: each is rejected and nothing reaches the ledger.
    #[traced_test]
    #[tokio::test]
    async fn invalid_submissions_persist_nothing() {
        let harness = Harness::start(vec![cluster(1, "east", true, &["sales"])], ScriptedExecutor::new());

        let cases = [
            (request("   ", &[1]), ValidationError::EmptySql),
            (request("UPDATE t SET a = 1", &[1]), ValidationError::NotSelect),
            (
                request("SELECT 1; DROP TABLE t", &[1]),
                ValidationError::DisallowedKeyword("DROP".into()),
            ),
            (request("SELECT 1", &[]), ValidationError::NoClusters),
            (request("SELECT 1", &[9]), ValidationError::UnknownCluster(9)),
        ];
        for (req, expected) in cases {
            match harness.orchestrator.submit(req).await {
                Err(EngineError::Validation(err)) => assert_eq!(err, expected),
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        assert!(harness.orchestrator.list_by_user(TEST_USER).await.unwrap().is_empty());
        assert!(harness.executor.calls().is_empty());

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: a user submits several statements.
    // Expected Outcome: listing returns them newest first.
    #[traced_test]
    #[tokio::test]
    async fn user_history_is_newest_first() {
        let harness = Harness::start(vec![cluster(1, "east", true, &["sales"])], ScriptedExecutor::new());

        let mut ids = Vec::new();
        for n in 0..3 {
            let view = submit_and_wait(&harness, &format!("SELECT {n}"), &[1]).await;
            ids.push(view.execution_id);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let listed: Vec<String> = harness
            .orchestrator
            .list_by_user(TEST_USER)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.execution_id)
            .collect();
        ids.reverse();
        assert_eq!(listed, ids);
        assert!(harness.orchestrator.list_by_user("someone-else").await.unwrap().is_empty());

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: retention purge with a zero-day window.
    // Expected Outcome: every execution directory is removed.
    #[traced_test]
    #[tokio::test]
    async fn purge_removes_result_directories() {
        let harness = Harness::start(vec![cluster(1, "east", true, &["sales"])], ScriptedExecutor::new());

        let done = submit_and_wait(&harness, "SELECT 1", &[1]).await;
        let dir = harness.results_root().join(&done.execution_id);
        assert!(dir.is_dir());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = harness.orchestrator.purge(Some(0)).await.unwrap();
        assert_eq!(report.directories, 1);
        assert!(report.bytes > 0);
        assert!(!dir.exists());

        harness.orchestrator.shutdown().await.unwrap();
    }

    // Scenario: the engine shuts down while an execution is still running.
    // Expected Outcome: the interrupted execution ends up FAILED.
    #[traced_test]
    #[tokio::test]
    async fn shutdown_fails_interrupted_executions() {
        let executor = ScriptedExecutor::new().script("slow", Script::Slow(Duration::from_secs(30), 1));
        let harness = Harness::start_with(
            vec![cluster(1, "east", true, &["slow"])],
            executor,
            |builder| builder.shutdown_grace(Duration::from_millis(100)),
        );

        let pending = harness.orchestrator.submit(request("SELECT 1", &[1])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = harness.orchestrator.shutdown().await.unwrap();
        assert!(!report.drained);

        let view = harness
            .orchestrator
            .status(&ExecutionId::from(pending.execution_id.as_str()))
            .await
            .unwrap();
        assert_eq!(view.status, ExecutionStatus::Failed);
        assert_eq!(view.error_message.as_deref(), Some("interrupted by shutdown"));
    }
}
