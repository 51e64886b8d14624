//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::config::PipelineConfig;
    use crate::context::{PipelineContext, RunIdentity};
    use crate::core::{ArtifactKind, RunStatus, StageOutput, StageStatus};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{pipeline_context, standard_pipeline, Pipeline, PipelineBuilder, StageSpec};
    use crate::errors::Result;
    use crate::process::{CommandOutput, CommandRunner, LocalCommandRunner, ShellCommand};
    use crate::scopes::ExecutionScope;
    use crate::stages::Stage;
    use crate::testing::{
        assert_run_order, ExecutionLog, FailingStage, PanickingStage, RecordingScope,
        RecordingStage, ScriptedCommandRunner, SlowStage,
    };
    use pretty_assertions::assert_eq;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context() -> Arc<PipelineContext> {
        Arc::new(PipelineContext::new(
            RunIdentity::new("it"),
            "/ws",
            Arc::new(ScriptedCommandRunner::new()),
        ))
    }

    fn pipeline(stages: Vec<Arc<dyn Stage>>, cleanup: Arc<dyn Stage>) -> Pipeline {
        let mut builder = PipelineBuilder::new("it");
        for stage in stages {
            builder.add_stage_spec(StageSpec::from_stage(stage)).unwrap();
        }
        builder
            .cleanup(StageSpec::from_stage(cleanup))
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_failure_skips_rest_and_runs_cleanup() {
        let log: ExecutionLog = Arc::default();
        let cleanup = Arc::new(RecordingStage::ok("Z", log.clone()));
        let pipeline = pipeline(
            vec![
                Arc::new(RecordingStage::ok("A", log.clone())),
                Arc::new(RecordingStage::failing("B", log.clone(), "exit code 2")),
                Arc::new(RecordingStage::ok("C", log.clone())),
            ],
            cleanup.clone(),
        );

        let result = pipeline.run(context()).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_run_order(&result, &["A", "B", "Z"]);
        assert_eq!(*log.lock(), vec!["A", "B", "Z"]);
        assert_eq!(cleanup.call_count(), 1);

        let failure = result.first_failure.as_ref().unwrap();
        assert_eq!(failure.stage, "B");
        assert_eq!(failure.error, "exit code 2");
        assert_eq!(result.stage("C").unwrap().status(), StageStatus::Skip);
        assert_eq!(
            result.stage("C").unwrap().output.skip_reason.as_deref(),
            Some("stage 'B' failed")
        );
    }

    #[tokio::test]
    async fn test_all_ok_runs_every_stage_then_cleanup() {
        let log: ExecutionLog = Arc::default();
        let cleanup = Arc::new(RecordingStage::ok("Z", log.clone()));
        let pipeline = pipeline(
            vec![
                Arc::new(RecordingStage::ok("A", log.clone())),
                Arc::new(RecordingStage::ok("B", log.clone())),
                Arc::new(RecordingStage::ok("C", log.clone())),
            ],
            cleanup.clone(),
        );

        let result = pipeline.run(context()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_run_order(&result, &["A", "B", "C", "Z"]);
        assert!(result.first_failure.is_none());
        assert_eq!(cleanup.call_count(), 1);
    }

    #[tokio::test]
    async fn test_abort_during_stage() {
        let log: ExecutionLog = Arc::default();
        let cleanup = Arc::new(RecordingStage::ok("Z", log.clone()));
        let pipeline = pipeline(
            vec![
                Arc::new(RecordingStage::ok("A", log.clone())),
                Arc::new(SlowStage::new("B", Duration::from_secs(30)).recording(log.clone())),
                Arc::new(RecordingStage::ok("C", log.clone())),
            ],
            cleanup.clone(),
        );

        let cancel = Arc::new(CancellationToken::new());
        let ctx = Arc::new(
            PipelineContext::new(
                RunIdentity::new("it"),
                "/ws",
                Arc::new(ScriptedCommandRunner::new()),
            )
            .with_cancellation(cancel.clone()),
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel("SIGTERM");
        });

        let result = tokio::time::timeout(Duration::from_secs(5), pipeline.run(ctx))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Aborted);
        assert_run_order(&result, &["A", "B", "Z"]);
        assert_eq!(result.abort_reason.as_deref(), Some("SIGTERM"));
        assert_eq!(result.stage("B").unwrap().status(), StageStatus::Cancel);
        assert_eq!(result.stage("C").unwrap().status(), StageStatus::Skip);
        assert_eq!(cleanup.call_count(), 1);
        assert_eq!(result.status.exit_code(), 130);
    }

    #[tokio::test]
    async fn test_abort_before_first_stage_still_cleans_up() {
        let log: ExecutionLog = Arc::default();
        let ctx = context();
        ctx.cancellation().cancel("SIGINT");

        let result = pipeline(
            vec![Arc::new(RecordingStage::ok("A", log.clone()))],
            Arc::new(RecordingStage::ok("Z", log.clone())),
        )
        .run(ctx)
        .await;

        assert_eq!(result.status, RunStatus::Aborted);
        assert_run_order(&result, &["Z"]);
        assert_eq!(*log.lock(), vec!["Z"]);
    }

    #[tokio::test]
    async fn test_failing_stage_releases_scopes_in_reverse() {
        let scope_log: ExecutionLog = Arc::default();
        let scopes: Vec<Arc<dyn ExecutionScope>> = vec![
            Arc::new(RecordingScope::new("node(linux)", scope_log.clone())),
            Arc::new(RecordingScope::new("isolation(build)", scope_log.clone())),
            Arc::new(RecordingScope::new("allocation(ci)", scope_log.clone())),
        ];
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Arc::new(
            PipelineContext::new(
                RunIdentity::new("it"),
                "/ws",
                Arc::new(ScriptedCommandRunner::new()),
            )
            .with_event_sink(sink.clone()),
        );

        let result = PipelineBuilder::new("it")
            .stage_spec(
                StageSpec::from_stage(Arc::new(FailingStage::new("Build", "compiler crashed")))
                    .with_scopes(scopes),
            )
            .unwrap()
            .cleanup(StageSpec::from_stage(Arc::new(RecordingStage::ok(
                "Z",
                Arc::default(),
            ))))
            .unwrap()
            .build()
            .unwrap()
            .run(ctx)
            .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            *scope_log.lock(),
            vec![
                "acquire node(linux)",
                "acquire isolation(build)",
                "acquire allocation(ci)",
                "release allocation(ci)",
                "release isolation(build)",
                "release node(linux)",
            ]
        );
        assert_eq!(
            result.stage("Build").unwrap().scopes,
            vec!["node(linux)", "isolation(build)", "allocation(ci)"]
        );
        assert_eq!(sink.events_of_type("scope.released").len(), 3);
    }

    #[tokio::test]
    async fn test_scope_acquire_failure_fails_stage() {
        let scope_log: ExecutionLog = Arc::default();
        let stage_log: ExecutionLog = Arc::default();
        let scopes: Vec<Arc<dyn ExecutionScope>> = vec![
            Arc::new(RecordingScope::new("node(linux)", scope_log.clone())),
            Arc::new(RecordingScope::failing_acquire("allocation(ci)", scope_log.clone())),
        ];

        let result = PipelineBuilder::new("it")
            .stage_spec(
                StageSpec::from_stage(Arc::new(RecordingStage::ok("Test", stage_log.clone())))
                    .with_scopes(scopes),
            )
            .unwrap()
            .cleanup(StageSpec::from_stage(Arc::new(RecordingStage::ok(
                "Z",
                stage_log.clone(),
            ))))
            .unwrap()
            .build()
            .unwrap()
            .run(context())
            .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(*stage_log.lock(), vec!["Z"]);
        assert_eq!(
            *scope_log.lock(),
            vec!["acquire node(linux)", "acquire allocation(ci)", "release node(linux)"]
        );
        let failure = result.first_failure.unwrap();
        assert_eq!(failure.stage, "Test");
        assert_eq!(failure.kind.as_deref(), Some("scope"));
    }

    #[tokio::test]
    async fn test_release_failure_fails_successful_stage() {
        let scope_log: ExecutionLog = Arc::default();
        let result = PipelineBuilder::new("it")
            .stage_spec(
                StageSpec::from_stage(Arc::new(RecordingStage::ok("Build", Arc::default())))
                    .with_scope(Arc::new(RecordingScope::new("node(linux)", scope_log.clone())))
                    .with_scope(Arc::new(RecordingScope::failing_release(
                        "allocation(ci)",
                        scope_log.clone(),
                    ))),
            )
            .unwrap()
            .cleanup(StageSpec::from_stage(Arc::new(RecordingStage::ok(
                "Z",
                Arc::default(),
            ))))
            .unwrap()
            .build()
            .unwrap()
            .run(context())
            .await;

        let build = result.stage("Build").unwrap();
        assert_eq!(build.status(), StageStatus::Fail);
        assert_eq!(build.release_failures.len(), 1);
        assert_eq!(build.release_failures[0].0, "allocation(ci)");
        assert!(scope_log.lock().contains(&"release node(linux)".to_string()));
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_panicking_stage_is_a_failure() {
        let log: ExecutionLog = Arc::default();
        let cleanup = Arc::new(RecordingStage::ok("Z", log.clone()));
        let result = pipeline(
            vec![
                Arc::new(PanickingStage::new("A")),
                Arc::new(RecordingStage::ok("B", log.clone())),
            ],
            cleanup.clone(),
        )
        .run(context())
        .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_run_order(&result, &["A", "Z"]);
        assert!(result
            .first_failure
            .unwrap()
            .error
            .contains("stage A exploded"));
        assert_eq!(cleanup.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_fails_successful_run() {
        let log: ExecutionLog = Arc::default();
        let result = pipeline(
            vec![Arc::new(RecordingStage::ok("A", log.clone()))],
            Arc::new(RecordingStage::failing("Z", log.clone(), "workspace busy")),
        )
        .run(context())
        .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_run_order(&result, &["A", "Z"]);
        assert_eq!(result.first_failure.unwrap().stage, "Z");
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_first_failure() {
        let log: ExecutionLog = Arc::default();
        let result = pipeline(
            vec![
                Arc::new(RecordingStage::failing("A", log.clone(), "lint gate")),
                Arc::new(RecordingStage::ok("B", log.clone())),
            ],
            Arc::new(RecordingStage::failing("Z", log.clone(), "workspace busy")),
        )
        .run(context())
        .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.first_failure.unwrap().stage, "A");
        assert_eq!(result.cleanup.status(), StageStatus::Fail);
    }

    #[tokio::test]
    async fn test_stage_skip_does_not_halt() {
        let log: ExecutionLog = Arc::default();
        let result = pipeline(
            vec![
                Arc::new(RecordingStage::with_output(
                    "Checkout",
                    log.clone(),
                    StageOutput::skip("no downstream project"),
                )),
                Arc::new(RecordingStage::ok("Build", log.clone())),
            ],
            Arc::new(RecordingStage::ok("Cleanup", log.clone())),
        )
        .run(context())
        .await;

        assert_eq!(result.status, RunStatus::Success);
        assert_run_order(&result, &["Checkout", "Build", "Cleanup"]);
    }

    fn write(path: &std::path::Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn copy_tree(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_tree(&entry.path(), &target)?;
            } else {
                std::fs::copy(entry.path(), target)?;
            }
        }
        Ok(())
    }

    /// Serves `git` from a local source tree and runs every other command for real.
    struct LocalCloneRunner {
        tree: PathBuf,
        inner: LocalCommandRunner,
    }

    #[async_trait]
    impl CommandRunner for LocalCloneRunner {
        async fn run(&self, command: &ShellCommand, cancel: &CancellationToken) -> Result<CommandOutput> {
            if command.program != "git" {
                return self.inner.run(command, cancel).await;
            }
            if command.args.first().map(String::as_str) == Some("clone") {
                let dest = command.cwd.clone().unwrap_or_default();
                copy_tree(&self.tree, &dest)?;
            }
            Ok(CommandOutput::exited(0))
        }
    }

    fn local_runner(root: &std::path::Path) -> Arc<LocalCloneRunner> {
        Arc::new(LocalCloneRunner {
            tree: root.join("source"),
            inner: LocalCommandRunner::new(),
        })
    }

    /// Standard pipeline with real processes. The scripts sit at their default
    /// workspace-relative paths in a source tree that checkout materializes.
    fn local_config(root: &std::path::Path, test_body: &str) -> PipelineConfig {
        let tree = root.join("source");
        write(
            &tree.join("ci/build.sh"),
            "echo 'third_party/zlib.c:10:5: warning: unused variable [-Wunused-variable]'\n\
             echo built\n",
        );
        write(&tree.join("ci/checkout_downstream.sh"), "mkdir -p downstream\n");
        write(&tree.join("ci/build_downstream.sh"), "test -d downstream\n");
        write(&tree.join("ci/test.sh"), test_body);

        let mut config = PipelineConfig::default()
            .with_workspace(root.join("ws"))
            .with_artifacts_dir(root.join("artifacts"))
            .with_repository(tree.to_string_lossy())
            .with_revision("main")
            .with_job_name("it");
        config.shell_debug = false;
        config.node.host_labels = Some(vec!["linux".to_string()]);
        config.lint.command = vec!["sh".to_string(), "-c".to_string(), "true".to_string()];
        config.build.scopes = Vec::new();
        config.downstream.scopes = Vec::new();
        config.test.scopes = Vec::new();
        config
    }

    const PASSING_TESTS: &str = r#"mkdir -p test-results test-images/plots
cat > test-results/unit.xml <<'EOF'
<testsuite name="unit" tests="2"><testcase classname="t" name="a"/><testcase classname="t" name="b"/></testsuite>
EOF
printf 'png' > test-images/plots/loss.png
"#;

    const FAILING_TESTS: &str = r#"mkdir -p test-results
cat > test-results/unit.xml <<'EOF'
<testsuite name="unit" tests="2"><testcase classname="t" name="a"/><testcase classname="t" name="b"><failure message="boom"/></testcase></testsuite>
EOF
"#;

    #[tokio::test]
    async fn test_standard_pipeline_end_to_end() {
        let root = TempDir::new().unwrap();
        let config = local_config(root.path(), PASSING_TESTS);
        std::fs::create_dir_all(root.path().join("ws/stale")).unwrap();

        let pipeline = standard_pipeline(&config).unwrap();
        let ctx = pipeline_context(&config, local_runner(root.path()), Arc::new(CancellationToken::new()));
        let result = pipeline.run(Arc::new(ctx)).await;

        assert_eq!(result.status, RunStatus::Success, "{:?}", result.first_failure);
        assert_run_order(
            &result,
            &[
                "Reset workspace",
                "Checkout",
                "Lint",
                "Build",
                "Log analysis",
                "Downstream build",
                "Test",
                "Cleanup",
            ],
        );
        assert_eq!(result.stage("Checkout").unwrap().status(), StageStatus::Ok);
        assert_eq!(
            result.stage("Log analysis").unwrap().output.get("excluded_warnings"),
            Some(&serde_json::json!(1))
        );
        assert_eq!(
            result.stage("Test").unwrap().output.get("passed"),
            Some(&serde_json::json!(2))
        );

        let archived: Vec<ArtifactKind> = result
            .stage("Test")
            .unwrap()
            .output
            .artifacts
            .iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(archived, vec![ArtifactKind::Image, ArtifactKind::TestReport]);
        assert!(root.path().join("artifacts/test-images/plots/loss.png").exists());
        assert!(root.path().join("artifacts/build.log").exists());

        let leftovers: Vec<_> = std::fs::read_dir(root.path().join("ws")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_standard_pipeline_halts_on_test_failures() {
        let root = TempDir::new().unwrap();
        let config = local_config(root.path(), FAILING_TESTS);

        let ctx = pipeline_context(&config, local_runner(root.path()), Arc::new(CancellationToken::new()));
        let result = standard_pipeline(&config).unwrap().run(Arc::new(ctx)).await;

        assert_eq!(result.status, RunStatus::Failed);
        let failure = result.first_failure.unwrap();
        assert_eq!(failure.stage, "Test");
        assert_eq!(failure.kind.as_deref(), Some("test_failures"));
        assert_eq!(result.cleanup.status(), StageStatus::Ok);
        assert!(root.path().join("artifacts/test-results/unit.xml").exists());
    }
}
