//! `stagerun` binary: runs the standard CI pipeline in a workspace.

mod args;

use anyhow::{Context, Result};
use args::{Args, LogFormat};
use clap::Parser;
use stagerun::analysis::WarningBaseline;
use stagerun::cancellation::CancellationToken;
use stagerun::config::PipelineConfig;
use stagerun::events::LoggingEventSink;
use stagerun::pipeline::{pipeline_context, standard_pipeline, RunResult};
use stagerun::process::LocalCommandRunner;
use stagerun::stages::LINT_SUMMARY_FILE;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for configuration errors.
const CONFIG_ERROR: u8 = 2;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Layers the JSON override file and command-line flags over the inline defaults.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(workspace) = &args.workspace {
        config = config.with_workspace(workspace);
    }
    if let Some(dir) = &args.artifacts_dir {
        config = config.with_artifacts_dir(dir);
    }
    if let Some(repository) = &args.repository {
        config = config.with_repository(repository);
    }
    if let Some(revision) = &args.revision {
        config = config.with_revision(revision);
    }
    if let Some(job_name) = &args.job_name {
        config = config.with_job_name(job_name);
    }
    if let Some(number) = &args.build_number {
        config = config.with_build_number(number);
    }

    // `<workspace>@artifacts` must land next to the workspace, not inside it.
    std::fs::create_dir_all(&config.workspace)
        .with_context(|| format!("creating workspace {}", config.workspace.display()))?;
    let workspace = config
        .workspace
        .canonicalize()
        .with_context(|| format!("resolving workspace {}", config.workspace.display()))?;
    config = config.with_workspace(workspace);

    config.validate()?;
    Ok(config)
}

/// The run's cancellation token, logging the abort when it fires.
fn abort_token() -> Arc<CancellationToken> {
    let token = Arc::new(CancellationToken::new());
    token.on_cancel(|reason| warn!(signal = reason, "Abort requested, stopping pipeline"));
    token
}

/// Cancels `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: Arc<CancellationToken>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(err) => {
                    error!("failed to install SIGTERM handler: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let reason = tokio::select! {
            () = ctrl_c => "SIGINT",
            () = terminate => "SIGTERM",
        };
        token.cancel(reason);
    });
}

async fn finish(config: &PipelineConfig, args: &Args, result: &RunResult) -> Result<()> {
    if let Some(path) = &args.summary {
        result
            .write_summary(path)
            .await
            .with_context(|| format!("writing run summary {}", path.display()))?;
        info!(path = %path.display(), "Run summary written");
    }

    if args.update_baseline {
        if result.is_success() {
            let summary = config.resolved_artifacts_dir().join(LINT_SUMMARY_FILE);
            let baseline = WarningBaseline::from_summary(&summary)
                .with_context(|| format!("reading {}", summary.display()))?;
            baseline.save(&config.resolved_baseline_path())?;
        } else {
            warn!(status = %result.status, "Run did not succeed, baseline left unchanged");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {err:#}");
            return ExitCode::from(CONFIG_ERROR);
        }
    };
    let pipeline = match standard_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("Invalid pipeline: {err}");
            return ExitCode::from(CONFIG_ERROR);
        }
    };

    let cancel = abort_token();
    spawn_signal_handler(cancel.clone());

    let ctx = pipeline_context(&config, Arc::new(LocalCommandRunner::new()), cancel)
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    info!(
        workspace = %config.workspace.display(),
        artifacts = %config.resolved_artifacts_dir().display(),
        stages = ?pipeline.stage_names(),
        "Starting pipeline"
    );
    let result = pipeline.run(Arc::new(ctx)).await;

    if let Err(err) = finish(&config, &args, &result).await {
        error!("{err:#}");
        if result.is_success() {
            return ExitCode::FAILURE;
        }
    }

    // Exit codes are 0, 1 or 130.
    ExitCode::from(u8::try_from(result.status.exit_code()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["stagerun"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let root = TempDir::new().unwrap();
        let ws = root.path().join("job");
        let ws_str = ws.to_str().unwrap();

        let config = load_config(&args(&[
            "--workspace",
            ws_str,
            "--job-name",
            "nightly",
            "--repository",
            "https://example.org/repo.git",
        ]))
        .unwrap();

        let canonical = ws.canonicalize().unwrap();
        assert_eq!(config.workspace, canonical);
        assert_eq!(config.job_name, "nightly");
        assert_eq!(config.source.repository.as_deref(), Some("https://example.org/repo.git"));
        assert_eq!(
            config.resolved_artifacts_dir(),
            canonical.with_file_name("job@artifacts")
        );
    }

    #[test]
    fn test_config_file_is_layered_under_flags() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("stagerun.json");
        std::fs::write(&file, r#"{"job_name": "from-file", "lint": {"threshold": 3}}"#).unwrap();
        let ws = root.path().join("ws");

        let config = load_config(&args(&[
            "--config",
            file.to_str().unwrap(),
            "--workspace",
            ws.to_str().unwrap(),
            "--repository",
            "https://example.org/repo.git",
        ]))
        .unwrap();

        assert_eq!(config.job_name, "from-file");
        assert_eq!(config.lint.threshold, 3);
    }

    #[test]
    fn test_invalid_config_file_is_reported() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("stagerun.json");
        std::fs::write(&file, r#"{"log_analysis": {"parser": "msvc"}}"#).unwrap();
        let ws = root.path().join("ws");

        let err = load_config(&args(&[
            "--config",
            file.to_str().unwrap(),
            "--workspace",
            ws.to_str().unwrap(),
            "--repository",
            "https://example.org/repo.git",
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("log_analysis.parser"));
    }

    #[test]
    fn test_abort_token_keeps_first_signal() {
        let token = abort_token();
        token.cancel("SIGTERM");
        token.cancel("SIGINT");
        assert_eq!(token.reason().as_deref(), Some("SIGTERM"));
    }

    #[test]
    fn test_missing_repository_is_a_config_error() {
        let root = TempDir::new().unwrap();
        let ws = root.path().join("ws");

        let err = load_config(&args(&["--workspace", ws.to_str().unwrap()])).unwrap_err();
        assert!(format!("{err:#}").contains("source.repository"));
    }
}
