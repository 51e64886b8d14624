//! Runs commands as local child processes.

use super::{CommandOutput, CommandRunner, ShellCommand, TailBuffer};
use crate::cancellation::CancellationToken;
use crate::errors::{Result, StagerunError};
use crate::observability::SpanTimer;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for pipe readers after a child has been killed.
/// Grandchildren may hold the pipes open.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct OutputLine {
    stream: Stream,
    text: String,
}

#[derive(Debug, Default)]
struct Collected {
    stdout: TailBuffer,
    stderr: TailBuffer,
    log_error: Option<std::io::Error>,
}

enum ExitReason {
    Completed(std::io::Result<std::process::ExitStatus>),
    Timeout(Duration),
    Cancelled,
}

/// Spawns commands with `tokio::process`.
///
/// stdout and stderr are drained by two reader tasks into a single consumer
/// that appends every line to the command's log file and keeps the tail of
/// each stream in memory.
#[derive(Debug, Clone, Default)]
pub struct LocalCommandRunner;

impl LocalCommandRunner {
    /// Creates a new local runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for LocalCommandRunner {
    async fn run(&self, command: &ShellCommand, cancel: &CancellationToken) -> Result<CommandOutput> {
        if let Some(reason) = cancel.reason() {
            return Err(StagerunError::Cancelled(reason));
        }

        let rendered = command.display();
        info!(command = %rendered, cwd = ?command.cwd, "Running command");
        let timer = SpanTimer::start(rendered.clone());

        let log_file = match &command.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Some(tokio::fs::File::create(path).await?)
            }
            None => None,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            warn!(command = %rendered, error = %e, "Failed to spawn command");
            e
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout pipe not available"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr pipe not available"))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut readers = [
            spawn_reader(stdout, Stream::Stdout, tx.clone()),
            spawn_reader(stderr, Stream::Stderr, tx),
        ];
        let consumer = spawn_log_consumer(rx, log_file);

        let deadline = async {
            match command.timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let exit = tokio::select! {
            status = child.wait() => ExitReason::Completed(status),
            limit = deadline => ExitReason::Timeout(limit),
            () = cancel.cancelled() => ExitReason::Cancelled,
        };

        if !matches!(exit, ExitReason::Completed(_)) {
            if let Err(e) = child.kill().await {
                warn!(command = %rendered, error = %e, "Failed to kill command");
            }
        }

        for reader in &mut readers {
            if tokio::time::timeout(DRAIN_GRACE, &mut *reader).await.is_err() {
                debug!(command = %rendered, "Output pipe still open after exit, detaching");
                reader.abort();
            }
        }
        let collected = consumer.await.unwrap_or_default();
        if let Some(e) = &collected.log_error {
            warn!(command = %rendered, error = %e, "Failed to write command log");
        }

        let duration_ms = timer.finish();
        match exit {
            ExitReason::Completed(status) => {
                let status = status?;
                let truncated = collected.stdout.is_truncated() || collected.stderr.is_truncated();
                let output = CommandOutput {
                    exit_code: status.code(),
                    stdout: collected.stdout.into_string(),
                    stderr: collected.stderr.into_string(),
                    duration_ms,
                    truncated,
                };
                info!(
                    command = %rendered,
                    exit_code = output.code(),
                    duration_ms,
                    "Command finished"
                );
                Ok(output)
            }
            ExitReason::Timeout(limit) => {
                warn!(command = %rendered, timeout_secs = limit.as_secs(), "Command timed out");
                Err(StagerunError::CommandTimeout {
                    command: rendered,
                    timeout_secs: limit.as_secs(),
                })
            }
            ExitReason::Cancelled => {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                info!(command = %rendered, %reason, "Command cancelled");
                Err(StagerunError::Cancelled(reason))
            }
        }
    }
}

fn spawn_reader<R>(pipe: R, stream: Stream, tx: mpsc::Sender<OutputLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(OutputLine { stream, text }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(?stream, error = %e, "Error reading command output");
                    break;
                }
            }
        }
    })
}

fn spawn_log_consumer(
    mut rx: mpsc::Receiver<OutputLine>,
    mut log_file: Option<tokio::fs::File>,
) -> JoinHandle<Collected> {
    tokio::spawn(async move {
        let mut collected = Collected::default();

        while let Some(line) = rx.recv().await {
            if let Some(file) = log_file.as_mut() {
                if let Err(e) = file.write_all(line.text.as_bytes()).await {
                    collected.log_error = Some(e);
                    log_file = None;
                }
            }
            match line.stream {
                Stream::Stdout => collected.stdout.push(&line.text),
                Stream::Stderr => collected.stderr.push(&line.text),
            }
        }

        if let Some(mut file) = log_file {
            if let Err(e) = file.flush().await {
                collected.log_error = Some(e);
            }
        }
        collected
    })
}
