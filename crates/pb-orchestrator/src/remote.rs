//! Two-phase remote execution: deliver a script, then run it
//!
//! Delivery stages the script (plus an optional binary payload) in a local
//! temporary file and copies it to the host, retrying launch failures that
//! look transient. Execution runs the script over the remote shell and
//! either follows its output line by line (streaming) or sends both output
//! streams straight to the log file (batch).

use crate::process::{is_transient_launch_error, terminate};
use crate::state::HostStatus;
use crate::transport::Transport;
use futures::stream::{self, StreamExt};
use futures::SinkExt;
use pb_core::config::TransportConfig;
use pb_script::{LineKind, LogLineCodec, ScriptDocument};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Appended to the log when a build is stopped for clock skew
pub const CLOCK_SKEW_ANNOTATION: &str =
    "FATAL: clock skew detected; the build was terminated because its results cannot be trusted";

/// How often and how patiently a copy command is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Attempts before the final one
    pub attempts: u32,
    /// Pause between attempts
    pub spacing: Duration,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            attempts: 60,
            spacing: Duration::from_secs(1),
        }
    }
}

impl From<&TransportConfig> for LaunchPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self {
            attempts: config.launch_attempts,
            spacing: config.launch_spacing,
        }
    }
}

/// Result of copying a script to a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// Copy program ran and reported failure
    CopyFailed { exit_code: Option<i32> },
    /// Copy program could not be started
    LaunchFailed { attempts: u32, error: String },
    /// Script could not be written locally
    StagingFailed { error: String },
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }

    /// One-line description for logs and error files
    pub fn describe(&self) -> String {
        match self {
            DeliveryResult::Delivered => "delivered".to_string(),
            DeliveryResult::CopyFailed { exit_code: Some(code) } => {
                format!("copy exited with status {}", code)
            }
            DeliveryResult::CopyFailed { exit_code: None } => {
                "copy terminated by signal".to_string()
            }
            DeliveryResult::LaunchFailed { attempts, error } => {
                format!("copy could not be launched after {} attempts: {}", attempts, error)
            }
            DeliveryResult::StagingFailed { error } => {
                format!("script could not be staged locally: {}", error)
            }
        }
    }
}

/// Result of running a delivered script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Remote shell exited with this status
    Exited(i32),
    /// Remote shell was killed by a signal
    Signaled,
    /// Stopped after a clock skew warning
    ClockSkew,
    /// Stopped by cancellation
    Aborted,
    /// Remote shell could not be started
    LaunchFailed(String),
    /// Log file could not be opened
    LogFailed(String),
}

/// How remote output reaches the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Follow output line by line, tracking activity
    Streaming,
    /// Redirect output to the log without inspecting it
    Batch,
}

enum StreamEnd {
    Closed,
    ClockSkew,
    Cancelled,
}

/// Delivers scripts to hosts and runs them
#[derive(Clone)]
pub struct RemoteExecutor {
    transport: Arc<dyn Transport>,
    launch: LaunchPolicy,
}

impl RemoteExecutor {
    pub fn new(transport: Arc<dyn Transport>, launch: LaunchPolicy) -> Self {
        Self { transport, launch }
    }

    /// Copy `document` (followed by `payload`, if any) to `destination` on `address`
    pub async fn deliver(
        &self,
        address: &str,
        document: &ScriptDocument,
        payload: Option<&Path>,
        destination: &str,
    ) -> DeliveryResult {
        let staged = match stage(document, payload) {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Failed to stage script");
                return DeliveryResult::StagingFailed { error: e.to_string() };
            }
        };

        let mut command = self.transport.copy_command(staged.path(), address, destination);
        command.stdin(Stdio::null()).kill_on_drop(true);
        debug!(address, destination, "Copying script");

        match self.launch(&mut command).await {
            Ok(status) if status.success() => DeliveryResult::Delivered,
            Ok(status) => DeliveryResult::CopyFailed { exit_code: status.code() },
            Err((attempts, e)) => DeliveryResult::LaunchFailed {
                attempts,
                error: e.to_string(),
            },
        }
    }

    /// Start `command` and wait for it, retrying transient launch failures
    async fn launch(&self, command: &mut Command) -> Result<ExitStatus, (u32, io::Error)> {
        for attempt in 1..=self.launch.attempts {
            match command.spawn() {
                Ok(mut child) => return child.wait().await.map_err(|e| (attempt, e)),
                Err(e) if is_transient_launch_error(&e) => {
                    warn!(attempt, error = %e, "Copy launch failed, retrying");
                    tokio::time::sleep(self.launch.spacing).await;
                }
                Err(e) => return Err((attempt, e)),
            }
        }

        let attempts = self.launch.attempts + 1;
        let mut child = command.spawn().map_err(|e| (attempts, e))?;
        child.wait().await.map_err(|e| (attempts, e))
    }

    /// Run the delivered script, writing its output to `log_path`
    pub async fn execute(
        &self,
        address: &str,
        destination: &str,
        log_path: &Path,
        mode: OutputMode,
        status: &HostStatus,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        if cancel.is_cancelled() {
            return ExecutionResult::Aborted;
        }

        let mut command = self.transport.exec_command(address, destination);
        command.stdin(Stdio::null()).kill_on_drop(true);
        debug!(address, destination, ?mode, "Running script");

        match mode {
            OutputMode::Streaming => self.stream(command, log_path, status, cancel).await,
            OutputMode::Batch => self.batch(command, log_path, status, cancel).await,
        }
    }

    async fn stream(
        &self,
        mut command: Command,
        log_path: &Path,
        status: &HostStatus,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await
        {
            Ok(file) => file,
            Err(e) => return ExecutionResult::LogFailed(e.to_string()),
        };
        let mut log = FramedWrite::new(file, LogLineCodec::new());

        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return ExecutionResult::LaunchFailed(e.to_string()),
        };
        status.set_pid(child.id());

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child);
            let _ = child.wait().await;
            return ExecutionResult::LaunchFailed("output pipes unavailable".to_string());
        };
        let mut lines = stream::select(
            FramedRead::new(stdout, LogLineCodec::new()),
            FramedRead::new(stderr, LogLineCodec::new()),
        );

        let mut log_ok = true;
        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                next = lines.next() => match next {
                    Some(Ok(line)) => {
                        let kind = status.observe_line(&line);
                        if log_ok {
                            if let Err(e) = log.send(line).await {
                                error!(log = %log_path.display(), error = %e, "Failed to write log");
                                log_ok = false;
                            }
                        }
                        if kind == LineKind::ClockSkew {
                            break StreamEnd::ClockSkew;
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Failed to read remote output"),
                    None => break StreamEnd::Closed,
                }
            }
        };

        match end {
            StreamEnd::ClockSkew => {
                warn!(log = %log_path.display(), "Clock skew detected, terminating build");
                if let Err(e) = log.send(CLOCK_SKEW_ANNOTATION.to_string()).await {
                    error!(error = %e, "Failed to write log");
                }
                terminate(&mut child);
                reap(&mut child).await;
                ExecutionResult::ClockSkew
            }
            StreamEnd::Cancelled => {
                terminate(&mut child);
                reap(&mut child).await;
                ExecutionResult::Aborted
            }
            StreamEnd::Closed => finish(&mut child, cancel).await,
        }
    }

    async fn batch(
        &self,
        mut command: Command,
        log_path: &Path,
        status: &HostStatus,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let (stdout, stderr) = match open_log_pair(log_path) {
            Ok(pair) => pair,
            Err(e) => return ExecutionResult::LogFailed(e.to_string()),
        };
        command.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return ExecutionResult::LaunchFailed(e.to_string()),
        };
        status.set_pid(child.id());

        let waited = tokio::select! {
            _ = cancel.cancelled() => None,
            result = child.wait() => Some(result),
        };
        match waited {
            Some(result) => exit_result(result, cancel),
            None => {
                terminate(&mut child);
                reap(&mut child).await;
                ExecutionResult::Aborted
            }
        }
    }
}

/// Write the script and payload to a local temporary file
fn stage(document: &ScriptDocument, payload: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("pbuild-")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(document.render().as_bytes())?;
    if let Some(payload) = payload {
        let mut source = File::open(payload)?;
        io::copy(&mut source, &mut file)?;
    }
    file.flush()?;
    Ok(file)
}

fn open_log_pair(path: &Path) -> io::Result<(File, File)> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    let clone = file.try_clone()?;
    Ok((file, clone))
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap remote shell");
    }
}

async fn finish(child: &mut Child, cancel: &CancellationToken) -> ExecutionResult {
    let result = child.wait().await;
    exit_result(result, cancel)
}

fn exit_result(result: io::Result<ExitStatus>, cancel: &CancellationToken) -> ExecutionResult {
    if cancel.is_cancelled() {
        return ExecutionResult::Aborted;
    }
    match result {
        Ok(status) => match status.code() {
            Some(code) => ExecutionResult::Exited(code),
            None => ExecutionResult::Signaled,
        },
        Err(e) => ExecutionResult::LaunchFailed(e.to_string()),
    }
}
