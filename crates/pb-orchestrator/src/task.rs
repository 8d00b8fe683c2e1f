//! One host's build
//!
//! A [`HostTask`] assembles its host's script, delivers it, runs it and
//! records the outcome in its [`HostStatus`]. The orchestrator keeps a
//! [`HostHandle`] to observe and abort the task.

use crate::process::terminate_pid;
use crate::remote::{ExecutionResult, OutputMode, RemoteExecutor};
use crate::state::{FailureReason, HostPhase, HostStatus};
use pb_core::{BuildOptions, HostTag, HostTarget, LogNaming, LogPhase, Project};
use pb_script::{assemble, ScriptContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the host tasks of one run share
pub struct BuildContext {
    pub options: BuildOptions,
    /// `[configure]` qualifiers keyed by project name
    pub configure: BTreeMap<String, String>,
    pub logs: LogNaming,
    pub executor: RemoteExecutor,
    pub output: OutputMode,
    /// Remote directory receiving scripts
    pub script_dir: String,
    /// Local user name, part of remote script names
    pub user: String,
    /// Invocation echoed at the top of every log
    pub command_line: String,
}

impl BuildContext {
    /// Remote path of the script for `tag`
    pub fn destination_for(&self, tag: &HostTag) -> String {
        format!(
            "{}/{}_{}_{}.sh",
            self.script_dir.trim_end_matches('/'),
            self.user,
            tag,
            std::process::id()
        )
    }
}

/// Observer/abort handle for a running host task
#[derive(Debug, Clone)]
pub struct HostHandle {
    target: HostTarget,
    status: Arc<HostStatus>,
    cancel: CancellationToken,
}

impl HostHandle {
    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn status(&self) -> &HostStatus {
        &self.status
    }

    /// Cancel the task. No-op once it is terminal.
    ///
    /// A pending task becomes `Aborted` at once; a running remote shell is
    /// sent SIGTERM.
    pub fn abort(&self) -> bool {
        if self.status.phase().is_terminal() {
            return false;
        }
        self.cancel.cancel();
        if self.status.abort_if_pending() {
            info!(host = %self.target.tag, "Aborted before start");
            return true;
        }
        if let Some(pid) = self.status.pid() {
            terminate_pid(pid);
        }
        info!(host = %self.target.tag, "Abort requested");
        true
    }
}

/// The build of one host
pub struct HostTask {
    target: HostTarget,
    context: Arc<BuildContext>,
    status: Arc<HostStatus>,
    cancel: CancellationToken,
}

impl HostTask {
    pub fn new(target: HostTarget, context: Arc<BuildContext>) -> Self {
        Self {
            target,
            context,
            status: Arc::new(HostStatus::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle {
            target: self.target.clone(),
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
        }
    }

    /// Deliver and run the host's script, returning the terminal phase
    pub async fn run(self) -> HostPhase {
        let tag = &self.target.tag;
        let address = &self.target.address;
        let context = &self.context;

        if !self.status.advance(HostPhase::Transferring) {
            return self.status.phase();
        }
        info!(host = %tag, address = %address, "Starting host");

        let project = self.target.project.template();
        let destination = context.destination_for(tag);
        let document = assemble(
            &self.target,
            &context.options,
            project,
            &ScriptContext {
                destination: &destination,
                command_line: &context.command_line,
                configured_qualifiers: context.configure.get(project.name()).map(String::as_str),
            },
        );

        if let Err(e) = context.logs.prepare(tag) {
            warn!(host = %tag, error = %e, "Failed to remove previous logs");
        }

        let delivery = context
            .executor
            .deliver(address, &document, context.options.container.as_deref(), &destination)
            .await;
        if !delivery.is_delivered() {
            let reason = delivery.describe();
            warn!(host = %tag, %reason, "Script transfer failed");
            self.record_transfer_failure(&reason);
            self.status.fail(HostPhase::TransferFailed, FailureReason::Transfer(reason));
            return HostPhase::TransferFailed;
        }

        self.status.advance(HostPhase::Executing);
        let log_path = context.logs.path(tag, LogPhase::Active);
        let result = context
            .executor
            .execute(address, &destination, &log_path, context.output, &self.status, &self.cancel)
            .await;

        let (phase, failure) = classify(result);
        if let Err(e) = context.logs.finish(tag, phase == HostPhase::Succeeded) {
            warn!(host = %tag, error = %e, "Failed to rename log");
        }
        match failure {
            Some(reason) => {
                info!(host = %tag, %reason, "Host failed");
                self.status.fail(phase, reason);
            }
            None => {
                info!(host = %tag, %phase, "Host finished");
                self.status.advance(phase);
            }
        }
        phase
    }

    fn record_transfer_failure(&self, reason: &str) {
        let path = self.context.logs.final_path(&self.target.tag, false);
        let line = format!(
            "ERROR: script transfer to host {} did not complete ({})\n",
            self.target.address, reason
        );
        if let Err(e) = std::fs::write(&path, line) {
            warn!(log = %path.display(), error = %e, "Failed to write transfer failure log");
        }
    }
}

fn classify(result: ExecutionResult) -> (HostPhase, Option<FailureReason>) {
    match result {
        ExecutionResult::Exited(0) => (HostPhase::Succeeded, None),
        ExecutionResult::Exited(code) => (HostPhase::Failed, Some(FailureReason::ExitCode(code))),
        ExecutionResult::Signaled => (HostPhase::Failed, Some(FailureReason::Signaled)),
        ExecutionResult::ClockSkew => (HostPhase::Failed, Some(FailureReason::ClockSkew)),
        ExecutionResult::Aborted => (HostPhase::Aborted, None),
        ExecutionResult::LaunchFailed(e) => (HostPhase::Failed, Some(FailureReason::Launch(e))),
        ExecutionResult::LogFailed(e) => (HostPhase::Failed, Some(FailureReason::Log(e))),
    }
}
