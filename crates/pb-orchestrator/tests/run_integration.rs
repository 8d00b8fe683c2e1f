//! Orchestrator integration tests
//!
//! Runs whole builds against a local transport: "copying" is a plain `cp`
//! into a temporary directory and "running" executes a per-host shell body.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;

use pb_core::{BuildOptions, HostTag, HostTarget, LogNaming, ProjectKind};
use pb_orchestrator::{
    check_hosts, BuildContext, FailureReason, HostPhase, HostTask, LaunchPolicy, Orchestrator,
    Outcome, OutputMode, RemoteExecutor, RunPolicy, RunReport, RunSnapshot, StatusSink, Transport,
};

/// Local stand-in for ssh/scp
#[derive(Default)]
struct ScriptedTransport {
    bodies: HashMap<String, String>,
    copy_failures: HashSet<String>,
    slow_copies: HashSet<String>,
}

impl ScriptedTransport {
    fn host(mut self, address: &str, body: &str) -> Self {
        self.bodies.insert(address.to_string(), body.to_string());
        self
    }

    fn failing_copy(mut self, address: &str) -> Self {
        self.copy_failures.insert(address.to_string());
        self
    }

    fn slow_copy(mut self, address: &str) -> Self {
        self.slow_copies.insert(address.to_string());
        self
    }

    fn shell(body: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(body);
        command
    }
}

impl Transport for ScriptedTransport {
    fn copy_command(&self, local: &Path, address: &str, destination: &str) -> Command {
        if self.copy_failures.contains(address) {
            return Self::shell("exit 3");
        }
        if self.slow_copies.contains(address) {
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg("sleep 0.5; cp \"$0\" \"$1\"")
                .arg(local)
                .arg(destination);
            return command;
        }
        let mut command = Command::new("cp");
        command.arg(local).arg(destination);
        command
    }

    fn exec_command(&self, address: &str, _destination: &str) -> Command {
        Self::shell(self.bodies.get(address).map(String::as_str).unwrap_or("exit 0"))
    }

    fn probe_command(&self, _address: &str, remote_path: &str) -> Command {
        Self::shell(&format!("test -d {}", remote_path))
    }
}

#[derive(Default)]
struct RecordingSink {
    started: usize,
    updates: usize,
    aborting: bool,
    last: Option<RunSnapshot>,
    finished: Option<RunReport>,
}

impl StatusSink for RecordingSink {
    fn started(&mut self, hosts: &[HostTarget]) {
        self.started = hosts.len();
    }

    fn update(&mut self, snapshot: &RunSnapshot) {
        self.updates += 1;
        self.last = Some(snapshot.clone());
    }

    fn aborting(&mut self, _snapshot: &RunSnapshot) {
        self.aborting = true;
    }

    fn finished(&mut self, report: &RunReport) {
        self.finished = Some(report.clone());
    }
}

struct Fixture {
    logs: TempDir,
    scripts: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            logs: TempDir::new().unwrap(),
            scripts: TempDir::new().unwrap(),
        }
    }

    fn context(&self, transport: ScriptedTransport, output: OutputMode) -> Arc<BuildContext> {
        let launch = LaunchPolicy {
            attempts: 2,
            spacing: Duration::from_millis(10),
        };
        Arc::new(BuildContext {
            options: BuildOptions::default(),
            configure: Default::default(),
            logs: LogNaming::new(self.logs.path()),
            executor: RemoteExecutor::new(Arc::new(transport), launch),
            output,
            script_dir: self.scripts.path().display().to_string(),
            user: "tester".to_string(),
            command_line: "pbuild build".to_string(),
        })
    }

    fn log(&self, tag: &str) -> String {
        std::fs::read_to_string(self.logs.path().join(format!("{}.log", tag))).unwrap()
    }
}

fn target(tag: &str) -> HostTarget {
    HostTarget {
        tag: HostTag::new(tag),
        address: format!("{}.example.com", tag),
        remote_path: "~/dev/omi".to_string(),
        project: ProjectKind::Omi,
        selector: None,
    }
}

fn policy(abort_on_error: bool) -> RunPolicy {
    RunPolicy {
        tick: Duration::from_millis(20),
        abort_on_error,
        idle_after: Duration::from_secs(30),
    }
}

async fn run(
    fixture: &Fixture,
    tags: &[&str],
    transport: ScriptedTransport,
    output: OutputMode,
    abort_on_error: bool,
) -> (RunReport, RecordingSink) {
    let context = fixture.context(transport, output);
    let targets = tags.iter().map(|tag| target(tag)).collect();
    let orchestrator = Orchestrator::new(targets, context, policy(abort_on_error));
    let mut sink = RecordingSink::default();
    let report = timeout(Duration::from_secs(20), orchestrator.run(&mut sink))
        .await
        .expect("run did not finish");
    (report, sink)
}

#[tokio::test]
async fn test_all_hosts_succeed() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default()
        .host("a.example.com", "echo '========================= Performing make all'; echo compiling; exit 0")
        .host("b.example.com", "echo hello; exit 0")
        .host("c.example.com", "exit 0");

    let (report, sink) = run(&fixture, &["c", "a", "b"], transport, OutputMode::Streaming, false).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.tally.succeeded, 3);
    assert!(!report.aborted);
    let tags: Vec<&str> = report.hosts.iter().map(|h| h.tag.as_str()).collect();
    assert_eq!(tags, vec!["a", "b", "c"]);

    assert_eq!(sink.started, 3);
    assert!(sink.updates >= 1);
    assert!(!sink.aborting);
    assert_eq!(sink.finished.unwrap().tally, report.tally);

    let last = sink.last.unwrap();
    assert_eq!(last.hosts[0].label, "make all");
    assert_eq!(last.hosts[0].lines, 1);

    assert!(fixture.log("a").contains("compiling"));
    assert_eq!(fixture.log("b"), "hello\n");
}

#[tokio::test]
async fn test_failure_without_abort_lets_others_finish() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default()
        .host("a.example.com", "exit 1")
        .host("b.example.com", "sleep 0.2; exit 0")
        .host("c.example.com", "sleep 0.2; exit 0");

    let (report, sink) = run(&fixture, &["a", "b", "c"], transport, OutputMode::Streaming, false).await;

    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.succeeded, 2);
    assert_eq!(report.tally.aborted, 0);
    assert_eq!(report.exit_code(), 1);
    assert!(!sink.aborting);
    assert_eq!(report.hosts[0].outcome, Outcome::Failed);
}

#[tokio::test]
async fn test_abort_on_error_stops_running_hosts() {
    let fixture = Fixture::new();
    let mut transport = ScriptedTransport::default().host("a.example.com", "exit 2");
    for tag in ["b", "c", "d", "e"] {
        transport = transport.host(&format!("{}.example.com", tag), "sleep 30");
    }

    let started = std::time::Instant::now();
    let (report, sink) =
        run(&fixture, &["a", "b", "c", "d", "e"], transport, OutputMode::Streaming, true).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.aborted);
    assert!(sink.aborting);
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.aborted, 4);
    assert_eq!(report.tally.total(), 5);
    assert_eq!(report.exit_code(), 1);
    for host in &report.hosts[1..] {
        assert_eq!(host.outcome, Outcome::Aborted);
    }
}

#[tokio::test]
async fn test_transfer_failure_skips_execution() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default()
        .host("a.example.com", "echo should-not-run")
        .failing_copy("a.example.com")
        .host("b.example.com", "exit 0");

    let (report, _) = run(&fixture, &["a", "b"], transport, OutputMode::Streaming, false).await;

    assert_eq!(report.tally.transfer_failed, 1);
    assert_eq!(report.tally.succeeded, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.hosts[0].outcome, Outcome::TransferFailed);

    let log = fixture.log("a");
    assert!(log.contains("a.example.com"));
    assert!(log.contains("copy exited with status 3"));
    assert!(!log.contains("should-not-run"));
}

#[tokio::test]
async fn test_delivered_script_reaches_destination() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default().host("a.example.com", "exit 0");

    let (report, _) = run(&fixture, &["a"], transport, OutputMode::Streaming, false).await;
    assert_eq!(report.tally.succeeded, 1);

    let scripts: Vec<_> = std::fs::read_dir(fixture.scripts.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(scripts.len(), 1);
    let name = scripts[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("tester_a_"));
    let script = std::fs::read_to_string(&scripts[0]).unwrap();
    assert!(script.contains("========================= Performing "));
    assert!(script.contains("exit $EXITSTATUS"));
}

#[tokio::test]
async fn test_clock_skew_fails_host() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default().host(
        "a.example.com",
        "echo 'make: Warning: Clock skew detected.  Your build may be incomplete.'; sleep 30",
    );

    let (report, _) = run(&fixture, &["a"], transport, OutputMode::Streaming, false).await;

    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.hosts[0].outcome, Outcome::Failed);
    let log = fixture.log("a");
    assert!(log.contains("Clock skew detected"));
    assert!(log.contains("FATAL: clock skew"));
}

#[tokio::test]
async fn test_batch_output_goes_to_log() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default()
        .host("a.example.com", "echo out; echo err >&2; exit 0")
        .host("b.example.com", "exit 4");

    let (report, _) = run(&fixture, &["a", "b"], transport, OutputMode::Batch, false).await;

    assert_eq!(report.tally.succeeded, 1);
    assert_eq!(report.tally.failed, 1);
    let log = fixture.log("a");
    assert!(log.contains("out"));
    assert!(log.contains("err"));
}

#[tokio::test]
async fn test_check_hosts_reports_missing_directory() {
    let dir = TempDir::new().unwrap();
    let mut present = target("a");
    present.remote_path = dir.path().display().to_string();
    let mut missing = target("b");
    missing.remote_path = dir.path().join("absent").display().to_string();

    let results = check_hosts(&ScriptedTransport::default(), &[present, missing]).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(!results[1].is_ok());
    assert_eq!(results[1].tag.as_str(), "b");
}

/// Sink that holds up the tick loop on every update
struct SlowSink {
    delay: Duration,
}

impl StatusSink for SlowSink {
    fn update(&mut self, _snapshot: &RunSnapshot) {
        std::thread::sleep(self.delay);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abort_keeps_failures_that_land_during_update() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default()
        .host("a.example.com", "exit 2")
        .host("b.example.com", "sleep 0.35; exit 3")
        .host("c.example.com", "sleep 30");
    let context = fixture.context(transport, OutputMode::Streaming);
    let targets = ["a", "b", "c"].iter().map(|tag| target(tag)).collect();
    let policy = RunPolicy {
        tick: Duration::from_millis(200),
        abort_on_error: true,
        idle_after: Duration::from_secs(30),
    };
    let mut sink = SlowSink {
        delay: Duration::from_millis(600),
    };

    let report = timeout(
        Duration::from_secs(20),
        Orchestrator::new(targets, context, policy).run(&mut sink),
    )
    .await
    .expect("run did not finish");

    assert!(report.aborted);
    assert_eq!(report.hosts[1].outcome, Outcome::Failed);
    assert_eq!(report.hosts[2].outcome, Outcome::Aborted);
    assert_eq!(report.tally.failed, 2);
    assert_eq!(report.tally.aborted, 1);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_abort_before_start() {
    let fixture = Fixture::new();
    let context = fixture.context(ScriptedTransport::default(), OutputMode::Streaming);
    let task = HostTask::new(target("a"), context);
    let handle = task.handle();

    assert!(handle.abort());
    assert_eq!(handle.status().phase(), HostPhase::Aborted);
    assert_eq!(task.run().await, HostPhase::Aborted);
    assert_eq!(fixture.scripts.path().read_dir().unwrap().count(), 0);
}

#[tokio::test]
async fn test_abort_after_finish_is_noop() {
    let fixture = Fixture::new();
    let transport = ScriptedTransport::default().host("a.example.com", "exit 2");
    let context = fixture.context(transport, OutputMode::Streaming);
    let task = HostTask::new(target("a"), context);
    let handle = task.handle();

    assert_eq!(task.run().await, HostPhase::Failed);
    assert!(!handle.abort());

    let snapshot = handle.status().snapshot();
    assert_eq!(snapshot.phase, HostPhase::Failed);
    assert_eq!(snapshot.failure, Some(FailureReason::ExitCode(2)));
}

#[tokio::test]
async fn test_abort_while_transferring_never_runs_script() {
    let fixture = Fixture::new();
    let ran = fixture.scripts.path().join("ran");
    let transport = ScriptedTransport::default()
        .host("a.example.com", &format!("touch {}", ran.display()))
        .slow_copy("a.example.com");
    let context = fixture.context(transport, OutputMode::Streaming);
    let task = HostTask::new(target("a"), context);
    let handle = task.handle();

    let worker = tokio::spawn(task.run());
    timeout(Duration::from_secs(5), async {
        while handle.status().phase() != HostPhase::Transferring {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("host never started transferring");

    assert!(handle.abort());
    let phase = timeout(Duration::from_secs(10), worker)
        .await
        .expect("host task did not finish")
        .unwrap();

    assert_eq!(phase, HostPhase::Aborted);
    assert_eq!(handle.status().phase(), HostPhase::Aborted);
    assert!(!ran.exists());
}
