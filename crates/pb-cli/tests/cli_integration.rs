//! CLI integration tests
//!
//! Tests the pbuild CLI using assert_cmd. Builds run against stand-in
//! `ssh`/`scp` scripts, so no remote host is involved.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pbuild() -> Command {
    Command::cargo_bin("pbuild")
        .expect("Failed to locate pbuild binary - ensure it's built before running tests")
}

/// Scratch home directory with a config file and fake transport programs
struct Sandbox {
    home: TempDir,
}

impl Sandbox {
    fn new(ssh_body: &str) -> Self {
        let home = TempDir::new().unwrap();
        std::fs::create_dir(home.path().join("logs")).unwrap();
        let sandbox = Self { home };
        sandbox.script("fake-ssh", ssh_body);
        sandbox.script("fake-scp", "exit 0");

        let config = format!(
            r#"
logdir = '{logs}'

[transport]
ssh = '{ssh}'
scp = '{scp}'
launch_attempts = 1
launch_spacing = 0

[[hosts]]
tag = "aix"
address = "build-aix"
path = "/tmp"
project = "omi"

[[hosts]]
tag = "rhel7"
address = "build-rhel7"
path = "/tmp"
project = "omi"
"#,
            logs = sandbox.path("logs").display(),
            ssh = sandbox.path("fake-ssh").display(),
            scp = sandbox.path("fake-scp").display(),
        );
        std::fs::write(sandbox.config(), config).unwrap();
        sandbox
    }

    fn path(&self, name: &str) -> PathBuf {
        self.home.path().join(name)
    }

    fn config(&self) -> PathBuf {
        self.path("config.toml")
    }

    #[cfg(unix)]
    fn script(&self, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(not(unix))]
    fn script(&self, _name: &str, _body: &str) {}

    fn command(&self) -> Command {
        let mut command = pbuild();
        command
            .env("HOME", self.home.path())
            .env_remove("PBUILD")
            .arg("--config")
            .arg(self.config());
        command
    }
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[test]
fn test_cli_help() {
    pbuild()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pbuild"))
        .stdout(predicate::str::contains("Concurrent multi-host build orchestrator"));
}

#[test]
fn test_cli_version() {
    pbuild()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pbuild"));
}

#[test]
fn test_cli_build_help() {
    pbuild()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--abort-on-error"))
        .stdout(predicate::str::contains("--nocurses"));
}

#[test]
fn test_cli_missing_config() {
    pbuild()
        .env_remove("PBUILD")
        .args(["--config", "/nonexistent/pbuild.toml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_cli_list() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("build-aix"))
        .stdout(predicate::str::contains("rhel7"))
        .stdout(predicate::str::contains("Selector: None"))
        .stdout(predicate::str::contains("Settings: DeleteLogfiles"));
}

#[test]
fn test_cli_list_json() {
    let sandbox = Sandbox::new("exit 0");
    let output = sandbox.command().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let hosts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hosts = hosts.as_array().unwrap();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0]["tag"], "aix");
    assert_eq!(hosts[1]["address"], "build-rhel7");
}

#[test]
fn test_cli_config_from_environment() {
    let sandbox = Sandbox::new("exit 0");
    pbuild()
        .env("HOME", sandbox.home.path())
        .env("PBUILD", sandbox.config())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("build-aix"));
}

#[test]
fn test_cli_conflicting_debug_flags() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .args(["build", "--nocurses", "--debug", "--nodebug"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_cli_command_conflicts_with_branch() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .args(["build", "--nocurses", "--command", "uname -a", "--branch", "develop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--branch"));
}

#[test]
fn test_cli_unknown_host() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .args(["build", "--nocurses", "sles11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Host 'sles11' is not defined"));
}

#[cfg(unix)]
#[test]
fn test_cli_build_succeeds() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .args(["build", "--nocurses"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed host build-aix (aix)"))
        .stdout(predicate::str::contains("Completed host build-rhel7 (rhel7)"))
        .stdout(predicate::str::contains("Final status:"));

    assert!(exists(&sandbox.path("logs/aix.log")));
}

#[cfg(unix)]
#[test]
fn test_cli_build_exit_status_counts_failures() {
    let sandbox = Sandbox::new(r#"case "$1" in build-rhel7) exit 2;; esac; exit 0"#);
    sandbox
        .command()
        .args(["build", "--nocurses"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Completed host build-aix (aix)"))
        .stdout(predicate::str::contains("FAILED: Host build-rhel7 (rhel7)"));
}

#[cfg(unix)]
#[test]
fn test_cli_build_explicit_host() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .args(["build", "--nocurses", "--settings", "NoSummaryScreen", "rhel7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build-rhel7"))
        .stdout(predicate::str::contains("build-aix").not());
}

#[cfg(unix)]
#[test]
fn test_cli_check_writes_marker() {
    let sandbox = Sandbox::new("exit 0");
    sandbox
        .command()
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: build-aix (aix)"));
    assert!(exists(&sandbox.path(".pbuild_init")));
}

#[cfg(unix)]
#[test]
fn test_cli_check_reports_unreachable_host() {
    let sandbox = Sandbox::new(r#"case "$1" in build-aix) exit 255;; esac; exit 0"#);
    sandbox
        .command()
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("FAILED: build-aix (aix)"));
    assert!(!exists(&sandbox.path(".pbuild_init")));
}
