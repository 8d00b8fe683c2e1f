//! Host reachability checks
//!
//! `pbuild check` confirms every configured host accepts a remote shell and
//! has its working directory. When all hosts pass, a marker file records the
//! time so later builds can warn if the configuration changed since.

use crate::transport::Transport;
use futures::future::join_all;
use pb_core::{HostTag, HostTarget};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// Marker file name in the home directory
pub const MARKER_FILE: &str = ".pbuild_init";

/// Outcome of probing one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub tag: HostTag,
    pub address: String,
    /// `None` on success, otherwise what went wrong
    pub error: Option<String>,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Probe every host concurrently; results keep the order of `hosts`
pub async fn check_hosts(transport: &dyn Transport, hosts: &[HostTarget]) -> Vec<CheckResult> {
    let probes = hosts.iter().map(|host| async move {
        let mut command = transport.probe_command(&host.address, &host.remote_path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        debug!(host = %host.tag, "Probing host");

        let error = match command.status().await {
            Ok(status) if status.success() => None,
            Ok(status) => Some(match status.code() {
                Some(code) => format!("remote shell exited with status {}", code),
                None => "remote shell killed by signal".to_string(),
            }),
            Err(e) => Some(format!("failed to start remote shell: {}", e)),
        };
        CheckResult {
            tag: host.tag.clone(),
            address: host.address.clone(),
            error,
        }
    });

    let results = join_all(probes).await;
    info!(
        hosts = results.len(),
        failed = results.iter().filter(|r| !r.is_ok()).count(),
        "Host check complete"
    );
    results
}

/// Default marker location (`~/.pbuild_init`)
pub fn marker_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(MARKER_FILE))
}

/// Create or refresh the marker
pub fn write_marker(path: &Path) -> io::Result<()> {
    std::fs::write(path, b"")
}

/// Remove a stale marker
pub fn clear_marker(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Whether the marker exists and is newer than `config`
pub fn marker_is_current(marker: &Path, config: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(marker), modified(config)) {
        (Some(marker), Some(config)) => config < marker,
        _ => false,
    }
}
