//! Remote shell transport
//!
//! A [`Transport`] builds the local commands that copy a script to a host,
//! run it there, and probe a host's working directory. The production
//! implementation shells out to `scp` and `ssh`.

use pb_core::config::TransportConfig;
use std::path::Path;
use tokio::process::Command;

/// Builds the commands used to reach remote hosts
pub trait Transport: Send + Sync {
    /// Copy `local` to `destination` on `address`
    fn copy_command(&self, local: &Path, address: &str, destination: &str) -> Command;

    /// Run the script at `destination` on `address`
    fn exec_command(&self, address: &str, destination: &str) -> Command;

    /// Check that `remote_path` exists on `address`
    fn probe_command(&self, address: &str, remote_path: &str) -> Command;
}

/// Remote invocation of a delivered script
pub fn remote_invocation(destination: &str) -> String {
    format!("chmod 755 {dest}; bash {dest}", dest = destination)
}

/// `scp` / `ssh` transport
#[derive(Debug, Clone)]
pub struct SshTransport {
    ssh: String,
    scp: String,
    options: Vec<String>,
    forward_agent: bool,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl SshTransport {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            ssh: config.ssh.clone(),
            scp: config.scp.clone(),
            options: config.options.clone(),
            forward_agent: config.forward_agent,
        }
    }

    fn ssh(&self) -> Command {
        let mut command = Command::new(&self.ssh);
        command.args(&self.options);
        command
    }
}

impl Transport for SshTransport {
    fn copy_command(&self, local: &Path, address: &str, destination: &str) -> Command {
        let mut command = Command::new(&self.scp);
        command
            .arg("-q")
            .args(&self.options)
            .arg(local)
            .arg(format!("{}:{}", address, destination));
        command
    }

    fn exec_command(&self, address: &str, destination: &str) -> Command {
        let mut command = self.ssh();
        if self.forward_agent {
            command.arg("-A");
        }
        command.arg(address).arg(remote_invocation(destination));
        command
    }

    fn probe_command(&self, address: &str, remote_path: &str) -> Command {
        let mut command = self.ssh();
        command.arg(address).arg(format!("cd {}", remote_path));
        command
    }
}
