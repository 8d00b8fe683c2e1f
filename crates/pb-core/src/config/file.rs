//! On-disk configuration file layout

use crate::projects::ProjectKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Contents of the pbuild TOML configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Directory receiving per-host log files (default: home directory)
    pub logdir: Option<String>,

    /// Directory receiving the previous run's log files
    pub logdir_prior: Option<String>,

    /// Default host selector
    pub select: Option<String>,

    /// Hosts skipped unless named explicitly
    pub exclude: Vec<String>,

    /// Settings string, e.g. `LogfileRename,NoDiagnoseErrors`
    pub settings: Option<String>,

    pub test_attributes: Option<String>,
    pub test_list: Option<String>,

    /// Extra configure qualifiers keyed by project name
    pub configure: BTreeMap<String, String>,

    pub transport: TransportConfig,

    pub hosts: Vec<HostEntry>,
}

/// One `[[hosts]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub tag: String,
    pub address: String,
    pub path: String,
    pub project: ProjectKind,
    #[serde(default)]
    pub select: Option<String>,
}

/// Remote shell programs and script delivery parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Remote shell program
    pub ssh: String,

    /// Remote copy program
    pub scp: String,

    /// Extra arguments passed to both programs (e.g. `["-o", "BatchMode=yes"]`)
    pub options: Vec<String>,

    /// Run the remote session with agent forwarding (`ssh -A`)
    pub forward_agent: bool,

    /// Remote directory receiving the generated scripts
    pub script_dir: String,

    /// Launch attempts for the copy command before the final try
    pub launch_attempts: u32,

    /// Pause between launch attempts
    #[serde(with = "secs_f64")]
    pub launch_spacing: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            scp: "scp".to_string(),
            options: Vec::new(),
            forward_agent: false,
            script_dir: "/tmp".to_string(),
            launch_attempts: 60,
            launch_spacing: Duration::from_secs(1),
        }
    }
}

/// Durations written as (possibly fractional) seconds
mod secs_f64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Secs {
            Whole(u64),
            Fraction(f64),
        }

        match Secs::deserialize(deserializer)? {
            Secs::Whole(secs) => Ok(Duration::from_secs(secs)),
            Secs::Fraction(secs) => Duration::try_from_secs_f64(secs).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let content = r#"
            logdir = "~/pbuild-logs"
            select = "main"
            exclude = ["sles11"]
            settings = "LogfileRename"

            [configure]
            omi = "--enable-microsoft"

            [transport]
            forward_agent = true
            launch_spacing = 0.25

            [[hosts]]
            tag = "rhel7"
            address = "build-rhel7"
            path = "~/dev/om"
            project = "OM"
            select = "main"
        "#;

        let file: ConfigFile = toml::from_str(content).unwrap();
        assert_eq!(file.logdir.as_deref(), Some("~/pbuild-logs"));
        assert_eq!(file.exclude, vec!["sles11".to_string()]);
        assert_eq!(file.configure["omi"], "--enable-microsoft");
        assert!(file.transport.forward_agent);
        assert_eq!(file.transport.ssh, "ssh");
        assert_eq!(file.transport.launch_attempts, 60);
        assert_eq!(file.transport.launch_spacing, Duration::from_millis(250));
        assert_eq!(file.hosts.len(), 1);
        assert_eq!(file.hosts[0].project, ProjectKind::Om);
    }

    #[test]
    fn test_whole_second_spacing() {
        let file: ConfigFile = toml::from_str("[transport]\nlaunch_spacing = 2\n").unwrap();
        assert_eq!(file.transport.launch_spacing, Duration::from_secs(2));
    }

    #[test]
    fn test_transport_serializes_spacing_as_seconds() {
        let json = serde_json::to_value(TransportConfig::default()).unwrap();
        assert_eq!(json["launch_spacing"], serde_json::json!(1.0));
    }

    #[test]
    fn test_rejects_unknown_project() {
        let content = r#"
            [[hosts]]
            tag = "x"
            address = "x"
            path = "/src"
            project = "nw"
        "#;
        assert!(toml::from_str::<ConfigFile>(content).is_err());
    }
}
