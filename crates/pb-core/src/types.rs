//! Core domain types

use crate::error::OptionsError;
use crate::projects::ProjectKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Short unique name of a build host, used for display and log file names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostTag(String);

impl HostTag {
    /// Create a new host tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the raw tag string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One remote machine taking part in a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostTarget {
    pub tag: HostTag,
    /// Network address handed to ssh/scp
    pub address: String,
    /// Working directory on the remote host
    pub remote_path: String,
    pub project: ProjectKind,
    /// Selector the host was configured under, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl HostTarget {
    /// True when `spec` names this host by tag or by address
    pub fn matches(&self, spec: &str) -> bool {
        self.tag.as_str().eq_ignore_ascii_case(spec) || self.address.eq_ignore_ascii_case(spec)
    }
}

/// A `dir:branch` subproject checkout override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprojectBranch {
    pub directory: String,
    pub branch: String,
}

impl SubprojectBranch {
    /// Parse a comma separated list of `dir:branch` entries
    pub fn parse_list(list: &str) -> Result<Vec<Self>, OptionsError> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for SubprojectBranch {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || OptionsError::MalformedSubproject(s.to_string());
        let (directory, branch) = s.split_once(':').ok_or_else(malformed)?;
        let (directory, branch) = (directory.trim(), branch.trim());
        if directory.is_empty() || branch.is_empty() || branch.contains(':') {
            return Err(malformed());
        }
        Ok(Self {
            directory: directory.to_string(),
            branch: branch.to_string(),
        })
    }
}

impl fmt::Display for SubprojectBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.directory, self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_tag_ordering() {
        let mut tags = vec![HostTag::new("ubuntu"), HostTag::new("aix"), HostTag::new("rhel")];
        tags.sort();
        assert_eq!(tags[0].as_str(), "aix");
        assert_eq!(tags[2].to_string(), "ubuntu");
    }

    #[test]
    fn test_host_matches_tag_or_address() {
        let host = HostTarget {
            tag: HostTag::new("rhel7"),
            address: "build-rhel7.example.com".into(),
            remote_path: "~/dev/om".into(),
            project: ProjectKind::Om,
            selector: None,
        };
        assert!(host.matches("RHEL7"));
        assert!(host.matches("build-rhel7.example.com"));
        assert!(!host.matches("rhel6"));
    }

    #[test]
    fn test_parse_subproject_list() {
        let parsed = SubprojectBranch::parse_list("omi:feature/x, pal:dev").unwrap();
        assert_eq!(
            parsed,
            vec![
                SubprojectBranch { directory: "omi".into(), branch: "feature/x".into() },
                SubprojectBranch { directory: "pal".into(), branch: "dev".into() },
            ]
        );
    }

    #[test]
    fn test_parse_subproject_rejects_malformed() {
        assert_eq!(
            SubprojectBranch::parse_list("omi"),
            Err(OptionsError::MalformedSubproject("omi".into()))
        );
        assert!(SubprojectBranch::parse_list("omi:").is_err());
        assert!(SubprojectBranch::parse_list(":dev").is_err());
        assert!(SubprojectBranch::parse_list("a:b:c").is_err());
    }
}
