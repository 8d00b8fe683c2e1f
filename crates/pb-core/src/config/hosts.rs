//! Resolved configuration and host selection

use super::file::{ConfigFile, TransportConfig};
use super::settings::Settings;
use super::{expand_home, load_config};
use crate::error::ConfigError;
use crate::types::{HostTag, HostTarget};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Command-line values layered over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub select: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub logdir: Option<String>,
    pub logdir_prior: Option<String>,
    pub settings: Option<String>,
    /// Plain output requested; forces `NoProgress`
    pub nocurses: bool,
    pub test_attributes: Option<String>,
    pub test_list: Option<String>,
}

/// Configuration after defaults, file contents and overrides are merged
#[derive(Debug, Clone)]
pub struct Configuration {
    /// File the configuration was read from
    pub path: PathBuf,
    pub selector: Option<String>,
    pub settings: Settings,
    pub log_dir: PathBuf,
    pub log_prior_dir: Option<PathBuf>,
    pub exclude: Vec<String>,
    /// Extra configure qualifiers keyed by project name
    pub configure: BTreeMap<String, String>,
    pub transport: TransportConfig,
    /// One of `""`, `SLOW`, `-SLOW`
    pub test_attributes: String,
    pub test_list: String,
    /// Hosts kept by the selector, sorted by tag
    pub hosts: Vec<HostTarget>,
}

impl Configuration {
    /// Load and resolve the configuration file at `path`
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file: ConfigFile = load_config(path)?;
        Self::from_file(path, file, overrides)
    }

    /// Resolve an already parsed configuration file
    pub fn from_file(
        path: &Path,
        file: ConfigFile,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        if let Some(spec) = &file.settings {
            settings.apply("configuration file", spec)?;
        }
        if let Some(spec) = &overrides.settings {
            settings.apply("command line", spec)?;
        }
        if overrides.nocurses {
            settings.progress = false;
        }

        let test_attributes = match overrides.test_attributes.as_ref().or(file.test_attributes.as_ref()) {
            Some(attrs) => parse_test_attributes(attrs)?,
            None => String::new(),
        };
        let test_list = overrides
            .test_list
            .clone()
            .or(file.test_list)
            .unwrap_or_default();

        let log_dir = overrides
            .logdir
            .as_deref()
            .or(file.logdir.as_deref())
            .map(expand_home)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let log_prior_dir = overrides
            .logdir_prior
            .as_deref()
            .or(file.logdir_prior.as_deref())
            .filter(|dir| !dir.trim().is_empty())
            .map(expand_home);

        let exclude = match &overrides.exclude {
            Some(list) => list
                .iter()
                .flat_map(|entry| entry.split(|c: char| c == ',' || c.is_whitespace()))
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
            None => file.exclude,
        };

        let selector = overrides
            .select
            .clone()
            .or(file.select)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let hosts = select_hosts(file.hosts, selector.as_deref())?;

        Ok(Self {
            path: path.to_path_buf(),
            selector,
            settings,
            log_dir,
            log_prior_dir,
            exclude,
            configure: file.configure,
            transport: file.transport,
            test_attributes,
            test_list,
            hosts,
        })
    }

    /// Find a selected host by tag or address
    pub fn find_host(&self, spec: &str) -> Option<&HostTarget> {
        self.hosts
            .iter()
            .find(|host| host.tag.as_str() == spec)
            .or_else(|| self.hosts.iter().find(|host| host.matches(spec)))
    }

    /// The hosts taking part in a run.
    ///
    /// Explicit host specs (tags or addresses) win; otherwise every selected
    /// host minus the exclusion list. The result is sorted by tag.
    pub fn resolve_hosts(&self, explicit: &[String]) -> Result<Vec<HostTarget>, ConfigError> {
        let excluded: HashSet<&HostTag> = self
            .exclude
            .iter()
            .map(|spec| {
                self.find_host(spec)
                    .map(|host| &host.tag)
                    .ok_or_else(|| ConfigError::UnknownHost(spec.clone()))
            })
            .collect::<Result<_, _>>()?;

        let mut active: Vec<HostTarget> = if explicit.is_empty() {
            self.hosts
                .iter()
                .filter(|host| !excluded.contains(&host.tag))
                .cloned()
                .collect()
        } else {
            let mut seen = HashSet::new();
            let mut picked = Vec::new();
            for spec in explicit {
                let host = self
                    .find_host(spec)
                    .ok_or_else(|| ConfigError::UnknownHost(spec.clone()))?;
                if seen.insert(host.tag.clone()) {
                    picked.push(host.clone());
                }
            }
            picked
        };

        if active.is_empty() {
            return Err(ConfigError::NoHosts(self.selector.clone()));
        }
        active.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(active)
    }
}

fn parse_test_attributes(attrs: &str) -> Result<String, ConfigError> {
    let attrs = attrs.trim();
    match attrs.to_uppercase().as_str() {
        "" | "SLOW" | "-SLOW" => Ok(attrs.to_uppercase()),
        _ => Err(ConfigError::InvalidTestAttributes(attrs.to_string())),
    }
}

fn select_hosts(
    entries: Vec<super::file::HostEntry>,
    selector: Option<&str>,
) -> Result<Vec<HostTarget>, ConfigError> {
    let mut tags = HashSet::new();
    let mut addresses = HashSet::new();
    let mut hosts = Vec::new();

    for entry in entries {
        let keep = match (selector, entry.select.as_deref()) {
            (Some(wanted), Some(host_select)) => wanted.eq_ignore_ascii_case(host_select.trim()),
            (Some(_), None) => false,
            (None, _) => entry.select.is_none(),
        };
        if !keep {
            continue;
        }

        if entry.tag.trim().is_empty() || entry.address.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "host entry '{}' needs both a tag and an address",
                entry.tag
            )));
        }
        if entry.path.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "host '{}' has an empty path",
                entry.tag
            )));
        }
        if !tags.insert(entry.tag.to_lowercase()) {
            return Err(ConfigError::DuplicateTag(entry.tag));
        }
        if !addresses.insert(entry.address.to_lowercase()) {
            return Err(ConfigError::DuplicateAddress(entry.address));
        }

        hosts.push(HostTarget {
            tag: HostTag::new(entry.tag.trim()),
            address: entry.address.trim().to_string(),
            remote_path: entry.path.trim().to_string(),
            project: entry.project,
            selector: entry.select,
        });
    }

    if hosts.is_empty() {
        return Err(ConfigError::NoHosts(selector.map(str::to_string)));
    }
    hosts.sort_by(|a, b| a.tag.cmp(&b.tag));
    Ok(hosts)
}
