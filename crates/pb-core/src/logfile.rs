//! Per-host log file naming and rotation
//!
//! A host's log is written under its "active" name while the build runs and
//! is renamed to its final name afterwards when `LogfileRename` is enabled.

use crate::config::Configuration;
use crate::error::LogError;
use crate::types::HostTag;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File written and removed to prove a log directory is usable
const PROBE_FILE: &str = ".pbuild_logtest.log";

/// Stage of a host's log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPhase {
    Active,
    Done,
    Failed,
}

impl LogPhase {
    fn prefix(self) -> &'static str {
        match self {
            LogPhase::Active => "active-",
            LogPhase::Done => "done-",
            LogPhase::Failed => "failed-",
        }
    }
}

/// Computes and maintains log file paths for every host
#[derive(Debug, Clone)]
pub struct LogNaming {
    dir: PathBuf,
    prior_dir: Option<PathBuf>,
    rename: bool,
    delete_all: bool,
    suffix: String,
}

impl LogNaming {
    /// Plain naming in `dir`: no renames, no suffix
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prior_dir: None,
            rename: false,
            delete_all: false,
            suffix: String::new(),
        }
    }

    /// Naming as configured by the log directories and settings
    pub fn from_config(config: &Configuration) -> Self {
        let suffix = if config.settings.logfile_branch {
            format!("-{}", config.selector.as_deref().unwrap_or("None"))
        } else {
            String::new()
        };
        Self {
            dir: config.log_dir.clone(),
            prior_dir: config.log_prior_dir.clone(),
            rename: config.settings.logfile_rename,
            delete_all: config.settings.delete_logfiles,
            suffix,
        }
    }

    pub fn with_rename(mut self, rename: bool) -> Self {
        self.rename = rename;
        self
    }

    pub fn with_delete_all(mut self, delete_all: bool) -> Self {
        self.delete_all = delete_all;
        self
    }

    pub fn with_prior_dir(mut self, prior_dir: impl Into<PathBuf>) -> Self {
        self.prior_dir = Some(prior_dir.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log path for `tag` at `phase`
    pub fn path(&self, tag: &HostTag, phase: LogPhase) -> PathBuf {
        let prefix = if self.rename { phase.prefix() } else { "" };
        self.dir.join(self.file_name(prefix, tag))
    }

    /// Final log path for a finished host
    pub fn final_path(&self, tag: &HostTag, succeeded: bool) -> PathBuf {
        self.path(tag, if succeeded { LogPhase::Done } else { LogPhase::Failed })
    }

    /// Remove the logs a previous run left for `tag`
    pub fn prepare(&self, tag: &HostTag) -> io::Result<()> {
        if self.delete_all {
            for prefix in self.variants() {
                remove_if_exists(&self.dir.join(self.file_name(prefix, tag)))?;
            }
            Ok(())
        } else {
            remove_if_exists(&self.path(tag, LogPhase::Active))
        }
    }

    /// Move the active log to its final name, returning that name
    pub fn finish(&self, tag: &HostTag, succeeded: bool) -> io::Result<PathBuf> {
        let active = self.path(tag, LogPhase::Active);
        let finished = self.final_path(tag, succeeded);
        if active != finished && active.exists() {
            remove_if_exists(&finished)?;
            fs::rename(&active, &finished)?;
        }
        Ok(finished)
    }

    /// Move every current log for `tags` into the prior directory.
    ///
    /// Returns the number of files moved; a no-op without a prior directory.
    pub fn rotate_to_prior(&self, tags: &[HostTag]) -> io::Result<usize> {
        let Some(prior) = &self.prior_dir else {
            return Ok(0);
        };
        fs::create_dir_all(prior)?;

        let mut moved = 0;
        for tag in tags {
            if self.delete_all {
                for prefix in self.variants() {
                    remove_if_exists(&prior.join(self.file_name(prefix, tag)))?;
                }
            }
            let prefixes: &[&str] = if self.rename { &["active-", "done-", "failed-"] } else { &[""] };
            for prefix in prefixes {
                let name = self.file_name(prefix, tag);
                let source = self.dir.join(&name);
                if source.exists() {
                    move_file(&source, &prior.join(&name))?;
                    moved += 1;
                }
            }
        }
        debug!(moved, prior = %prior.display(), "Rotated log files");
        Ok(moved)
    }

    fn variants(&self) -> [&'static str; 4] {
        ["", "active-", "done-", "failed-"]
    }

    fn file_name(&self, prefix: &str, tag: &HostTag) -> String {
        format!("{}{}{}.log", prefix, tag, self.suffix)
    }
}

/// Prove `dir` accepts new files by creating and removing a probe file
pub fn verify_writable(dir: &Path) -> Result<(), LogError> {
    let probe = dir.join(PROBE_FILE);
    let not_writable = |source| LogError::NotWritable {
        path: dir.to_path_buf(),
        source,
    };

    remove_if_exists(&probe).map_err(not_writable)?;
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
        .map_err(not_writable)?;
    fs::remove_file(&probe).map_err(not_writable)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    remove_if_exists(to)?;
    if fs::rename(from, to).is_err() {
        // Crossing filesystems
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
