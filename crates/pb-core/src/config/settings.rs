//! Boolean run settings (`DeleteLogfiles`, `NoProgress`, ...)

use crate::error::ConfigError;
use serde::Serialize;
use std::fmt;

/// Toggles controlling log handling and terminal output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Remove every log variant for a host before it starts
    pub delete_logfiles: bool,
    /// Keep remote scripts around for inspection
    pub diagnose_errors: bool,
    /// Append the selector to log file names
    pub logfile_branch: bool,
    /// Rename logs `active-` / `done-` / `failed-` as hosts progress
    pub logfile_rename: bool,
    /// Live dashboard instead of plain line output
    pub progress: bool,
    /// Print the final status table
    pub summary_screen: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delete_logfiles: true,
            diagnose_errors: false,
            logfile_branch: false,
            logfile_rename: false,
            progress: true,
            summary_screen: true,
        }
    }
}

impl Settings {
    /// Apply a settings string such as `"NoProgress, LogfileRename"`.
    ///
    /// Names are case-insensitive and may be prefixed with `No`. `origin`
    /// names where the string came from for error messages.
    pub fn apply(&mut self, origin: &str, spec: &str) -> Result<(), ConfigError> {
        let lowered = spec.to_lowercase().replace(',', " ");
        for entry in lowered.split_whitespace() {
            let (name, value) = match entry.strip_prefix("no") {
                Some(rest) => (rest, false),
                None => (entry, true),
            };
            let slot = self.slot(name).ok_or_else(|| ConfigError::InvalidSetting {
                origin: origin.to_string(),
                setting: entry.to_string(),
            })?;
            *slot = value;
        }
        Ok(())
    }

    fn slot(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "deletelogfiles" => Some(&mut self.delete_logfiles),
            "diagnoseerrors" => Some(&mut self.diagnose_errors),
            "logfilebranch" => Some(&mut self.logfile_branch),
            "logfilerename" => Some(&mut self.logfile_rename),
            "progress" => Some(&mut self.progress),
            "summaryscreen" => Some(&mut self.summary_screen),
            _ => None,
        }
    }

    fn entries(&self) -> [(&'static str, bool); 6] {
        [
            ("DeleteLogfiles", self.delete_logfiles),
            ("DiagnoseErrors", self.diagnose_errors),
            ("LogfileBranch", self.logfile_branch),
            ("LogfileRename", self.logfile_rename),
            ("Progress", self.progress),
            ("SummaryScreen", self.summary_screen),
        ]
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .entries()
            .iter()
            .map(|(name, on)| if *on { name.to_string() } else { format!("No{}", name) })
            .collect();
        f.write_str(&rendered.join(","))
    }
}
