//! Line-oriented progress output
//!
//! Used when the dashboard is disabled or stdout is not a terminal. Prints
//! one line when a host starts and one when it finishes.

use std::collections::HashSet;
use std::io::Write;

use pb_core::time::format_elapsed;
use pb_core::HostTag;
use pb_orchestrator::{HostPhase, HostView, Outcome, RunSnapshot, StatusSink};
use tracing::warn;

use super::dashboard::ABORT_NOTICE;

pub struct PlainRenderer<W> {
    out: W,
    started: HashSet<HostTag>,
    reported: HashSet<HostTag>,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            started: HashSet::new(),
            reported: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn host_lines(&mut self, host: &HostView) -> Vec<String> {
        let mut lines = Vec::new();
        if host.phase != HostPhase::Pending && self.started.insert(host.tag.clone()) {
            lines.push(format!("Starting host {} ({})", host.address, host.tag));
        }

        if let (Some(outcome), Some(after)) = (host.outcome, host.finished_after) {
            if self.reported.insert(host.tag.clone()) {
                let elapsed = format_elapsed(after);
                lines.push(match outcome {
                    Outcome::Succeeded => {
                        format!("Completed host {} ({}) in {}", host.address, host.tag, elapsed)
                    }
                    Outcome::Failed => {
                        format!("FAILED: Host {} ({}) after {}", host.address, host.tag, elapsed)
                    }
                    Outcome::TransferFailed => format!(
                        "FAILED: Host {} ({}) script transfer failed",
                        host.address, host.tag
                    ),
                    Outcome::Aborted => format!("Aborted host {} ({})", host.address, host.tag),
                });
            }
        }
        lines
    }

    fn emit(&mut self, lines: &[String]) {
        for line in lines {
            if let Err(e) = writeln!(self.out, "{}", line) {
                warn!(error = %e, "Failed to write progress");
                return;
            }
        }
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> StatusSink for PlainRenderer<W> {
    fn update(&mut self, snapshot: &RunSnapshot) {
        let lines: Vec<String> = snapshot
            .hosts
            .iter()
            .flat_map(|host| self.host_lines(host))
            .collect();
        self.emit(&lines);
    }

    fn aborting(&mut self, snapshot: &RunSnapshot) {
        self.update(snapshot);
        self.emit(&[ABORT_NOTICE.to_string()]);
    }
}
