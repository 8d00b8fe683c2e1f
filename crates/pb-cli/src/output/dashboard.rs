//! Full-screen progress display
//!
//! One row per host (tag, address, status) redrawn on every tick, followed by
//! a footer with run totals. Takes over the terminal's alternate screen for
//! the duration of the run.

use std::io::{self, Stdout, Write};

use anyhow::{bail, Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};
use pb_core::time::format_elapsed;
use pb_orchestrator::{HostPhase, HostView, RunReport, RunSnapshot, StatusSink};
use tracing::warn;

use super::outcome_label;

pub const TAG_COLUMN: u16 = 0;
pub const HOST_COLUMN: u16 = 20;
pub const STATUS_COLUMN: u16 = 45;
pub const MIN_WIDTH: u16 = 80;

const FOOTER_ROWS: usize = 4;

pub const ABORT_NOTICE: &str = "ABORTING due to failed build and --abort-on-error";

/// Terminal rows needed to show `hosts` hosts
pub fn rows_needed(hosts: usize) -> usize {
    hosts + FOOTER_ROWS
}

/// Fail unless the terminal can hold the dashboard for `hosts` hosts
pub fn check_size(hosts: usize) -> Result<()> {
    let (width, height) = terminal::size().context("Failed to query terminal size")?;
    let rows = rows_needed(hosts);
    if width < MIN_WIDTH || usize::from(height) < rows {
        bail!(
            "Terminal too small for progress display: need {}x{}, have {}x{} (use --nocurses)",
            MIN_WIDTH,
            rows,
            width,
            height
        );
    }
    Ok(())
}

/// Status column text for a host and whether it is shown bold
pub fn status_text(view: &HostView) -> (String, bool) {
    if let (Some(outcome), Some(after)) = (view.outcome, view.finished_after) {
        return (outcome_label(outcome, after), outcome.is_failure());
    }

    let text = match view.phase {
        HostPhase::Pending => "- waiting".to_string(),
        HostPhase::Transferring => "- transferring script".to_string(),
        HostPhase::Executing if view.idle => "?".to_string(),
        HostPhase::Executing => format!("- {} ({})", view.label, view.lines),
        _ => "- finishing".to_string(),
    };
    (text, false)
}

/// Footer lines below the host rows
pub fn footer(snapshot: &RunSnapshot, selector: &str, command_line: &str, local_host: &str) -> Vec<String> {
    let tally = &snapshot.tally;
    let mut lines = vec![
        format!(
            "{} hosts ({} done, {} failed) | select: {} | elapsed {}",
            snapshot.hosts.len(),
            tally.succeeded,
            tally.fail_count(),
            selector,
            format_elapsed(snapshot.elapsed)
        ),
        format!("{}: {}", local_host, command_line),
    ];
    if snapshot.aborting {
        lines.push(ABORT_NOTICE.to_string());
    }
    lines
}

fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Curses-style renderer
pub struct Dashboard {
    out: Stdout,
    width: u16,
    selector: String,
    command_line: String,
    local_host: String,
    active: bool,
}

impl Dashboard {
    /// Switch the terminal to the alternate screen
    pub fn open(selector: Option<&str>, command_line: &str) -> Result<Self> {
        let (width, _) = terminal::size().context("Failed to query terminal size")?;
        let mut out = io::stdout();
        execute!(out, EnterAlternateScreen, Hide).context("Failed to initialize terminal")?;

        Ok(Self {
            out,
            width,
            selector: selector.unwrap_or("None").to_string(),
            command_line: command_line.to_string(),
            local_host: gethostname::gethostname().to_string_lossy().into_owned(),
            active: true,
        })
    }

    fn draw(&mut self, snapshot: &RunSnapshot) -> io::Result<()> {
        let host_width = usize::from(STATUS_COLUMN - HOST_COLUMN - 1);
        let tag_width = usize::from(HOST_COLUMN - TAG_COLUMN - 1);
        let status_width = usize::from(self.width.saturating_sub(STATUS_COLUMN));

        queue!(self.out, Clear(ClearType::All))?;
        for (row, host) in snapshot.hosts.iter().enumerate() {
            let row = u16::try_from(row).unwrap_or(u16::MAX);
            let (status, bold) = status_text(host);
            queue!(
                self.out,
                MoveTo(TAG_COLUMN, row),
                Print(fit(host.tag.as_str(), tag_width)),
                MoveTo(HOST_COLUMN, row),
                Print(fit(&host.address, host_width)),
                MoveTo(STATUS_COLUMN, row)
            )?;
            if bold {
                queue!(
                    self.out,
                    SetAttribute(Attribute::Bold),
                    Print(fit(&status, status_width)),
                    SetAttribute(Attribute::Reset)
                )?;
            } else {
                queue!(self.out, Print(fit(&status, status_width)))?;
            }
        }

        let first = snapshot.hosts.len() + 1;
        let lines = footer(snapshot, &self.selector, &self.command_line, &self.local_host);
        for (offset, line) in lines.iter().enumerate() {
            let row = u16::try_from(first + offset).unwrap_or(u16::MAX);
            queue!(self.out, MoveTo(0, row), Print(fit(line, usize::from(self.width))))?;
        }
        self.out.flush()
    }

    fn restore(&mut self) {
        if self.active {
            let _ = execute!(self.out, Show, LeaveAlternateScreen);
            self.active = false;
        }
    }
}

impl StatusSink for Dashboard {
    fn update(&mut self, snapshot: &RunSnapshot) {
        if let Err(e) = self.draw(snapshot) {
            warn!(error = %e, "Failed to draw progress display");
        }
    }

    fn aborting(&mut self, snapshot: &RunSnapshot) {
        self.update(snapshot);
    }

    fn finished(&mut self, _report: &RunReport) {
        self.restore();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.restore();
    }
}
