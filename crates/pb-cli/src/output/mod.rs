//! Output formatting utilities for the CLI
//!
//! Host tables, the end-of-run summary and colored status messages. The
//! live progress displays live in [`dashboard`] and [`plain`].

pub mod dashboard;
pub mod plain;

use std::time::Duration;

use pb_core::time::format_elapsed;
use pb_core::HostTarget;
use pb_orchestrator::{Outcome, RunReport, Tally};
use tabled::{settings::Style, Table, Tabled};

/// Format configured hosts as an ASCII table
pub fn format_hosts(hosts: &[HostTarget]) -> String {
    if hosts.is_empty() {
        return "No hosts selected".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "TAG")]
        tag: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "PROJECT")]
        project: String,
        #[tabled(rename = "PATH")]
        path: String,
        #[tabled(rename = "SELECT")]
        select: String,
    }

    let rows: Vec<HostRow> = hosts
        .iter()
        .map(|h| HostRow {
            tag: h.tag.to_string(),
            address: h.address.clone(),
            project: h.project.to_string(),
            path: h.remote_path.clone(),
            select: h.selector.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Final bucket of a host with its run time, e.g. `Done (03:12)`
pub fn outcome_label(outcome: Outcome, elapsed: Duration) -> String {
    format!("{} ({})", outcome.label(), format_elapsed(elapsed))
}

/// Format the end-of-run table, one row per host in tag order
pub fn format_summary(report: &RunReport) -> String {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "TAG")]
        tag: String,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "STATUS")]
        status: String,
    }

    let rows: Vec<SummaryRow> = report
        .hosts
        .iter()
        .map(|h| SummaryRow {
            tag: h.tag.to_string(),
            host: h.address.clone(),
            status: outcome_label(h.outcome, h.elapsed),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-line count of every bucket
pub fn format_totals(tally: &Tally, elapsed: Duration) -> String {
    format!(
        "{} hosts in {}: {} succeeded, {} failed, {} transfer failed, {} aborted",
        tally.total(),
        format_elapsed(elapsed),
        tally.succeeded,
        tally.failed,
        tally.transfer_failed,
        tally.aborted
    )
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
