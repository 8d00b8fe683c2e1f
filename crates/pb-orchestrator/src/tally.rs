//! Run-wide result counts

use crate::state::HostPhase;
use std::fmt;

/// Final bucket a host is counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Succeeded,
    Failed,
    TransferFailed,
    Aborted,
}

impl Outcome {
    /// Bucket for a terminal phase
    pub fn from_phase(phase: HostPhase) -> Option<Self> {
        match phase {
            HostPhase::Succeeded => Some(Outcome::Succeeded),
            HostPhase::Failed => Some(Outcome::Failed),
            HostPhase::TransferFailed => Some(Outcome::TransferFailed),
            HostPhase::Aborted => Some(Outcome::Aborted),
            HostPhase::Pending | HostPhase::Transferring | HostPhase::Executing => None,
        }
    }

    /// Counts toward the exit status
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Failed | Outcome::TransferFailed)
    }

    /// Label used in status displays
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Succeeded => "Done",
            Outcome::Failed => "Failed",
            Outcome::TransferFailed => "Transfer failed",
            Outcome::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Number of hosts in each final bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub transfer_failed: usize,
    pub aborted: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::TransferFailed => self.transfer_failed += 1,
            Outcome::Aborted => self.aborted += 1,
        }
    }

    /// Hosts whose build or transfer failed; aborted hosts are not counted
    pub fn fail_count(&self) -> usize {
        self.failed + self.transfer_failed
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.transfer_failed + self.aborted
    }

    /// Process exit status for the run
    pub fn exit_code(&self) -> i32 {
        i32::try_from(self.fail_count()).unwrap_or(i32::MAX)
    }
}
