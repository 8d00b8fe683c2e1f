//! Per-host lifecycle state
//!
//! Each host's state lives in one [`HostStatus`], written by that host's
//! worker and read by the orchestrator through cloned snapshots. The
//! `finished` flag is separate: only the orchestrator flips it, once, when it
//! folds the host into the tally.

use pb_script::{ActivityTracker, LineKind};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Lifecycle of a host task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPhase {
    Pending,
    /// Script is being copied to the host
    Transferring,
    /// Script is running on the host
    Executing,
    Succeeded,
    Failed,
    TransferFailed,
    Aborted,
}

impl HostPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HostPhase::Succeeded | HostPhase::Failed | HostPhase::TransferFailed | HostPhase::Aborted
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_advance_to(self, next: HostPhase) -> bool {
        use HostPhase::*;
        matches!(
            (self, next),
            (Pending, Transferring)
                | (Pending, Aborted)
                | (Transferring, Executing)
                | (Transferring, TransferFailed)
                | (Executing, Succeeded)
                | (Executing, Failed)
                | (Executing, Aborted)
        )
    }
}

impl fmt::Display for HostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPhase::Pending => write!(f, "pending"),
            HostPhase::Transferring => write!(f, "transferring"),
            HostPhase::Executing => write!(f, "executing"),
            HostPhase::Succeeded => write!(f, "succeeded"),
            HostPhase::Failed => write!(f, "failed"),
            HostPhase::TransferFailed => write!(f, "transfer failed"),
            HostPhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a host did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Script exited nonzero
    ExitCode(i32),
    /// Remote shell was killed by a signal
    Signaled,
    /// Clock skew warning in the build output
    ClockSkew,
    /// Script could not be copied to the host
    Transfer(String),
    /// Remote shell could not be started
    Launch(String),
    /// Log file could not be written
    Log(String),
    /// Worker stopped without reaching a terminal phase
    WorkerLost,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitCode(code) => write!(f, "exit status {}", code),
            FailureReason::Signaled => write!(f, "remote shell killed by signal"),
            FailureReason::ClockSkew => write!(f, "clock skew detected"),
            FailureReason::Transfer(detail) => write!(f, "transfer failed: {}", detail),
            FailureReason::Launch(detail) => write!(f, "launch failed: {}", detail),
            FailureReason::Log(detail) => write!(f, "log write failed: {}", detail),
            FailureReason::WorkerLost => write!(f, "worker exited unexpectedly"),
        }
    }
}

/// Point-in-time copy of a host's state
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub phase: HostPhase,
    pub activity: ActivityTracker,
    pub failure: Option<FailureReason>,
    /// Process id of the running remote shell, if any
    pub pid: Option<u32>,
}

/// Shared state of one host task
#[derive(Debug)]
pub struct HostStatus {
    inner: Mutex<HostSnapshot>,
    finished: AtomicBool,
}

impl Default for HostStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStatus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HostSnapshot {
                phase: HostPhase::Pending,
                activity: ActivityTracker::new(),
                failure: None,
                pid: None,
            }),
            finished: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> HostSnapshot {
        self.lock().clone()
    }

    pub fn phase(&self) -> HostPhase {
        self.lock().phase
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().pid
    }

    /// Move to `next` if the transition is legal
    pub fn advance(&self, next: HostPhase) -> bool {
        let mut inner = self.lock();
        if !inner.phase.can_advance_to(next) {
            if !inner.phase.is_terminal() {
                warn!(from = %inner.phase, to = %next, "Rejected host phase transition");
            }
            return false;
        }
        inner.phase = next;
        if next.is_terminal() {
            inner.pid = None;
        }
        true
    }

    /// Move to a failing terminal phase, recording why
    pub fn fail(&self, next: HostPhase, reason: FailureReason) -> bool {
        let mut inner = self.lock();
        if !inner.phase.can_advance_to(next) {
            return false;
        }
        inner.phase = next;
        inner.failure = Some(reason);
        inner.pid = None;
        true
    }

    /// Abort a host that has not started yet
    pub fn abort_if_pending(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase == HostPhase::Pending {
            inner.phase = HostPhase::Aborted;
            true
        } else {
            false
        }
    }

    /// Mark a host whose worker died as failed, whatever its phase
    pub fn fail_lost_worker(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        inner.phase = HostPhase::Failed;
        inner.failure = Some(FailureReason::WorkerLost);
        inner.pid = None;
        true
    }

    pub(crate) fn set_pid(&self, pid: Option<u32>) {
        self.lock().pid = pid;
    }

    /// Feed one output line to the activity tracker
    pub(crate) fn observe_line(&self, line: &str) -> LineKind {
        self.lock().activity.observe(line)
    }

    /// Claim the right to fold this host into the tally.
    ///
    /// Succeeds once, and only after the host reached a terminal phase.
    pub fn try_finish(&self) -> bool {
        self.phase().is_terminal() && self.mark_finished()
    }

    /// Claim the tally slot regardless of phase (used when aborting)
    pub fn mark_finished(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
