//! Run-wide coordination
//!
//! The [`Orchestrator`] launches every host task at once, then wakes on a
//! fixed tick to snapshot each host, fold newly finished hosts into the
//! [`Tally`] and hand a [`RunSnapshot`] to the [`StatusSink`]. With
//! abort-on-error set, the first failure aborts every unfinished host and
//! the run returns immediately.

use crate::state::HostPhase;
use crate::tally::{Outcome, Tally};
use crate::task::{BuildContext, HostHandle, HostTask};
use pb_core::{HostTag, HostTarget};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Tick and abort settings for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    /// Interval between status polls
    pub tick: Duration,
    /// Abort every unfinished host after the first failure
    pub abort_on_error: bool,
    /// Silence after which a running host is shown as idle
    pub idle_after: Duration,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            abort_on_error: false,
            idle_after: Duration::from_secs(30),
        }
    }
}

/// One host's row in a snapshot
#[derive(Debug, Clone)]
pub struct HostView {
    pub tag: HostTag,
    pub address: String,
    pub phase: HostPhase,
    /// Current activity label
    pub label: String,
    /// Output lines since the label changed
    pub lines: u64,
    /// No output for longer than the idle threshold
    pub idle: bool,
    /// Bucket the host was counted in, once finished
    pub outcome: Option<Outcome>,
    /// Run time at which the host finished
    pub finished_after: Option<Duration>,
}

/// State of the whole run at one tick
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// Hosts in tag order
    pub hosts: Vec<HostView>,
    pub tally: Tally,
    pub elapsed: Duration,
    pub aborting: bool,
}

/// Final line for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSummary {
    pub tag: HostTag,
    pub address: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Hosts in tag order
    pub hosts: Vec<HostSummary>,
    pub tally: Tally,
    pub elapsed: Duration,
    /// The run stopped early under abort-on-error
    pub aborted: bool,
}

impl RunReport {
    /// Process exit status: the number of failed hosts
    pub fn exit_code(&self) -> i32 {
        self.tally.exit_code()
    }
}

/// Receives run progress
pub trait StatusSink: Send {
    /// Every task has been launched
    fn started(&mut self, _hosts: &[HostTarget]) {}

    /// Called on every tick
    fn update(&mut self, snapshot: &RunSnapshot);

    /// The abort policy fired
    fn aborting(&mut self, _snapshot: &RunSnapshot) {}

    /// The run is over
    fn finished(&mut self, _report: &RunReport) {}
}

struct Slot {
    handle: HostHandle,
    join: JoinHandle<HostPhase>,
    outcome: Option<Outcome>,
    finished_after: Option<Duration>,
}

impl Slot {
    /// Fold the host into the tally if it just finished
    fn poll(&mut self, tally: &mut Tally, elapsed: Duration) -> Option<Outcome> {
        if self.outcome.is_some() {
            return None;
        }

        let status = self.handle.status();
        if self.join.is_finished() && !status.phase().is_terminal() && status.fail_lost_worker() {
            warn!(host = %self.handle.target().tag, "Host worker exited without a result");
        }

        let outcome = Outcome::from_phase(status.phase())?;
        if !status.try_finish() {
            return None;
        }
        tally.record(outcome);
        self.outcome = Some(outcome);
        self.finished_after = Some(elapsed);
        Some(outcome)
    }

    fn view(&self, idle_after: Duration) -> HostView {
        let target = self.handle.target();
        let snapshot = self.handle.status().snapshot();
        HostView {
            tag: target.tag.clone(),
            address: target.address.clone(),
            phase: snapshot.phase,
            label: snapshot.activity.label().to_string(),
            lines: snapshot.activity.lines(),
            idle: snapshot.phase == HostPhase::Executing
                && snapshot.activity.updated_at().elapsed() > idle_after,
            outcome: self.outcome,
            finished_after: self.finished_after,
        }
    }
}

/// Runs every host task of a build
pub struct Orchestrator {
    tasks: Vec<HostTask>,
    policy: RunPolicy,
}

impl Orchestrator {
    /// One task per host, ordered by tag
    pub fn new(targets: Vec<HostTarget>, context: Arc<BuildContext>, policy: RunPolicy) -> Self {
        let tasks = targets
            .into_iter()
            .map(|target| HostTask::new(target, Arc::clone(&context)))
            .collect();
        Self::from_tasks(tasks, policy)
    }

    pub fn from_tasks(mut tasks: Vec<HostTask>, policy: RunPolicy) -> Self {
        tasks.sort_by(|a, b| a.target().tag.cmp(&b.target().tag));
        Self { tasks, policy }
    }

    /// Run every task to completion, or until the abort policy fires
    pub async fn run(self, sink: &mut dyn StatusSink) -> RunReport {
        let started = Instant::now();
        let policy = self.policy;
        let targets: Vec<HostTarget> = self.tasks.iter().map(|t| t.target().clone()).collect();

        let mut slots: Vec<Slot> = self
            .tasks
            .into_iter()
            .map(|task| {
                let handle = task.handle();
                let join = tokio::spawn(task.run());
                Slot {
                    handle,
                    join,
                    outcome: None,
                    finished_after: None,
                }
            })
            .collect();
        info!(hosts = slots.len(), "Launched host tasks");
        sink.started(&targets);

        let mut tally = Tally::default();
        let mut ticker = tokio::time::interval(policy.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();

            for slot in &mut slots {
                if let Some(outcome) = slot.poll(&mut tally, elapsed) {
                    debug!(host = %slot.handle.target().tag, %outcome, "Host folded into tally");
                }
            }
            sink.update(&snapshot(&slots, &tally, elapsed, false, policy.idle_after));

            let unfinished = slots.iter().any(|slot| slot.outcome.is_none());
            if !unfinished {
                break;
            }

            if policy.abort_on_error && tally.fail_count() > 0 {
                warn!(failed = tally.fail_count(), "Aborting due to failed build");
                for slot in &mut slots {
                    // A host may have finished on its own since the poll above
                    slot.poll(&mut tally, elapsed);
                    if slot.outcome.is_some() {
                        continue;
                    }
                    slot.handle.abort();
                    if slot.poll(&mut tally, elapsed).is_some() {
                        continue;
                    }
                    if slot.handle.status().mark_finished() {
                        tally.record(Outcome::Aborted);
                        slot.outcome = Some(Outcome::Aborted);
                        slot.finished_after = Some(elapsed);
                    }
                }
                let last = snapshot(&slots, &tally, elapsed, true, policy.idle_after);
                sink.aborting(&last);
                let report = report(&slots, tally, elapsed, true);
                sink.finished(&report);
                return report;
            }
        }

        for slot in &mut slots {
            if let Err(e) = (&mut slot.join).await {
                warn!(host = %slot.handle.target().tag, error = %e, "Host worker panicked");
            }
        }

        let report = report(&slots, tally, started.elapsed(), false);
        info!(
            succeeded = report.tally.succeeded,
            failed = report.tally.fail_count(),
            "Build finished"
        );
        sink.finished(&report);
        report
    }
}

fn snapshot(
    slots: &[Slot],
    tally: &Tally,
    elapsed: Duration,
    aborting: bool,
    idle_after: Duration,
) -> RunSnapshot {
    RunSnapshot {
        hosts: slots.iter().map(|slot| slot.view(idle_after)).collect(),
        tally: *tally,
        elapsed,
        aborting,
    }
}

fn report(slots: &[Slot], tally: Tally, elapsed: Duration, aborted: bool) -> RunReport {
    let hosts = slots
        .iter()
        .map(|slot| {
            let target = slot.handle.target();
            HostSummary {
                tag: target.tag.clone(),
                address: target.address.clone(),
                outcome: slot.outcome.unwrap_or(Outcome::Aborted),
                elapsed: slot.finished_after.unwrap_or(elapsed),
            }
        })
        .collect();
    RunReport {
        hosts,
        tally,
        elapsed,
        aborted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RunPolicy::default();
        assert_eq!(policy.tick, Duration::from_secs(1));
        assert!(!policy.abort_on_error);
        assert!(policy.idle_after > policy.tick);
    }
}
