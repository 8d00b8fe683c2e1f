//! pb-orchestrator: Concurrent build orchestration for pbuild
//!
//! One [`HostTask`] per build host delivers and runs that host's script
//! through a [`RemoteExecutor`]; the [`Orchestrator`] launches every task at
//! once, polls their state on a fixed tick, reports snapshots to a
//! [`StatusSink`] and applies the abort-on-error policy.

pub mod check;
pub mod orchestrator;
pub mod process;
pub mod remote;
pub mod state;
pub mod tally;
pub mod task;
pub mod transport;

pub use check::{check_hosts, CheckResult};
pub use orchestrator::{
    HostSummary, HostView, Orchestrator, RunPolicy, RunReport, RunSnapshot, StatusSink,
};
pub use remote::{DeliveryResult, ExecutionResult, LaunchPolicy, OutputMode, RemoteExecutor};
pub use state::{FailureReason, HostPhase, HostSnapshot, HostStatus};
pub use tally::{Outcome, Tally};
pub use task::{BuildContext, HostHandle, HostTask};
pub use transport::{SshTransport, Transport};
