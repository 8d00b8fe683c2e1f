//! Local process helpers

use std::io;
use tokio::process::Child;
use tracing::debug;

/// Ask the process `pid` to terminate (SIGTERM)
#[cfg(unix)]
pub fn terminate_pid(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill() has no memory-safety preconditions
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    debug!(pid, result, "Sent SIGTERM");
    result == 0
}

#[cfg(not(unix))]
pub fn terminate_pid(_pid: u32) -> bool {
    false
}

/// Terminate a child we own, falling back to a hard kill
pub fn terminate(child: &mut Child) {
    let signalled = child.id().map(terminate_pid).unwrap_or(false);
    if !signalled {
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Failed to kill child process");
        }
    }
}

/// Launch failures worth retrying after a pause
pub fn is_transient_launch_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::OutOfMemory
    ) {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            err.raw_os_error(),
            Some(libc::EAGAIN) | Some(libc::ENOMEM) | Some(libc::EMFILE) | Some(libc::ENFILE)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}
