use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::daemon::LockRecord;
use crate::error::ControlError;
use crate::utils::KILL_WAIT_SECS;

// ============================================================================
// REMOTE CONTROL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub pid_file: PathBuf,
    pub pid: Option<i32>,
    pub running: bool,
}

pub fn status(lock: &LockRecord) -> DaemonStatus {
    let pid = lock.read_pid();
    DaemonStatus {
        pid_file: lock.path().to_path_buf(),
        pid,
        running: lock.live_pid().is_some(),
    }
}

fn send(lock: &LockRecord, signal: Signal) -> Result<i32, ControlError> {
    let pid = lock
        .live_pid()
        .ok_or_else(|| ControlError::NotRunning(lock.path().to_path_buf()))?;
    kill(Pid::from_raw(pid), signal).map_err(|errno| ControlError::Signal {
        pid,
        reason: errno.desc().to_string(),
    })?;
    info!(pid, ?signal, "signalled daemon");
    Ok(pid)
}

/// Ask the daemon to reload its configuration.
pub fn request_reload(lock: &LockRecord) -> Result<i32, ControlError> {
    send(lock, Signal::SIGHUP)
}

/// Ask the daemon to clear its history.
pub fn request_clear(lock: &LockRecord) -> Result<i32, ControlError> {
    send(lock, Signal::SIGUSR1)
}

/// How a stopped daemon went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub pid: i32,
    /// SIGTERM was ignored past the timeout and SIGKILL was sent.
    pub killed: bool,
}

fn wait_for_exit(lock: &LockRecord, pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if lock.live_pid() != Some(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(100));
    }
}

/// Ask the daemon to shut down and wait up to `timeout` for it to exit. A
/// daemon still alive after that is sent SIGKILL and its lock record removed.
pub fn request_stop(lock: &LockRecord, timeout: Duration) -> Result<Stopped, ControlError> {
    let pid = send(lock, Signal::SIGTERM)?;
    if wait_for_exit(lock, pid, timeout) {
        return Ok(Stopped { pid, killed: false });
    }

    warn!(pid, secs = timeout.as_secs_f64(), "daemon ignored SIGTERM, sending SIGKILL");
    kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(|errno| ControlError::Signal {
        pid,
        reason: errno.desc().to_string(),
    })?;
    if !wait_for_exit(lock, pid, Duration::from_secs(KILL_WAIT_SECS)) {
        return Err(ControlError::Timeout {
            pid,
            secs: timeout.as_secs() + KILL_WAIT_SECS,
        });
    }

    lock.remove_if_held_by(pid);
    Ok(Stopped { pid, killed: true })
}
