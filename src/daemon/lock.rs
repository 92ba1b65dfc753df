use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::LockError;

// ============================================================================
// PID FILE MANAGEMENT
// ============================================================================

/// The on-disk single-instance marker: a file holding one process id.
#[derive(Debug, Clone)]
pub struct LockRecord {
    path: PathBuf,
}

impl LockRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded pid, if the file exists and parses.
    pub fn read_pid(&self) -> Option<i32> {
        read_pid_at(&self.path)
    }

    /// The recorded pid if that process is still alive.
    pub fn live_pid(&self) -> Option<i32> {
        self.read_pid().filter(|pid| is_process_alive(*pid))
    }

    /// Claim the lock for the current process. A record left by a dead
    /// process is discarded; a live one is an error.
    ///
    /// The record is written in full to a private temp file and hard-linked
    /// into place, so the lock path never holds a partial pid.
    pub fn acquire(&self) -> Result<(), LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let staged = self.sibling("tmp");
        let result = self
            .write_staged(&staged)
            .and_then(|()| self.link_staged(&staged));
        let _ = fs::remove_file(&staged);
        result
    }

    fn write_staged(&self, staged: &Path) -> Result<(), LockError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(staged)
            .map_err(|source| self.io_error(source))?;
        write!(file, "{}", std::process::id())
            .and_then(|_| file.sync_all())
            .map_err(|source| self.io_error(source))
    }

    fn link_staged(&self, staged: &Path) -> Result<(), LockError> {
        for _ in 0..3 {
            match fs::hard_link(staged, &self.path) {
                Ok(()) => {
                    debug!(path = %self.path.display(), "lock file created");
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    let recorded = self.read_pid();
                    if let Some(pid) = recorded.filter(|pid| is_process_alive(*pid)) {
                        return Err(LockError::AlreadyRunning {
                            pid,
                            path: self.path.clone(),
                        });
                    }
                    warn!(path = %self.path.display(), pid = ?recorded, "removing stale lock file");
                    self.discard_stale(recorded)?;
                }
                Err(source) => return Err(self.io_error(source)),
            }
        }

        Err(self.io_error(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "lock file keeps reappearing",
        )))
    }

    /// Move the record aside and delete it. If a live holder replaced the
    /// stale record in the meantime, its record is linked back.
    fn discard_stale(&self, stale: Option<i32>) -> Result<(), LockError> {
        let grave = self.sibling("stale");
        match fs::rename(&self.path, &grave) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(self.io_error(source)),
        }

        let moved = read_pid_at(&grave);
        if moved != stale && moved.is_some_and(is_process_alive) {
            let _ = fs::hard_link(&grave, &self.path);
        }
        let _ = fs::remove_file(&grave);
        Ok(())
    }

    /// Remove the record if it still names this process.
    pub fn release(&self) {
        self.remove_if_held_by(std::process::id() as i32);
    }

    /// Remove the record if it names `pid`. Returns whether it was removed.
    pub fn remove_if_held_by(&self, pid: i32) -> bool {
        if self.read_pid() != Some(pid) {
            return false;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), pid, "lock file removed");
                true
            }
            Err(err) => {
                warn!(path = %self.path.display(), "failed to remove lock file: {err}");
                false
            }
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{suffix}", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn read_pid_at(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Signal 0 checks for existence without delivering anything. `EPERM` means
/// the process exists but belongs to someone else.
pub fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
