use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config {path} is not a JSON object: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("unknown configuration key `{0}`")]
    UnknownKey(String),

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to write config: {0}")]
    Write(#[from] PersistenceError),
}

/// Failure to read the clipboard or resolve the focused window.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard backend unavailable: {0}")]
    Unavailable(String),

    #[error("clipboard read failed: {0}")]
    Read(String),

    #[error("clipboard write failed: {0}")]
    Write(String),
}

/// Disk I/O failure while saving or loading history.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Another daemon instance holds the lock record.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("cliplet is already running with PID {pid} (lock file {path})")]
    AlreadyRunning { pid: i32, path: PathBuf },

    #[error("failed to write lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Startup failures surfaced to the caller as exit codes.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("startup failed: {0}")]
    Startup(String),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

impl DaemonError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Failure to signal a running daemon from another process.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no running cliplet daemon (lock file {0})")]
    NotRunning(PathBuf),

    #[error("failed to signal PID {pid}: {reason}")]
    Signal { pid: i32, reason: String },

    #[error("daemon PID {pid} did not exit within {secs}s")]
    Timeout { pid: i32, secs: u64 },
}
