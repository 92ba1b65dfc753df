// ============================================================================
// CONSTANTS
// ============================================================================

pub const APP_DIR: &str = "cliplet";
pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history.json";
pub const PID_FILE: &str = "daemon.pid";
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "cliplet.log";

/// Saves requested within this window are coalesced into one write.
pub const SAVE_DEBOUNCE_MS: u64 = 250;
/// Upper bound on the final flush before a forced exit.
pub const SHUTDOWN_GRACE_MS: u64 = 3000;
/// How long `cliplet stop` waits for the daemon to exit.
pub const STOP_TIMEOUT_SECS: u64 = 10;
/// How long to wait for the process to vanish after SIGKILL.
pub const KILL_WAIT_SECS: u64 = 2;

pub const PREVIEW_LENGTH: usize = 80;
pub const PASSWORD_MAX_LENGTH: usize = 50;
pub const PASSWORD_MARKERS: &str = "!@#$%^&*";
