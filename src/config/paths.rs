use std::path::PathBuf;

use crate::utils::{APP_DIR, CONFIG_FILE, HISTORY_FILE, LOG_DIR, LOG_FILE, PID_FILE};

// ============================================================================
// FILE LOCATIONS
// ============================================================================

/// Where the daemon keeps its files. Each field may be overridden from the
/// command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub history_file: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
}

impl AppPaths {
    pub fn resolve() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let runtime_dir = dirs::runtime_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(APP_DIR)
                    .join("runtime")
            });

        Self {
            config_file: config_dir.join(CONFIG_FILE),
            history_file: data_dir.join(HISTORY_FILE),
            pid_file: runtime_dir.join(PID_FILE),
            log_file: data_dir.join(LOG_DIR).join(LOG_FILE),
        }
    }

    /// All paths rooted in one directory; used by tests and portable setups.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            config_file: dir.join(CONFIG_FILE),
            history_file: dir.join(HISTORY_FILE),
            pid_file: dir.join(PID_FILE),
            log_file: dir.join(LOG_DIR).join(LOG_FILE),
        }
    }
}
