use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LogLevel;

// ============================================================================
// TRACING SETUP
// ============================================================================

/// Present only when the level follows the config file, i.e. neither
/// `RUST_LOG` nor `--log-level` pinned it at startup.
static LEVEL_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise
/// `level` applies, and when `pinned` is false later config reloads may
/// change it through [`follow_config_level`].
///
/// Logs go to stderr, or to `log_file` through a non-blocking writer whose
/// guard must be kept alive until exit. Calling this twice is harmless; the
/// second subscriber is discarded.
pub fn init(level: LogLevel, pinned: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let follows_config = !pinned && from_env.is_none();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(level.as_filter()));
    let (filter, handle) = reload::Layer::new(filter);

    let file = log_file.and_then(|path| {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty())?;
        let name = path.file_name()?;
        if let Err(err) = fs::create_dir_all(dir) {
            eprintln!("cannot create log directory {}: {err}", dir.display());
            return None;
        }
        Some(tracing_appender::rolling::never(dir, name))
    });

    let (writer, guard, ansi) = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard), false)
        }
        None => (BoxMakeWriter::new(io::stderr), None, true),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false),
        )
        .try_init()
        .is_ok();

    if installed && follows_config {
        let _ = LEVEL_HANDLE.set(handle);
    }
    guard
}

/// Apply a level read from the config file. No-op when the level was pinned
/// at startup or logging was never initialized. Returns whether it applied.
pub fn follow_config_level(level: LogLevel) -> bool {
    let Some(handle) = LEVEL_HANDLE.get() else {
        return false;
    };
    match handle.reload(EnvFilter::new(level.as_filter())) {
        Ok(()) => {
            tracing::debug!(%level, "log level updated");
            true
        }
        Err(err) => {
            eprintln!("cannot change log level: {err}");
            false
        }
    }
}
