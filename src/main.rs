use std::env;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{error, info, warn};

use cliplet::clipboard::{ClipboardBackend, ClipboardSource, FocusBackend};
use cliplet::config::{AppPaths, ConfigStore, LogLevel, read_config};
use cliplet::daemon::{self, Daemon, LockRecord};
use cliplet::logging;
use cliplet::models::ClipboardEntry;
use cliplet::storage::HistoryFile;
use cliplet::utils::STOP_TIMEOUT_SECS;
use cliplet::VERSION;

// ============================================================================
// COMMAND LINE
// ============================================================================

#[derive(Parser)]
#[command(name = "cliplet")]
#[command(version = VERSION)]
#[command(about = "Clipboard history daemon", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL); overrides the config
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Lock record holding the daemon's PID
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    /// Persisted history file
    #[arg(long, global = true)]
    history_file: Option<PathBuf>,

    /// Detach into the background (with `run` only)
    #[arg(long, conflicts_with = "check_config")]
    daemon: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run,

    /// Print the saved history
    Show {
        /// Only the N most recent entries
        #[arg(long, short)]
        limit: Option<usize>,

        /// Emit JSON instead of a listing
        #[arg(long)]
        json: bool,

        /// Copy entry N (as numbered in the listing) to the clipboard
        #[arg(long)]
        select: Option<usize>,
    },

    /// Stop the running daemon
    Stop,

    /// Ask the running daemon to reload its configuration
    Reload,

    /// Clear the history, through the daemon when one is running
    Clear,

    /// Report whether a daemon is running
    Status,
}

impl Cli {
    fn paths(&self) -> AppPaths {
        let mut paths = AppPaths::resolve();
        if let Some(path) = &self.config {
            paths.config_file = path.clone();
        }
        if let Some(path) = &self.history_file {
            paths.history_file = path.clone();
        }
        if let Some(path) = &self.pid_file {
            paths.pid_file = path.clone();
        }
        if let Some(path) = &self.log_file {
            paths.log_file = path.clone();
        }
        paths
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn main() {
    let code = run(Cli::parse());
    std::process::exit(code);
}

fn run(cli: Cli) -> i32 {
    let paths = cli.paths();

    if cli.check_config {
        return cmd_check_config(&paths);
    }

    let command = match resolve_command(cli.daemon, cli.command) {
        Ok(command) => command,
        Err(err) => err.exit(),
    };

    // Only the log level is needed here; the daemon reloads and reports the
    // config itself when it starts.
    let config = Arc::new(ConfigStore::new(&paths.config_file));
    let _ = config.load();

    let level = cli.log_level.unwrap_or(config.snapshot().log_level);
    let _guard = logging::init(level, cli.log_level.is_some(), cli.log_file.as_deref());

    match command {
        Commands::Run if cli.daemon => cmd_detach(&paths, cli.log_file.is_some()),
        Commands::Run => cmd_run(&paths, config),
        Commands::Show {
            limit,
            json,
            select,
        } => cmd_show(&paths, limit, json, select),
        Commands::Stop => cmd_stop(&paths),
        Commands::Reload => cmd_reload(&paths),
        Commands::Clear => cmd_clear(&paths),
        Commands::Status => cmd_status(&paths),
    }
}

/// No subcommand means `run`; `--daemon` only makes sense there.
fn resolve_command(daemon: bool, command: Option<Commands>) -> Result<Commands, clap::Error> {
    let command = command.unwrap_or(Commands::Run);
    if daemon && !matches!(command, Commands::Run) {
        return Err(Cli::command().error(
            ErrorKind::ArgumentConflict,
            "--daemon can only be used with the `run` command",
        ));
    }
    Ok(command)
}

// ============================================================================
// COMMANDS
// ============================================================================

fn cmd_check_config(paths: &AppPaths) -> i32 {
    match read_config(&paths.config_file) {
        Ok((_, issues)) if issues.is_empty() => {
            println!("✓ {} is valid", paths.config_file.display());
            0
        }
        Ok((_, issues)) => {
            for issue in &issues {
                eprintln!("✗ {issue}");
            }
            2
        }
        Err(err) => {
            eprintln!("✗ {err}");
            2
        }
    }
}

fn cmd_run(paths: &AppPaths, config: Arc<ConfigStore>) -> i32 {
    if !paths.config_file.exists() {
        match config.save() {
            Ok(()) => info!(path = %paths.config_file.display(), "wrote default configuration"),
            Err(err) => warn!("could not write default configuration: {err}"),
        }
    }

    let backend = ClipboardBackend::detect();
    let focus = FocusBackend::detect();
    info!(?backend, ?focus, "clipboard backends selected");

    let mut daemon = Daemon::new(paths, config, Arc::new(backend), Arc::new(focus))
        .with_change_events(backend.has_change_events());

    match daemon.run() {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            error!("{err}");
            eprintln!("cliplet: {err}");
            err.exit_code()
        }
    }
}

/// Re-launch this binary in its own process group with stdio detached.
fn cmd_detach(paths: &AppPaths, has_log_file: bool) -> i32 {
    if let Some(pid) = LockRecord::new(&paths.pid_file).live_pid() {
        eprintln!("cliplet: already running (PID {pid})");
        return 1;
    }

    let exe = match env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            eprintln!("cliplet: cannot locate executable: {err}");
            return 1;
        }
    };

    let mut args: Vec<OsString> = env::args_os()
        .skip(1)
        .filter(|arg| arg != "--daemon")
        .collect();
    if !has_log_file {
        args.push("--log-file".into());
        args.push(paths.log_file.clone().into_os_string());
    }

    let spawned = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn();

    match spawned {
        Ok(child) => {
            println!("✓ cliplet started in background (PID {})", child.id());
            println!("✓ Logs: {}", paths.log_file.display());
            0
        }
        Err(err) => {
            eprintln!("cliplet: failed to start daemon: {err}");
            1
        }
    }
}

fn cmd_show(paths: &AppPaths, limit: Option<usize>, json: bool, select: Option<usize>) -> i32 {
    let mut entries = HistoryFile::new(&paths.history_file).load();
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    if let Some(index) = select {
        return select_entry(&entries, index);
    }

    if json {
        return match serde_json::to_string_pretty(&entries) {
            Ok(text) => {
                println!("{text}");
                0
            }
            Err(err) => {
                eprintln!("cliplet: {err}");
                1
            }
        };
    }

    if entries.is_empty() {
        println!("No clipboard history yet");
        return 0;
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{:>3}. {}", i + 1, entry.preview());
        println!("     {}", entry.metadata_label());
    }
    0
}

fn select_entry(entries: &[ClipboardEntry], index: usize) -> i32 {
    let Some(entry) = index.checked_sub(1).and_then(|i| entries.get(i)) else {
        eprintln!("cliplet: no entry {index} (history has {})", entries.len());
        return 1;
    };

    match ClipboardBackend::detect().write_text(&entry.content) {
        Ok(()) => {
            println!("✓ Copied to clipboard");
            0
        }
        Err(err) => {
            eprintln!("cliplet: {err}");
            1
        }
    }
}

fn cmd_stop(paths: &AppPaths) -> i32 {
    let lock = LockRecord::new(&paths.pid_file);
    match daemon::request_stop(&lock, Duration::from_secs(STOP_TIMEOUT_SECS)) {
        Ok(stopped) if stopped.killed => {
            println!("✓ Killed cliplet (PID {}); it ignored SIGTERM", stopped.pid);
            0
        }
        Ok(stopped) => {
            println!("✓ Stopped cliplet (PID {})", stopped.pid);
            0
        }
        Err(err) => {
            eprintln!("cliplet: {err}");
            1
        }
    }
}

fn cmd_reload(paths: &AppPaths) -> i32 {
    let lock = LockRecord::new(&paths.pid_file);
    match daemon::request_reload(&lock) {
        Ok(pid) => {
            println!("✓ Reload requested (PID {pid})");
            0
        }
        Err(err) => {
            eprintln!("cliplet: {err}");
            1
        }
    }
}

fn cmd_clear(paths: &AppPaths) -> i32 {
    let lock = LockRecord::new(&paths.pid_file);
    if lock.live_pid().is_some() {
        return match daemon::request_clear(&lock) {
            Ok(pid) => {
                println!("✓ Clear requested (PID {pid})");
                0
            }
            Err(err) => {
                eprintln!("cliplet: {err}");
                1
            }
        };
    }

    match HistoryFile::new(&paths.history_file).save(&[]) {
        Ok(()) => {
            println!("✓ Cleared {}", paths.history_file.display());
            0
        }
        Err(err) => {
            eprintln!("cliplet: {err}");
            1
        }
    }
}

fn cmd_status(paths: &AppPaths) -> i32 {
    let status = daemon::status(&LockRecord::new(&paths.pid_file));
    let items = HistoryFile::new(&paths.history_file).load().len();

    match (status.running, status.pid) {
        (true, Some(pid)) => println!("✓ cliplet is running (PID {pid})"),
        (false, Some(pid)) => println!("✗ cliplet is not running (stale lock for PID {pid})"),
        _ => println!("✗ cliplet is not running"),
    }
    println!("  Lock file: {}", status.pid_file.display());
    println!("  History:   {} ({items} items)", paths.history_file.display());

    if status.running { 0 } else { 3 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(args: &[&str]) -> Result<Commands, ErrorKind> {
        let cli = Cli::try_parse_from(args).map_err(|e| e.kind())?;
        resolve_command(cli.daemon, cli.command).map_err(|e| e.kind())
    }

    #[test]
    fn daemon_flag_is_rejected_outside_run() {
        for command in ["stop", "status", "reload", "clear", "show"] {
            assert_eq!(
                resolve(&["cliplet", "--daemon", command]).err(),
                Some(ErrorKind::ArgumentConflict),
                "{command}"
            );
        }
        assert_eq!(
            resolve(&["cliplet", "--daemon", "--check-config"]).err(),
            Some(ErrorKind::ArgumentConflict)
        );
    }

    #[test]
    fn daemon_flag_is_accepted_with_run() {
        assert!(matches!(resolve(&["cliplet", "--daemon"]), Ok(Commands::Run)));
        assert!(matches!(
            resolve(&["cliplet", "--daemon", "run"]),
            Ok(Commands::Run)
        ));
        assert!(matches!(resolve(&["cliplet", "stop"]), Ok(Commands::Stop)));
    }
}
