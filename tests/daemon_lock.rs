use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::Read;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cliplet::clipboard::{ClipboardSource, FocusResolver};
use cliplet::config::{AppPaths, Config, ConfigStore};
use cliplet::daemon::{Daemon, DaemonCommand, DaemonState, LockRecord, Shutdown};
use cliplet::error::{ClipboardError, ConfigError, DaemonError, LockError};
use cliplet::storage::HistoryFile;

/// Hands out queued texts, then keeps returning the last one.
struct QueuedClipboard {
    texts: Mutex<VecDeque<String>>,
    current: Mutex<Option<String>>,
}

impl QueuedClipboard {
    fn new(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(texts.iter().map(|t| t.to_string()).collect()),
            current: Mutex::new(None),
        })
    }
}

impl ClipboardSource for QueuedClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        let mut current = self.current.lock().unwrap();
        if let Some(next) = self.texts.lock().unwrap().pop_front() {
            *current = Some(next);
        }
        Ok(current.clone())
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.texts.lock().unwrap().push_back(text.to_string());
        Ok(())
    }
}

struct NoFocus;

impl FocusResolver for NoFocus {
    fn focused_app(&self) -> Result<Option<String>, ClipboardError> {
        Ok(None)
    }
}

fn fast_config() -> Arc<ConfigStore> {
    Arc::new(ConfigStore::in_memory(Config {
        check_interval: 0.02,
        ..Config::default()
    }))
}

fn daemon_in(paths: &AppPaths, texts: &[&str]) -> Daemon {
    Daemon::new(
        paths,
        fast_config(),
        QueuedClipboard::new(texts),
        Arc::new(NoFocus),
    )
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn second_instance_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());

    let mut first = daemon_in(&paths, &[]);
    first.start().unwrap();
    assert_eq!(first.state(), DaemonState::Running);

    let mut second = daemon_in(&paths, &[]);
    let err = second.start().unwrap_err();
    match &err {
        DaemonError::Lock(LockError::AlreadyRunning { pid, .. }) => {
            assert_eq!(*pid, std::process::id() as i32);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_ne!(err.exit_code(), 0);
    assert_eq!(second.state(), DaemonState::Stopped);

    // The refused instance must not have touched the holder's record.
    assert!(paths.pid_file.exists());
    assert_eq!(first.stop(), Shutdown::Clean);
    assert!(!paths.pid_file.exists());
}

#[test]
fn stale_lock_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());

    let mut exited = Command::new("true").spawn().unwrap();
    let dead = exited.id();
    exited.wait().unwrap();
    fs::write(&paths.pid_file, dead.to_string()).unwrap();

    let mut daemon = daemon_in(&paths, &[]);
    daemon.start().unwrap();
    assert_eq!(
        LockRecord::new(&paths.pid_file).read_pid(),
        Some(std::process::id() as i32)
    );
    assert_eq!(daemon.stop(), Shutdown::Clean);
}

#[test]
fn clipboard_changes_are_recorded_and_flushed_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());

    let mut daemon = daemon_in(&paths, &["hello", "hello", "world"]);
    daemon.start().unwrap();
    let history = daemon.history();
    assert!(wait_for(|| history.len() == 2));

    assert_eq!(daemon.stop(), Shutdown::Clean);
    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert!(!daemon.watcher().is_running());

    let saved: Vec<_> = HistoryFile::new(&paths.history_file)
        .load()
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert_eq!(saved, ["world", "hello"]);

    // A restarted daemon picks up where the last one left off.
    let mut restarted = daemon_in(&paths, &[]);
    restarted.start().unwrap();
    assert_eq!(restarted.history().len(), 2);
    assert_eq!(restarted.history().get(Some(1))[0].content, "world");
    restarted.stop();
}

#[test]
fn shutdown_command_ends_wait() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());

    let mut daemon = daemon_in(&paths, &["queued"]);
    daemon.start().unwrap();

    let commands = daemon.commands();
    commands.send(DaemonCommand::Reload).unwrap();
    commands.send(DaemonCommand::Shutdown).unwrap();

    assert_eq!(daemon.wait(), Shutdown::Clean);
    assert!(!paths.pid_file.exists());
}

#[test]
fn reload_swaps_in_the_new_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());
    fs::write(&paths.config_file, r#"{"check_interval": 0.1}"#).unwrap();

    let config = Arc::new(ConfigStore::new(&paths.config_file));
    config.load().unwrap();
    let mut daemon = Daemon::new(
        &paths,
        Arc::clone(&config),
        QueuedClipboard::new(&[]),
        Arc::new(NoFocus),
    );
    daemon.start().unwrap();

    fs::write(
        &paths.config_file,
        r#"{"check_interval": 0.1, "monitor_clipboard": false}"#,
    )
    .unwrap();
    daemon.reload();
    assert!(!daemon.config().snapshot().monitor_clipboard);

    // A broken file keeps the running configuration.
    fs::write(&paths.config_file, "{ not json").unwrap();
    daemon.reload();
    assert!(!daemon.config().snapshot().monitor_clipboard);
    assert_eq!(daemon.config().snapshot().check_interval, 0.1);

    daemon.stop();
}

#[test]
fn stalled_final_flush_is_forced_within_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());

    let mut daemon = daemon_in(&paths, &[]).with_grace_period(Duration::from_millis(200));
    daemon.start().unwrap();

    // The history write goes through this sibling; a FIFO with no reader
    // blocks the open.
    let staging = dir
        .path()
        .join(format!("history.json.{}.tmp", std::process::id()));
    let status = Command::new("mkfifo").arg(&staging).status().unwrap();
    assert!(status.success());

    let started = Instant::now();
    let outcome = daemon.stop();

    assert_eq!(outcome, Shutdown::Forced);
    assert_eq!(outcome.exit_code(), 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert!(!paths.pid_file.exists());

    // Release the stalled writer.
    let mut drained = Vec::new();
    File::open(&staging)
        .unwrap()
        .read_to_end(&mut drained)
        .unwrap();
}

#[test]
fn unreadable_config_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());
    fs::create_dir(&paths.config_file).unwrap();

    let mut daemon = Daemon::new(
        &paths,
        Arc::new(ConfigStore::new(&paths.config_file)),
        QueuedClipboard::new(&[]),
        Arc::new(NoFocus),
    );
    let err = daemon.start().unwrap_err();

    assert!(matches!(err, DaemonError::Config(ConfigError::Read { .. })));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert!(!paths.pid_file.exists());
}

#[test]
fn malformed_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());
    fs::write(&paths.config_file, "[1, 2").unwrap();

    let config = Arc::new(ConfigStore::new(&paths.config_file));
    let mut daemon = Daemon::new(
        &paths,
        Arc::clone(&config),
        QueuedClipboard::new(&[]),
        Arc::new(NoFocus),
    );
    daemon.start().unwrap();
    assert_eq!(*config.snapshot(), Config::default());
    daemon.stop();
}

#[test]
fn clear_command_empties_saved_history() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());

    let mut daemon = daemon_in(&paths, &["one", "two"]);
    daemon.start().unwrap();
    let history = daemon.history();
    assert!(wait_for(|| history.len() == 2));

    let commands = daemon.commands();
    commands.send(DaemonCommand::Clear).unwrap();
    commands.send(DaemonCommand::Shutdown).unwrap();

    assert_eq!(daemon.wait(), Shutdown::Clean);
    assert!(history.is_empty());
    assert!(HistoryFile::new(&paths.history_file).load().is_empty());
    assert!(paths.history_file.exists());
}
