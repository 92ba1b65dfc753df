use std::fs;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error, info, warn};

use crate::clipboard::{ClipboardSource, FocusResolver};
use crate::config::{AppPaths, ConfigStore};
use crate::daemon::{DaemonCommand, LockRecord, SignalListener};
use crate::error::{ConfigError, DaemonError};
use crate::events::Subscription;
use crate::history::{HistoryEvent, HistoryStore};
use crate::logging;
use crate::monitor::{ClipboardWatcher, ContentChanged};
use crate::storage::{HistoryFile, Persister};
use crate::utils::{SAVE_DEBOUNCE_MS, SHUTDOWN_GRACE_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// How the daemon came down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// History flushed and lock removed.
    Clean,
    /// The final flush overran the grace period.
    Forced,
}

impl Shutdown {
    pub fn exit_code(self) -> i32 {
        match self {
            Shutdown::Clean => 0,
            Shutdown::Forced => 1,
        }
    }
}

// ============================================================================
// DAEMON
// ============================================================================

/// Wires the watcher, store, and persister together and drives them through
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`.
pub struct Daemon {
    config: Arc<ConfigStore>,
    history: Arc<HistoryStore>,
    watcher: ClipboardWatcher,
    history_file: HistoryFile,
    lock: LockRecord,
    persister: Option<Arc<Persister>>,
    subscriptions: Vec<Subscription>,
    state: Mutex<DaemonState>,
    commands: (Sender<DaemonCommand>, Receiver<DaemonCommand>),
    debounce: Duration,
    grace: Duration,
}

impl Daemon {
    pub fn new(
        paths: &AppPaths,
        config: Arc<ConfigStore>,
        source: Arc<dyn ClipboardSource>,
        focus: Arc<dyn FocusResolver>,
    ) -> Self {
        let watcher = ClipboardWatcher::new(source, focus, Arc::clone(&config));
        Self {
            history: Arc::new(HistoryStore::new(Arc::clone(&config))),
            config,
            watcher,
            history_file: HistoryFile::new(&paths.history_file),
            lock: LockRecord::new(&paths.pid_file),
            persister: None,
            subscriptions: Vec::new(),
            state: Mutex::new(DaemonState::Stopped),
            commands: unbounded(),
            debounce: Duration::from_millis(SAVE_DEBOUNCE_MS),
            grace: Duration::from_millis(SHUTDOWN_GRACE_MS),
        }
    }

    pub fn with_change_events(mut self, enabled: bool) -> Self {
        self.watcher.set_change_events(enabled);
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> DaemonState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: DaemonState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "daemon state change");
        *state = next;
    }

    pub fn history(&self) -> Arc<HistoryStore> {
        Arc::clone(&self.history)
    }

    pub fn config(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.config)
    }

    pub fn watcher(&self) -> &ClipboardWatcher {
        &self.watcher
    }

    /// Sender for in-process control; signals arrive through the same
    /// channel.
    pub fn commands(&self) -> Sender<DaemonCommand> {
        self.commands.0.clone()
    }

    /// Take the lock, restore history, and begin watching the clipboard.
    /// Any failure leaves the daemon `Stopped` with the lock released.
    pub fn start(&mut self) -> Result<(), DaemonError> {
        if self.state() != DaemonState::Stopped {
            warn!(state = ?self.state(), "daemon already started");
            return Ok(());
        }
        self.set_state(DaemonState::Starting);

        if let Err(err) = self.lock.acquire() {
            self.set_state(DaemonState::Stopped);
            return Err(err.into());
        }

        if let Err(err) = self.start_components() {
            self.teardown_components();
            self.lock.release();
            self.set_state(DaemonState::Stopped);
            return Err(err);
        }

        self.set_state(DaemonState::Running);
        info!(
            pid = std::process::id(),
            items = self.history.len(),
            history = %self.history_file.path().display(),
            "clipboard daemon started"
        );
        Ok(())
    }

    /// Malformed files and out-of-range values fall back to defaults; only an
    /// unreadable config file stops the start.
    fn load_config(&self) -> Result<(), DaemonError> {
        match self.config.load() {
            Ok(issues) => {
                for issue in issues {
                    warn!(key = %issue.key, "{}; using default", issue.reason);
                }
                Ok(())
            }
            Err(err @ ConfigError::Malformed { .. }) => {
                warn!("{err}; using defaults");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn start_components(&mut self) -> Result<(), DaemonError> {
        self.load_config()?;
        logging::follow_config_level(self.config.snapshot().log_level);

        if let Some(dir) = self.history_file.path().parent() {
            fs::create_dir_all(dir).map_err(|e| {
                DaemonError::Startup(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        self.history.restore(self.history_file.load());

        let snapshot_source = Arc::clone(&self.history);
        let persister = Persister::spawn(self.history_file.clone(), self.debounce, move || {
            snapshot_source.get(None)
        });

        let scheduler = Arc::clone(&persister);
        self.subscriptions.push(self.history.subscribe(move |event| {
            if let HistoryEvent::Added(entry) | HistoryEvent::Updated(entry) = event {
                debug!(preview = %entry.preview(), "clipboard changed");
            }
            scheduler.schedule();
        }));
        self.persister = Some(persister);

        let history = Arc::clone(&self.history);
        self.subscriptions
            .push(self.watcher.subscribe(move |change: &ContentChanged| {
                history.add_from(&change.content, change.source_app.as_deref());
            }));

        self.watcher
            .start()
            .map_err(|e| DaemonError::Startup(e.to_string()))
    }

    fn teardown_components(&mut self) {
        self.watcher.stop();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        if let Some(persister) = self.persister.take() {
            persister.close();
        }
    }

    /// Re-read configuration; running components pick it up on their next
    /// operation.
    pub fn reload(&self) {
        match self.config.reload() {
            Ok(issues) => {
                for issue in issues {
                    warn!(key = %issue.key, "{}", issue.reason);
                }
                logging::follow_config_level(self.config.snapshot().log_level);
            }
            Err(err) => error!("configuration reload failed: {err}"),
        }
    }

    /// Empty the history; the persister writes the empty list out.
    pub fn clear(&self) {
        self.history.clear();
    }

    /// Stop watching, flush history within the grace period, and release the
    /// lock.
    pub fn stop(&mut self) -> Shutdown {
        if self.state() != DaemonState::Running {
            return Shutdown::Clean;
        }
        self.set_state(DaemonState::Stopping);
        info!("shutting down clipboard daemon");

        // The watcher must be fully stopped before the final flush begins.
        self.watcher.stop();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }

        let outcome = match self.persister.take() {
            Some(persister) => {
                persister.close();
                if persister.flush_within(self.grace) {
                    Shutdown::Clean
                } else {
                    error!("history may not have been saved; exiting anyway");
                    Shutdown::Forced
                }
            }
            None => Shutdown::Clean,
        };

        self.lock.release();
        self.set_state(DaemonState::Stopped);
        info!(?outcome, "clipboard daemon stopped");
        outcome
    }

    /// Block until a shutdown command arrives, serving other commands
    /// meanwhile.
    pub fn wait(&mut self) -> Shutdown {
        while let Ok(command) = self.commands.1.recv() {
            match command {
                DaemonCommand::Reload => self.reload(),
                DaemonCommand::Clear => self.clear(),
                DaemonCommand::Shutdown => break,
            }
        }
        self.stop()
    }

    /// Full foreground lifecycle with signal handling.
    pub fn run(&mut self) -> Result<Shutdown, DaemonError> {
        let signals = SignalListener::start(self.commands()).map_err(DaemonError::Signals)?;
        if let Err(err) = self.start() {
            signals.close();
            return Err(err);
        }

        let outcome = self.wait();
        signals.close();
        Ok(outcome)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.state() == DaemonState::Running {
            self.stop();
        }
    }
}
