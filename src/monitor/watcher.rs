use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::clipboard::{ClipboardSource, FocusResolver};
use crate::config::ConfigStore;
use crate::error::ClipboardError;
use crate::events::{Subscribers, Subscription};
use crate::monitor::ChangeNotifier;
use crate::utils::truncate_chars;

/// Published whenever the clipboard holds new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChanged {
    pub content: String,
    pub source_app: Option<String>,
}

/// Messages that interrupt the loop's wait between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Changed,
    Stop,
}

// ============================================================================
// POLLER
// ============================================================================

/// One read-debounce-publish step. Owned by the watch thread.
pub struct Poller {
    source: Arc<dyn ClipboardSource>,
    focus: Arc<dyn FocusResolver>,
    config: Arc<ConfigStore>,
    subscribers: Subscribers<ContentChanged>,
    last_raw: Option<String>,
}

impl Poller {
    pub fn tick(&mut self) {
        let config = self.config.snapshot();
        if !config.monitor_clipboard {
            return;
        }

        let raw = match self.source.read_text() {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(err) => {
                warn!("clipboard read failed: {err}");
                return;
            }
        };

        let content = truncate_chars(&raw, config.max_content_length);
        if self.last_raw.as_deref() == Some(content) {
            return;
        }
        self.last_raw = Some(content.to_string());
        if content.trim().is_empty() {
            return;
        }

        let source_app = self.focus.focused_app().unwrap_or_else(|err| {
            debug!("could not resolve focused application: {err}");
            None
        });

        self.subscribers.publish(&ContentChanged {
            content: content.to_string(),
            source_app,
        });
    }
}

// ============================================================================
// CLIPBOARD WATCHER
// ============================================================================

struct Running {
    wake: Sender<Wake>,
    handle: JoinHandle<()>,
    notifier: Option<ChangeNotifier>,
}

/// Owns the single clipboard polling thread.
pub struct ClipboardWatcher {
    source: Arc<dyn ClipboardSource>,
    focus: Arc<dyn FocusResolver>,
    config: Arc<ConfigStore>,
    subscribers: Subscribers<ContentChanged>,
    change_events: bool,
    running: Mutex<Option<Running>>,
}

impl ClipboardWatcher {
    pub fn new(
        source: Arc<dyn ClipboardSource>,
        focus: Arc<dyn FocusResolver>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            source,
            focus,
            config,
            subscribers: Subscribers::new(),
            change_events: false,
            running: Mutex::new(None),
        }
    }

    /// Also wake on `wl-paste --watch` notifications instead of relying on
    /// the poll interval alone.
    pub fn with_change_events(mut self, enabled: bool) -> Self {
        self.set_change_events(enabled);
        self
    }

    /// Takes effect on the next `start`.
    pub fn set_change_events(&mut self, enabled: bool) {
        self.change_events = enabled;
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ContentChanged) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// A fresh poller sharing this watcher's source and subscribers.
    pub fn poller(&self) -> Poller {
        Poller {
            source: Arc::clone(&self.source),
            focus: Arc::clone(&self.focus),
            config: Arc::clone(&self.config),
            subscribers: self.subscribers.clone(),
            last_raw: None,
        }
    }

    pub fn start(&self) -> Result<(), ClipboardError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            warn!("clipboard watcher already running");
            return Ok(());
        }

        let (wake_tx, wake_rx) = unbounded();
        let notifier = if self.change_events {
            ChangeNotifier::spawn(wake_tx.clone())
        } else {
            None
        };

        let poller = self.poller();
        let config = Arc::clone(&self.config);
        let spawned = thread::Builder::new()
            .name("cliplet-watch".into())
            .spawn(move || watch_loop(poller, &config, &wake_rx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                if let Some(notifier) = notifier {
                    notifier.shutdown();
                }
                return Err(ClipboardError::Unavailable(format!(
                    "failed to spawn watcher: {err}"
                )));
            }
        };

        info!(
            interval_secs = self.config.snapshot().check_interval,
            change_events = notifier.is_some(),
            "clipboard watcher started"
        );
        *running = Some(Running {
            wake: wake_tx,
            handle,
            notifier,
        });
        Ok(())
    }

    /// Halt the loop. A read already in progress finishes; no read starts
    /// after this returns.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        let _ = running.wake.send(Wake::Stop);
        if running.handle.join().is_err() {
            warn!("clipboard watcher thread panicked");
        }
        if let Some(notifier) = running.notifier {
            notifier.shutdown();
        }
        info!("clipboard watcher stopped");
    }

    /// Put `text` on the system clipboard. The watch loop records it like any
    /// other change.
    pub fn set_clipboard(&self, text: &str) -> Result<(), ClipboardError> {
        self.source.write_text(text)
    }
}

impl Drop for ClipboardWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(mut poller: Poller, config: &ConfigStore, wake: &Receiver<Wake>) {
    loop {
        let interval = config.snapshot().poll_interval();
        match wake.recv_timeout(interval) {
            Ok(Wake::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Wake::Changed) | Err(RecvTimeoutError::Timeout) => {}
        }

        // Collapse queued notifications into this one read; a queued stop wins.
        if wake.try_iter().any(|w| w == Wake::Stop) {
            break;
        }
        poller.tick();
    }
    debug!("watch loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    struct ScriptedClipboard {
        reads: Mutex<VecDeque<Result<Option<String>, ClipboardError>>>,
        written: Mutex<Vec<String>>,
    }

    impl ScriptedClipboard {
        fn new(reads: Vec<Result<Option<String>, ClipboardError>>) -> Arc<Self> {
            Arc::new(Self {
                reads: Mutex::new(reads.into()),
                written: Mutex::new(Vec::new()),
            })
        }
    }

    impl ClipboardSource for ScriptedClipboard {
        fn read_text(&self) -> Result<Option<String>, ClipboardError> {
            self.reads.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
            self.written.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct FixedFocus(Option<&'static str>);

    impl FocusResolver for FixedFocus {
        fn focused_app(&self) -> Result<Option<String>, ClipboardError> {
            match self.0 {
                Some("<error>") => Err(ClipboardError::Read("no compositor".into())),
                app => Ok(app.map(String::from)),
            }
        }
    }

    fn text(s: &str) -> Result<Option<String>, ClipboardError> {
        Ok(Some(s.to_string()))
    }

    fn watcher_with(
        source: Arc<ScriptedClipboard>,
        focus: Option<&'static str>,
        config: Config,
    ) -> (ClipboardWatcher, Arc<Mutex<Vec<ContentChanged>>>) {
        let watcher = ClipboardWatcher::new(
            source,
            Arc::new(FixedFocus(focus)),
            Arc::new(ConfigStore::in_memory(config)),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        // Handle intentionally dropped: the callback stays registered.
        let _ = watcher.subscribe(move |event: &ContentChanged| {
            sink.lock().unwrap().push(event.clone());
        });
        (watcher, seen)
    }

    #[test]
    fn repeated_raw_reads_are_debounced() {
        let source = ScriptedClipboard::new(vec![text("a"), text("a"), text("b"), text("a")]);
        let (watcher, seen) = watcher_with(source, Some("term"), Config::default());

        let mut poller = watcher.poller();
        for _ in 0..4 {
            poller.tick();
        }

        let contents: Vec<_> = seen.lock().unwrap().iter().map(|e| e.content.clone()).collect();
        assert_eq!(contents, ["a", "b", "a"]);
        assert_eq!(seen.lock().unwrap()[0].source_app.as_deref(), Some("term"));
    }

    #[test]
    fn read_errors_do_not_stop_polling() {
        let source = ScriptedClipboard::new(vec![
            Err(ClipboardError::Read("busy".into())),
            Ok(None),
            text("after"),
        ]);
        let (watcher, seen) = watcher_with(source, None, Config::default());

        let mut poller = watcher.poller();
        for _ in 0..3 {
            poller.tick();
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn content_is_truncated_and_focus_errors_mean_unknown() {
        let long = "x".repeat(150);
        let source = ScriptedClipboard::new(vec![text(&long)]);
        let config = Config {
            max_content_length: 100,
            ..Config::default()
        };
        let (watcher, seen) = watcher_with(source, Some("<error>"), config);

        watcher.poller().tick();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].content.len(), 100);
        assert_eq!(seen[0].source_app, None);
    }

    #[test]
    fn paused_monitoring_skips_reads() {
        let source = ScriptedClipboard::new(vec![text("hidden")]);
        let config = Config {
            monitor_clipboard: false,
            ..Config::default()
        };
        let (watcher, seen) = watcher_with(Arc::clone(&source), None, config);

        watcher.poller().tick();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(source.reads.lock().unwrap().len(), 1);
    }

    #[test]
    fn start_and_stop_the_loop() {
        let source = ScriptedClipboard::new(vec![text("one"), text("two")]);
        let config = Config {
            check_interval: 0.01,
            ..Config::default()
        };
        let (watcher, seen) = watcher_with(source, None, config);

        watcher.start().unwrap();
        assert!(watcher.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        watcher.stop();
        assert!(!watcher.is_running());
        assert_eq!(seen.lock().unwrap().len(), 2);
        // Stopping twice is harmless.
        watcher.stop();
    }

    #[test]
    fn stop_is_prompt_with_long_interval() {
        let source = ScriptedClipboard::new(Vec::new());
        let config = Config {
            check_interval: 60.0,
            ..Config::default()
        };
        let (watcher, _) = watcher_with(source, None, config);

        watcher.start().unwrap();
        let started = Instant::now();
        watcher.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn set_clipboard_goes_through_the_source() {
        let source = ScriptedClipboard::new(Vec::new());
        let (watcher, _) = watcher_with(Arc::clone(&source), None, Config::default());

        watcher.set_clipboard("pasted").unwrap();
        assert_eq!(*source.written.lock().unwrap(), ["pasted"]);
    }
}
