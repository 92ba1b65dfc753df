use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{debug, error, warn};

use crate::error::PersistenceError;
use crate::models::ClipboardEntry;
use crate::storage::HistoryFile;

type Snapshot = Box<dyn Fn() -> Vec<ClipboardEntry> + Send + Sync>;

#[derive(Default)]
struct State {
    pending: bool,
    shutdown: bool,
}

struct Shared {
    file: HistoryFile,
    snapshot: Snapshot,
    debounce: Duration,
    state: Mutex<State>,
    wake: Condvar,
    // Held for the duration of every disk write.
    writer: Mutex<()>,
}

impl Shared {
    fn write_now(&self) -> Result<(), PersistenceError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = (self.snapshot)();
        self.file.save(&entries).inspect_err(|err| {
            error!("failed to save clipboard history: {err}");
        })
    }
}

/// Debounced background writer for the history file.
///
/// `schedule()` only raises a flag; a single worker thread waits out the
/// debounce window and then writes one snapshot, so bursts of mutations
/// collapse into one write and writes never overlap.
pub struct Persister {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Persister {
    pub fn spawn<F>(file: HistoryFile, debounce: Duration, snapshot: F) -> Arc<Self>
    where
        F: Fn() -> Vec<ClipboardEntry> + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            file,
            snapshot: Box::new(snapshot),
            debounce,
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            writer: Mutex::new(()),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("cliplet-persist".into())
            .spawn(move || run_worker(&worker_shared))
            .map_err(|err| warn!("persistence worker unavailable, saves happen on flush only: {err}"))
            .ok();

        Arc::new(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    pub fn schedule(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = true;
        self.shared.wake.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
    }

    /// Write the current history immediately, bypassing the debounce.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending = false;
        self.shared.write_now()
    }

    /// Tell the worker thread to exit without writing pending changes; call
    /// [`flush`](Self::flush) or [`flush_within`](Self::flush_within) after.
    /// Returns at once. A write already in progress is finished by the worker
    /// and any later flush queues behind it on the writer lock.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.shutdown = true;
        self.shared.wake.notify_all();
    }

    fn join_worker(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                error!("persistence worker panicked");
            }
        }
    }

    /// Wait for the worker to exit, then flush, all on a helper thread, and
    /// give up after `grace`. Returns false when the deadline passed before
    /// the write completed.
    pub fn flush_within(self: &Arc<Self>, grace: Duration) -> bool {
        let (done_tx, done_rx) = bounded(1);
        let persister = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("cliplet-flush".into())
            .spawn(move || {
                persister.join_worker();
                let _ = done_tx.send(persister.flush().is_ok());
            });

        if let Err(err) = spawned {
            error!("could not start flush thread: {err}");
            return false;
        }

        match done_rx.recv_timeout(grace) {
            Ok(saved) => saved,
            Err(RecvTimeoutError::Timeout) => {
                error!(grace_ms = grace.as_millis() as u64, "history flush exceeded grace period");
                false
            }
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

fn run_worker(shared: &Shared) {
    loop {
        let state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = shared
            .wake
            .wait_while(state, |s| !s.pending && !s.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        if state.shutdown {
            return;
        }

        // Let further schedule() calls within the window pile onto this write.
        let (mut state, _) = shared
            .wake
            .wait_timeout_while(state, shared.debounce, |s| !s.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        if state.shutdown {
            return;
        }
        state.pending = false;
        drop(state);

        debug!("writing debounced history snapshot");
        let _ = shared.write_now();
    }
}
