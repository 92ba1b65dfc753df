use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use signal_hook::consts::signal::*;
use signal_hook::iterator::{Handle, Signals};
use tracing::{info, warn};

/// Requests delivered to the daemon's main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonCommand {
    Shutdown,
    Reload,
    Clear,
}

// ============================================================================
// SIGNAL LISTENER
// ============================================================================

/// Translates SIGTERM/SIGINT into `Shutdown`, SIGHUP into `Reload`, and
/// SIGUSR1 into `Clear`.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    pub fn start(commands: Sender<DaemonCommand>) -> io::Result<Self> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP, SIGUSR1])?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("cliplet-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    let command = match signal {
                        SIGHUP => DaemonCommand::Reload,
                        SIGUSR1 => DaemonCommand::Clear,
                        _ => DaemonCommand::Shutdown,
                    };
                    info!(signal, ?command, "received signal");
                    if commands.send(command).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn close(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("signal listener panicked");
            }
        }
    }
}
