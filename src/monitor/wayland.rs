use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::monitor::Wake;

// ============================================================================
// WAYLAND CHANGE NOTIFIER
// ============================================================================

/// Runs `wl-paste --watch echo CHANGED` and turns each line into a wakeup
/// for the watch loop, so changes are picked up without waiting for the
/// next poll.
pub struct ChangeNotifier {
    child: Child,
    reader: Option<JoinHandle<()>>,
}

impl ChangeNotifier {
    pub fn spawn(wake: Sender<Wake>) -> Option<Self> {
        let mut child = match Command::new("wl-paste")
            .arg("--watch")
            .arg("echo")
            .arg("CHANGED")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!("wl-paste watcher unavailable, polling only: {err}");
                return None;
            }
        };

        let stdout = child.stdout.take()?;
        let reader = thread::Builder::new()
            .name("cliplet-wl-watch".into())
            .spawn(move || {
                let lines = BufReader::new(stdout).lines();
                for line in lines.map_while(Result::ok) {
                    if line.trim() == "CHANGED" && wake.send(Wake::Changed).is_err() {
                        break;
                    }
                }
                debug!("wl-paste watcher exited");
            });

        match reader {
            Ok(handle) => Some(Self {
                child,
                reader: Some(handle),
            }),
            Err(err) => {
                warn!("could not start wl-paste reader: {err}");
                let _ = child.kill();
                let _ = child.wait();
                None
            }
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}
