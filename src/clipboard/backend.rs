use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

use arboard::Clipboard;

use crate::error::ClipboardError;

// ============================================================================
// CLIPBOARD SOURCE
// ============================================================================

/// Read/write access to the system clipboard's text content.
pub trait ClipboardSource: Send + Sync {
    /// `Ok(None)` when the clipboard holds no text.
    fn read_text(&self) -> Result<Option<String>, ClipboardError>;

    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

// ============================================================================
// CLIPBOARD BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardBackend {
    WlClipboard,
    Arboard,
}

impl ClipboardBackend {
    pub fn detect() -> Self {
        if (env::var("WAYLAND_DISPLAY").is_ok()
            || env::var("XDG_SESSION_TYPE").is_ok_and(|v| v == "wayland"))
            && Command::new("wl-paste").arg("--version").output().is_ok()
        {
            ClipboardBackend::WlClipboard
        } else {
            ClipboardBackend::Arboard
        }
    }

    /// Whether the backend can push change notifications instead of being
    /// polled.
    pub fn has_change_events(self) -> bool {
        matches!(self, ClipboardBackend::WlClipboard)
    }
}

impl ClipboardSource for ClipboardBackend {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        match self {
            ClipboardBackend::WlClipboard => {
                let output = Command::new("wl-paste")
                    .arg("--no-newline")
                    .arg("--type")
                    .arg("text")
                    .stderr(Stdio::null())
                    .output()
                    .map_err(|e| ClipboardError::Read(format!("failed to run wl-paste: {e}")))?;

                // wl-paste exits non-zero when nothing (or no text) is copied.
                if !output.status.success() {
                    return Ok(None);
                }
                String::from_utf8(output.stdout)
                    .map(Some)
                    .map_err(|e| ClipboardError::Read(format!("clipboard text is not UTF-8: {e}")))
            }
            ClipboardBackend::Arboard => {
                let mut clipboard =
                    Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
                match clipboard.get_text() {
                    Ok(text) => Ok(Some(text)),
                    Err(arboard::Error::ContentNotAvailable) => Ok(None),
                    Err(e) => Err(ClipboardError::Read(e.to_string())),
                }
            }
        }
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        match self {
            ClipboardBackend::WlClipboard => {
                let mut child = Command::new("wl-copy")
                    .arg("--type")
                    .arg("text/plain")
                    .stdin(Stdio::piped())
                    .spawn()
                    .map_err(|e| ClipboardError::Write(format!("failed to run wl-copy: {e}")))?;

                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(text.as_bytes())
                        .map_err(|e| ClipboardError::Write(format!("failed to write to wl-copy: {e}")))?;
                }

                let status = child
                    .wait()
                    .map_err(|e| ClipboardError::Write(format!("wl-copy failed: {e}")))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ClipboardError::Write(format!("wl-copy exited with {status}")))
                }
            }
            ClipboardBackend::Arboard => Clipboard::new()
                .and_then(|mut cb| cb.set_text(text))
                .map_err(|e| ClipboardError::Write(e.to_string())),
        }
    }
}
