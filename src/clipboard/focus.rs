use std::env;
use std::process::{Command, Stdio};

use serde_json::Value;

use crate::error::ClipboardError;

// ============================================================================
// FOCUSED APPLICATION
// ============================================================================

/// Names the application that currently has input focus.
pub trait FocusResolver: Send + Sync {
    /// `Ok(None)` when no window is focused or the name is unknown.
    fn focused_app(&self) -> Result<Option<String>, ClipboardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusBackend {
    Hyprland,
    X11,
    Unsupported,
}

impl FocusBackend {
    pub fn detect() -> Self {
        if env::var("HYPRLAND_INSTANCE_SIGNATURE").is_ok() {
            FocusBackend::Hyprland
        } else if env::var("DISPLAY").is_ok()
            && Command::new("xdotool").arg("version").output().is_ok()
        {
            FocusBackend::X11
        } else {
            FocusBackend::Unsupported
        }
    }
}

impl FocusResolver for FocusBackend {
    fn focused_app(&self) -> Result<Option<String>, ClipboardError> {
        match self {
            FocusBackend::Hyprland => {
                let stdout = run("hyprctl", &["activewindow", "-j"])?;
                Ok(parse_hyprland_window(&stdout))
            }
            FocusBackend::X11 => {
                let stdout = run("xdotool", &["getactivewindow", "getwindowclassname"])?;
                let name = stdout.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            FocusBackend::Unsupported => Ok(None),
        }
    }
}

fn run(program: &str, args: &[&str]) -> Result<String, ClipboardError> {
    let output = Command::new(program)
        .args(args)
        .stderr(Stdio::null())
        .output()
        .map_err(|e| ClipboardError::Read(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        return Err(ClipboardError::Read(format!(
            "{program} exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `hyprctl activewindow -j` prints `{}` when nothing is focused.
fn parse_hyprland_window(json: &str) -> Option<String> {
    let window: Value = serde_json::from_str(json).ok()?;
    ["class", "initialClass", "title"]
        .iter()
        .filter_map(|key| window.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(String::from)
}
