use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::PersistenceError;
use crate::models::ClipboardEntry;
use crate::storage::write_atomic;

// ============================================================================
// HISTORY FILE
// ============================================================================

/// On-disk form of the history: a JSON array, most-recent-first.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, entries: &[ClipboardEntry]) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &json)?;
        debug!(count = entries.len(), "saved clipboard history");
        Ok(())
    }

    /// Never fails: a missing file is an empty history, and an unreadable or
    /// malformed one is logged and treated as empty.
    pub fn load(&self) -> Vec<ClipboardEntry> {
        match self.try_load() {
            Ok(entries) => entries,
            Err(err) => {
                error!(path = %self.path.display(), "failed to load clipboard history: {err}");
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<ClipboardEntry>, PersistenceError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PersistenceError::io(&self.path, err)),
        };

        let entries: Vec<ClipboardEntry> = serde_json::from_str(&json)?;
        info!(count = entries.len(), "loaded clipboard history");
        Ok(entries)
    }
}
