use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigIssue, KEYS};
use crate::error::ConfigError;
use crate::storage::write_atomic;

// ============================================================================
// CONFIG STORE
// ============================================================================

/// Process-wide settings. Readers take an `Arc<Config>` snapshot; every
/// change builds a new `Config` and swaps it in whole, so a reader never
/// observes a half-applied update.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Defaults, backed by `path` for later `load`/`save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            current: RwLock::new(Arc::new(Config::default())),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, key: &str, default: Value) -> Value {
        self.snapshot().value_of(key).unwrap_or(default)
    }

    /// Validate and store a single key. An invalid value leaves the
    /// configuration untouched.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Config::clone(&current);
        next.apply(key, &value)?;
        debug!(key, %value, "configuration updated");
        *current = Arc::new(next);
        Ok(())
    }

    pub fn replace(&self, config: Config) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Read the backing file and merge it over the defaults. A missing file
    /// yields the defaults. Returns the keys that were replaced by defaults.
    pub fn load(&self) -> Result<Vec<ConfigIssue>, ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(Vec::new());
        };

        let (config, issues) = read_config(path)?;
        self.replace(config);
        Ok(issues)
    }

    /// Re-read the file and swap the result in. On failure the running
    /// configuration is kept.
    pub fn reload(&self) -> Result<Vec<ConfigIssue>, ConfigError> {
        info!("reloading configuration");
        match self.load() {
            Ok(issues) => {
                info!(issues = issues.len(), "configuration reloaded");
                Ok(issues)
            }
            Err(err) => {
                warn!("keeping previous configuration: {err}");
                Err(err)
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(&*self.snapshot())
            .map_err(|err| ConfigError::Write(err.into()))?;
        write_atomic(path, &json)?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn reset(&self) {
        self.replace(Config::default());
        info!("configuration reset to defaults");
    }

    pub fn reset_key(&self, key: &str) -> Result<(), ConfigError> {
        if !KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        let default = Config::default()
            .value_of(key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        self.set(key, default)
    }

    /// Re-check every key of the running configuration, substituting defaults
    /// for anything out of range.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let (config, issues) = Config::from_map(&current.to_map());
        if !issues.is_empty() {
            *current = Arc::new(config);
        }
        issues
    }
}

/// Parse a config file without installing it; used by `--check-config`.
pub fn read_config(path: &Path) -> Result<(Config, Vec<ConfigIssue>), ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no configuration file, using defaults");
            return Ok((Config::default(), Vec::new()));
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let map = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: "top level is not an object".to_string(),
            });
        }
        Err(err) => {
            return Err(ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
        }
    };

    Ok(Config::from_map(&map))
}
