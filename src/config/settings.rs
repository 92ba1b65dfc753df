use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ConfigError;

// ============================================================================
// SCHEMA
// ============================================================================

pub const KEYS: &[&str] = &[
    "popup_width",
    "popup_height",
    "popup_items_visible",
    "auto_hide_delay",
    "max_history_items",
    "auto_cleanup_days",
    "excluded_apps",
    "log_level",
    "monitor_clipboard",
    "check_interval",
    "max_content_length",
    "exclude_passwords",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!(
                "`{other}` is not one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// A key whose stored value was rejected and replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub key: String,
    pub reason: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Fully validated settings. Every field is always within its documented
/// range once it has passed through [`Config::from_map`] or [`Config::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub popup_width: i64,
    pub popup_height: i64,
    pub popup_items_visible: i64,
    pub auto_hide_delay: i64,
    pub max_history_items: usize,
    pub auto_cleanup_days: i64,
    pub excluded_apps: BTreeSet<String>,
    pub log_level: LogLevel,
    pub monitor_clipboard: bool,
    pub check_interval: f64,
    pub max_content_length: usize,
    pub exclude_passwords: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            popup_width: 400,
            popup_height: 300,
            popup_items_visible: 8,
            auto_hide_delay: 10,
            max_history_items: 50,
            auto_cleanup_days: 7,
            excluded_apps: BTreeSet::new(),
            log_level: LogLevel::Info,
            monitor_clipboard: true,
            check_interval: 1.0,
            max_content_length: 10_000,
            exclude_passwords: true,
        }
    }
}

impl Config {
    /// Merge `map` over the defaults. Bad values fall back to the default for
    /// that key alone and are reported as issues; unknown keys are ignored.
    pub fn from_map(map: &Map<String, Value>) -> (Self, Vec<ConfigIssue>) {
        let mut config = Self::default();
        let mut issues = Vec::new();

        for (key, value) in map {
            match config.apply(key, value) {
                Ok(()) => {}
                Err(ConfigError::UnknownKey(key)) => {
                    warn!(key = %key, "ignoring unknown configuration key");
                }
                Err(err) => {
                    warn!(key = %key, "{err}; using default");
                    issues.push(ConfigIssue {
                        key: key.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        (config, issues)
    }

    /// Validate `value` for `key` and store it. On error `self` is unchanged.
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<(), ConfigError> {
        match key {
            "popup_width" => self.popup_width = int_in(key, value, 250, 600)?,
            "popup_height" => self.popup_height = int_in(key, value, 200, 600)?,
            "popup_items_visible" => self.popup_items_visible = int_in(key, value, 3, 15)?,
            "auto_hide_delay" => self.auto_hide_delay = int_in(key, value, 1, 60)?,
            "max_history_items" => self.max_history_items = int_in(key, value, 10, 100)? as usize,
            "auto_cleanup_days" => self.auto_cleanup_days = int_in(key, value, 1, 30)?,
            "excluded_apps" => self.excluded_apps = string_set(key, value)?,
            "log_level" => {
                let name = value.as_str().ok_or_else(|| invalid(key, "expected a string"))?;
                self.log_level = name.parse().map_err(|reason: String| invalid(key, &reason))?;
            }
            "monitor_clipboard" => self.monitor_clipboard = boolean(key, value)?,
            "check_interval" => self.check_interval = float_in(key, value, 0.1, 60.0)?,
            "max_content_length" => {
                self.max_content_length = int_in(key, value, 100, 100_000)? as usize
            }
            "exclude_passwords" => self.exclude_passwords = boolean(key, value)?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Value of a single key, as stored in the config file.
    pub fn value_of(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove(key),
            _ => None,
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.auto_cleanup_days)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn int_in(key: &str, value: &Value, min: i64, max: i64) -> Result<i64, ConfigError> {
    let n = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        _ => None,
    }
    .ok_or_else(|| invalid(key, "expected an integer"))?;

    if !(min..=max).contains(&n) {
        return Err(invalid(key, &format!("{n} is outside [{min}, {max}]")));
    }
    Ok(n)
}

fn float_in(key: &str, value: &Value, min: f64, max: f64) -> Result<f64, ConfigError> {
    let n = value
        .as_f64()
        .ok_or_else(|| invalid(key, "expected a number"))?;
    if !(min..=max).contains(&n) {
        return Err(invalid(key, &format!("{n} is outside [{min}, {max}]")));
    }
    Ok(n)
}

fn boolean(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| invalid(key, "expected true or false"))
}

fn string_set(key: &str, value: &Value) -> Result<BTreeSet<String>, ConfigError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(key, "expected a list of strings"))?;

    let mut set = BTreeSet::new();
    for item in items {
        let name = item
            .as_str()
            .ok_or_else(|| invalid(key, "expected a list of strings"))?;
        let name = name.trim();
        if !name.is_empty() {
            set.insert(name.to_string());
        }
    }
    Ok(set)
}
