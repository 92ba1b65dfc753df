//! Privacy decisions. Everything here is a pure function of its inputs.

use crate::config::Config;
use crate::utils::{PASSWORD_MARKERS, PASSWORD_MAX_LENGTH};

/// True when any non-empty token in `excluded_apps` occurs in `app_name`,
/// ignoring case.
pub fn is_excluded<I, S>(app_name: &str, excluded_apps: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let app = app_name.to_lowercase();
    excluded_apps.into_iter().any(|token| {
        let token = token.as_ref().trim();
        !token.is_empty() && app.contains(&token.to_lowercase())
    })
}

/// Short strings with punctuation typical of generated passwords.
pub fn looks_like_password(content: &str) -> bool {
    content.chars().count() < PASSWORD_MAX_LENGTH
        && content.chars().any(|c| PASSWORD_MARKERS.contains(c))
}

/// Whether clipboard `content` copied from `source_app` may be recorded.
/// An unknown source app is never excluded by name.
pub fn admits(content: &str, source_app: Option<&str>, config: &Config) -> bool {
    if !config.monitor_clipboard {
        return false;
    }
    if let Some(app) = source_app {
        if is_excluded(app, &config.excluded_apps) {
            return false;
        }
    }
    !(config.exclude_passwords && looks_like_password(content))
}
