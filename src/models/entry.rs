use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::{PREVIEW_LENGTH, preview};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    File,
}

/// One recorded clipboard value.
///
/// `id` is assigned per process and never written to disk; the persisted
/// record is `{content, content_type, timestamp}` plus `source_app` when known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
}

impl ClipboardEntry {
    pub fn new_text(content: String, source_app: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            content_type: ContentType::Text,
            timestamp: Utc::now(),
            source_app,
        }
    }

    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.timestamp)
    }

    pub fn preview(&self) -> String {
        match self.content_type {
            ContentType::Text => preview(&self.content, PREVIEW_LENGTH),
            other => format!(
                "[{:?} - {}]",
                other,
                self.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S")
            ),
        }
    }

    pub fn metadata_label(&self) -> String {
        let when = self
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M");
        match &self.source_app {
            Some(app) => format!("{} chars, {} from {}", self.content.chars().count(), when, app),
            None => format!("{} chars, {}", self.content.chars().count(), when),
        }
    }
}
