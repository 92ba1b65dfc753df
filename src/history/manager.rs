use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Config, ConfigStore};
use crate::events::{Subscribers, Subscription};
use crate::models::ClipboardEntry;
use crate::privacy;
use crate::utils::truncate_chars;

// ============================================================================
// HISTORY EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    Added(ClipboardEntry),
    /// Same content as the head was seen again; its timestamp moved forward.
    Updated(ClipboardEntry),
    Removed(Uuid),
    Cleared,
}

// ============================================================================
// CLIPBOARD HISTORY STORE
// ============================================================================

/// Bounded, most-recent-first clipboard history.
///
/// All mutation happens under one mutex. Readers get a cloned snapshot and
/// the lock is released before subscribers are notified.
pub struct HistoryStore {
    entries: Mutex<VecDeque<ClipboardEntry>>,
    config: Arc<ConfigStore>,
    events: Subscribers<HistoryEvent>,
}

impl HistoryStore {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        let capacity = config.snapshot().max_history_items;
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            config,
            events: Subscribers::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ClipboardEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the contents with previously persisted entries, then apply
    /// the age and size limits. Blank entries are dropped and repeated
    /// content keeps only its most recent (first) occurrence.
    pub fn restore(&self, loaded: Vec<ClipboardEntry>) {
        let config = self.config.snapshot();
        let mut seen = HashSet::new();
        let restored: VecDeque<_> = loaded
            .into_iter()
            .filter(|e| !e.content.trim().is_empty())
            .filter(|e| seen.insert(e.content.clone()))
            .collect();

        let mut entries = self.lock();
        *entries = restored;
        let evicted = evict(&mut entries, &config, Utc::now());
        info!(count = entries.len(), evicted, "restored clipboard history");
    }

    pub fn add(&self, content: &str) -> Option<ClipboardEntry> {
        self.insert(content, None)
    }

    /// Watcher entry point: runs the privacy checks for `source_app` against
    /// the current configuration before recording.
    pub fn add_from(&self, content: &str, source_app: Option<&str>) -> Option<ClipboardEntry> {
        if !privacy::admits(content, source_app, &self.config.snapshot()) {
            debug!(app = source_app.unwrap_or("unknown"), "clipboard content excluded");
            return None;
        }
        self.insert(content, source_app)
    }

    fn insert(&self, content: &str, source_app: Option<&str>) -> Option<ClipboardEntry> {
        let config = self.config.snapshot();
        let content = truncate_chars(content, config.max_content_length);
        if content.trim().is_empty() {
            return None;
        }

        let mut entries = self.lock();
        let (entry, refreshed) = match entries.front_mut() {
            Some(head) if head.content == content => {
                head.touch();
                if source_app.is_some() {
                    head.source_app = source_app.map(String::from);
                }
                (head.clone(), true)
            }
            _ => {
                entries.retain(|e| e.content != content);
                let entry =
                    ClipboardEntry::new_text(content.to_string(), source_app.map(String::from));
                entries.push_front(entry.clone());
                (entry, false)
            }
        };
        let evicted = evict(&mut entries, &config, Utc::now());
        let total = entries.len();
        drop(entries);

        debug!(
            chars = entry.content.chars().count(),
            total, evicted, refreshed, "recorded clipboard entry"
        );
        let event = if refreshed {
            HistoryEvent::Updated(entry.clone())
        } else {
            HistoryEvent::Added(entry.clone())
        };
        self.events.publish(&event);
        Some(entry)
    }

    /// Up to `limit` entries, most recent first. Always a copy.
    pub fn get(&self, limit: Option<usize>) -> Vec<ClipboardEntry> {
        let entries = self.lock();
        let take = limit.unwrap_or(entries.len());
        entries.iter().take(take).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
        info!("cleared clipboard history");
        self.events.publish(&HistoryEvent::Cleared);
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        drop(entries);

        if removed {
            self.events.publish(&HistoryEvent::Removed(id));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HistoryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }
}

/// Drop entries past the age limit, then the oldest beyond the size limit.
fn evict(entries: &mut VecDeque<ClipboardEntry>, config: &Config, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    let max_age = config.max_age();
    entries.retain(|e| e.age(now) <= max_age);
    entries.truncate(config.max_history_items.max(1));
    before - entries.len()
}
