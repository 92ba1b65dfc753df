use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use cliplet::config::{Config, ConfigStore};
use cliplet::history::HistoryStore;
use cliplet::models::ClipboardEntry;

fn store_with(config: Config) -> (Arc<ConfigStore>, HistoryStore) {
    let config = Arc::new(ConfigStore::in_memory(config));
    let history = HistoryStore::new(Arc::clone(&config));
    (config, history)
}

fn contents(history: &HistoryStore) -> Vec<String> {
    history.get(None).into_iter().map(|e| e.content).collect()
}

#[test]
fn oldest_entries_fall_off_the_end() {
    let (_, history) = store_with(Config {
        max_history_items: 3,
        ..Config::default()
    });

    for text in ["a", "b", "c", "d"] {
        history.add(text);
        assert!(history.len() <= 3);
    }
    assert_eq!(contents(&history), ["d", "c", "b"]);
}

#[test]
fn repeating_the_head_refreshes_it() {
    let (_, history) = store_with(Config::default());

    let first = history.add("x").unwrap();
    let second = history.add("x").unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(first.id, second.id);
    assert!(second.timestamp >= first.timestamp);
    assert_eq!(history.get(None)[0].timestamp, second.timestamp);
}

#[test]
fn excluded_application_is_not_recorded() {
    let (_, history) = store_with(Config {
        excluded_apps: ["vault".to_string()].into(),
        ..Config::default()
    });
    history.add("kept");

    assert!(history.add_from("secret", Some("vault-manager")).is_none());
    assert!(history.add_from("secret", Some("Vault")).is_none());
    assert_eq!(contents(&history), ["kept"]);

    assert!(history.add_from("notes", Some("editor")).is_some());
    assert_eq!(history.len(), 2);
}

#[test]
fn password_like_content_is_skipped_unless_disabled() {
    let (config, history) = store_with(Config::default());

    assert!(history.add_from("hunter2!", None).is_none());
    assert!(history.is_empty());

    config.replace(Config {
        exclude_passwords: false,
        ..Config::default()
    });
    assert!(history.add_from("hunter2!", None).is_some());
}

#[test]
fn stale_entries_are_evicted_on_next_add() {
    let (config, history) = store_with(Config {
        auto_cleanup_days: 3,
        ..Config::default()
    });

    let mut stale = ClipboardEntry::new_text("old".into(), None);
    stale.timestamp = Utc::now() - Duration::days(2);
    history.restore(vec![stale]);
    assert_eq!(contents(&history), ["old"]);

    config.replace(Config {
        auto_cleanup_days: 1,
        ..Config::default()
    });
    history.add("new");

    assert_eq!(contents(&history), ["new"]);
    let cutoff = Utc::now() - Duration::days(1);
    assert!(history.get(None).iter().all(|e| e.timestamp > cutoff));
}

#[test]
fn content_is_truncated_to_configured_length() {
    let (_, history) = store_with(Config {
        max_content_length: 5,
        ..Config::default()
    });

    let entry = history.add("abcdefgh").unwrap();
    assert_eq!(entry.content, "abcde");

    // Differs only past the limit, so it is the same entry.
    history.add("abcdeXYZ");
    assert_eq!(history.len(), 1);
}

#[test]
fn concurrent_adds_keep_every_distinct_entry() {
    let (_, history) = store_with(Config {
        max_history_items: 1000,
        ..Config::default()
    });
    let history = Arc::new(history);

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let history = Arc::clone(&history);
            thread::spawn(move || {
                for i in 0..25 {
                    history.add(&format!("worker {t} item {i}"));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let entries = history.get(None);
    assert_eq!(entries.len(), 200);
    let unique: HashSet<_> = entries.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(unique.len(), 200);
}

#[test]
fn concurrent_adds_respect_the_limit() {
    let (_, history) = store_with(Config {
        max_history_items: 10,
        ..Config::default()
    });
    let history = Arc::new(history);

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let history = Arc::clone(&history);
            thread::spawn(move || {
                for i in 0..50 {
                    history.add(&format!("{t}-{i}"));
                    assert!(history.len() <= 10);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(history.len(), 10);
}
