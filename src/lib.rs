//! cliplet: a clipboard history daemon.
//!
//! The daemon polls the system clipboard, filters out content from excluded
//! applications and password-like strings, keeps a bounded most-recent-first
//! history, and persists it as JSON.

pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod history;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod privacy;
pub mod storage;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
