//! Task record kept in the pending queue.
//!
//! # Invariants
//! - `title` is trimmed and never empty once constructed through `Task::new`.
//! - `created_at` is Unix epoch milliseconds.
//! - Wire shape is `{"title": ..., "createdAt": ...}` to stay readable by
//!   snapshots written by earlier clients.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One pending to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl Task {
    /// Builds a task from raw input, returning `None` for blank titles.
    pub fn new(title: &str, created_at: i64) -> Option<Self> {
        let title = normalize_title(title)?;
        Some(Self { title, created_at })
    }
}

/// Trims a title; blank input yields `None`.
pub fn normalize_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Current wall clock in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
