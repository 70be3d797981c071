//! Per-context record of which tasks were already notified.
//!
//! Each scheduler loop owns one ledger; the foreground and background ledgers
//! never talk to each other. Entries live for the retention window (1 hour by
//! default) or until the task leaves "pending".

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_RETENTION_SECS: i64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct NotificationLedger {
    entries: HashMap<String, DateTime<Utc>>,
    retention: Duration,
}

impl Default for NotificationLedger {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RETENTION_SECS))
    }
}

impl NotificationLedger {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
        }
    }

    pub fn has(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    /// Record a notification. The first timestamp wins: an existing entry is
    /// never refreshed, so retention counts from the first delivery.
    pub fn record(&mut self, task_id: &str, now: DateTime<Utc>) {
        self.entries.entry(task_id.to_owned()).or_insert(now);
    }

    pub fn notified_at(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(task_id).copied()
    }

    /// Returns `true` if an entry was removed.
    pub fn clear(&mut self, task_id: &str) -> bool {
        self.entries.remove(task_id).is_some()
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Drop entries with `now - notified_at >= retention`. Returns how many went.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let retention = self.retention;
        self.entries.retain(|_, notified_at| now - *notified_at < retention);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
