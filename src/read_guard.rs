//! Read-before-write tracking.
//!
//! A small safety oracle the orchestration layer consults before letting an
//! agent overwrite a file: a path must have been read, and not modified since
//! that read, for a write to proceed without a fresh read. The guard only
//! answers the question; enforcement (and clearing records after successful
//! writes) belongs to the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::vfs::path::normalize;

/// One remembered read, keyed by normalized path.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecord {
    pub path: String,
    pub read_at: DateTime<Utc>,
    pub modified_at_read: DateTime<Utc>,
}

/// Why a path needs re-reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    NeverRead,
    ModifiedSinceRead,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::NeverRead => f.write_str("file has never been read"),
            StaleReason::ModifiedSinceRead => f.write_str("file was modified since last read"),
        }
    }
}

/// Answer to a re-read query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadCheck {
    pub needs_re_read: bool,
    pub reason: Option<StaleReason>,
}

impl ReadCheck {
    fn fresh() -> Self {
        Self {
            needs_re_read: false,
            reason: None,
        }
    }

    fn stale(reason: StaleReason) -> Self {
        Self {
            needs_re_read: true,
            reason: Some(reason),
        }
    }
}

/// Per-instance map of read records. No cross-instance sharing.
#[derive(Debug, Default)]
pub struct ReadGuard {
    records: HashMap<String, ReadRecord>,
}

impl ReadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) a read of `path` whose content was last
    /// modified at `modified_at_read`.
    pub fn record_read(&mut self, path: &str, modified_at_read: DateTime<Utc>) {
        let normalized = normalize(path);
        self.records.insert(
            normalized.clone(),
            ReadRecord {
                path: normalized,
                read_at: Utc::now(),
                modified_at_read,
            },
        );
    }

    /// Whether `path` must be re-read before it may be written, given its
    /// current modification time. Equal timestamps count as unmodified.
    pub fn needs_re_read(&self, path: &str, current_modified_at: DateTime<Utc>) -> ReadCheck {
        match self.records.get(&normalize(path)) {
            None => ReadCheck::stale(StaleReason::NeverRead),
            Some(record) if current_modified_at > record.modified_at_read => {
                ReadCheck::stale(StaleReason::ModifiedSinceRead)
            }
            Some(_) => ReadCheck::fresh(),
        }
    }

    /// Forget the record for one path.
    pub fn clear_read_record(&mut self, path: &str) {
        self.records.remove(&normalize(path));
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
