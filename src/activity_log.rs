// src/activity_log.rs

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One timestamped, human-readable trace line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Append-only session trace of engine decisions. Clonable handle; every
/// engine operation pushes at least one entry.
#[derive(Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push<S: Into<String>>(&self, message: S) {
        let message = message.into();
        debug!("activity: {}", message);
        self.entries.lock().unwrap().push(LogEntry {
            at: Local::now(),
            message,
        });
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any entry's message contains `needle`. Assertion helper for
    /// tests and for the status display.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.message.contains(needle))
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}
