//! Activity-log collaborator contract.
//!
//! The core writes append-only status lines keyed by an opaque
//! [`ActivityHandle`]; rendering them is someone else's job.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Opaque key identifying one activity-log entry (typically a feed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityHandle(Arc<str>);

impl ActivityHandle {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write-only sink for status lines.
pub trait ActivityLog: Send + Sync {
    fn append(&self, handle: &ActivityHandle, line: &str);
}

/// Forwards activity lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn append(&self, handle: &ActivityHandle, line: &str) {
        tracing::info!(activity = %handle, "{}", line);
    }
}

/// Keeps lines in memory, grouped by handle.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    lines: Mutex<HashMap<ActivityHandle, Vec<String>>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines written for `handle`, oldest first.
    pub fn lines(&self, handle: &ActivityHandle) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_line(&self, handle: &ActivityHandle) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .and_then(|lines| lines.last().cloned())
    }
}

impl ActivityLog for MemoryActivityLog {
    fn append(&self, handle: &ActivityHandle, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(handle.clone())
            .or_default()
            .push(line.to_string());
    }
}
