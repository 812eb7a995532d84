//! In-memory capture of recent lifecycle log events
//!
//! Hosts use the [`LogBuffer`] handle to show what the coordinator did
//! recently (closed tabs, failed applies, stale references) without
//! reading log files.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// One captured event
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub recorded_at: DateTime<Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Value of a structured field, e.g. `tab`
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl EntryVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for EntryVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }
}

type SharedEntries = Arc<Mutex<VecDeque<LogEntry>>>;

fn lock(entries: &SharedEntries) -> MutexGuard<'_, VecDeque<LogEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ring-buffer layer feeding a [`LogBuffer`]
pub struct LogBufferLayer {
    entries: SharedEntries,
    capacity: usize,
}

impl LogBufferLayer {
    pub fn new(capacity: usize) -> (Self, LogBuffer) {
        let entries = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let handle = LogBuffer {
            entries: Arc::clone(&entries),
        };
        (Self { entries, capacity }, handle)
    }
}

impl<S> Layer<S> for LogBufferLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.capacity == 0 {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            recorded_at: Utc::now(),
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        };

        let mut entries = lock(&self.entries);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

/// Read handle for captured events
#[derive(Clone)]
pub struct LogBuffer {
    entries: SharedEntries,
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer").field("entries", &self.len()).finish()
    }
}

impl LogBuffer {
    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.entries).iter().cloned().collect()
    }

    /// The most recent `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        let entries = lock(&self.entries);
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Entries at `min_level` or more severe
    pub fn at_least(&self, min_level: Level) -> Vec<LogEntry> {
        lock(&self.entries)
            .iter()
            .filter(|entry| entry.level <= min_level)
            .cloned()
            .collect()
    }

    /// Entries mentioning a tab through their `tab` field
    pub fn for_tab(&self, tab: &str) -> Vec<LogEntry> {
        lock(&self.entries)
            .iter()
            .filter(|entry| entry.field("tab") == Some(tab))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
