//! Undo buffer of recently closed tabs
//!
//! Entries are kept oldest first. Both a capacity bound and an age bound
//! are enforced and the oldest entries go first when either is exceeded.

use crate::tab::{PrivacyMode, TabId, TabRef, TabSeed};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of retained entries
pub const DEFAULT_CAPACITY: usize = 25;

/// Default maximum entry age in hours
pub const DEFAULT_MAX_AGE_HOURS: i64 = 72;

/// Identifier of one recently closed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by all entries removed in one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Restorable state of a removed tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentlyClosedEntry {
    pub id: EntryId,
    pub batch: BatchId,
    /// Identity the tab had before removal
    pub tab_id: TabId,
    pub url: Option<String>,
    pub title: String,
    pub favicon_url: Option<String>,
    pub group_key: Option<String>,
    pub mode: PrivacyMode,
    pub removed_at: DateTime<Utc>,
    /// The tab was selected in its mode when it was removed
    pub was_selected: bool,
}

impl RecentlyClosedEntry {
    pub fn from_tab(tab: &TabRef, batch: BatchId, removed_at: DateTime<Utc>, was_selected: bool) -> Self {
        Self {
            id: EntryId::new(),
            batch,
            tab_id: tab.id,
            url: tab.url.clone(),
            title: tab.title.clone(),
            favicon_url: tab.favicon_url.clone(),
            group_key: tab.group_key.clone(),
            mode: tab.mode(),
            removed_at,
            was_selected,
        }
    }

    /// Seed for recreating the tab
    pub fn seed(&self) -> TabSeed {
        TabSeed::new(self.url.clone(), self.mode.is_private())
            .with_title(self.title.clone())
            .with_favicon(self.favicon_url.clone())
            .with_group_key(self.group_key.clone())
    }
}

/// Capacity and age bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentlyClosedLimits {
    pub capacity: usize,
    /// `None` disables the age bound
    pub max_age: Option<Duration>,
}

impl Default for RecentlyClosedLimits {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_age: Some(Duration::hours(DEFAULT_MAX_AGE_HOURS)),
        }
    }
}

/// Bounded, time-ordered record of removed tabs
#[derive(Debug, Clone, Default)]
pub struct RecentlyClosedBuffer {
    entries: VecDeque<RecentlyClosedEntry>,
    limits: RecentlyClosedLimits,
}

impl RecentlyClosedBuffer {
    pub fn new(limits: RecentlyClosedLimits) -> Self {
        Self {
            entries: VecDeque::new(),
            limits,
        }
    }

    pub fn limits(&self) -> RecentlyClosedLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &RecentlyClosedEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: EntryId) -> Option<&RecentlyClosedEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Entries of one batch in original order
    pub fn batch(&self, batch: BatchId) -> Vec<&RecentlyClosedEntry> {
        self.entries.iter().filter(|entry| entry.batch == batch).collect()
    }

    /// Append entries and enforce bounds. Returns how many were evicted.
    pub fn push_all<I>(&mut self, entries: I, now: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = RecentlyClosedEntry>,
    {
        self.entries.extend(entries);
        self.prune(now)
    }

    /// Evict entries past the age bound, then trim to capacity
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        if let Some(max_age) = self.limits.max_age {
            while self
                .entries
                .front()
                .is_some_and(|entry| now.signed_duration_since(entry.removed_at) > max_age)
            {
                self.entries.pop_front();
            }
        }
        while self.entries.len() > self.limits.capacity {
            self.entries.pop_front();
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "Evicted recently closed entries");
        }
        evicted
    }

    /// Take one entry out
    pub fn take(&mut self, id: EntryId) -> Option<RecentlyClosedEntry> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(position)
    }

    /// Take the newest entry out
    pub fn take_most_recent(&mut self) -> Option<RecentlyClosedEntry> {
        self.entries.pop_back()
    }

    /// Take every entry of `batch` out, in original order
    pub fn take_batch(&mut self, batch: BatchId) -> Vec<RecentlyClosedEntry> {
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.batch == batch);
        self.entries = kept;
        taken.into()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn entry(batch: BatchId, url: &str, removed_at: DateTime<Utc>) -> RecentlyClosedEntry {
        let mut tab = TabRef::new(TabId::new(), Some(url.to_string()), false, removed_at);
        tab.title = url.to_uppercase();
        RecentlyClosedEntry::from_tab(&tab, batch, removed_at, false)
    }

    fn urls(entries: &[RecentlyClosedEntry]) -> Vec<&str> {
        entries.iter().filter_map(|entry| entry.url.as_deref()).collect()
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = RecentlyClosedBuffer::new(RecentlyClosedLimits {
            capacity: 2,
            max_age: None,
        });
        let batch = BatchId::new();
        let evicted = buffer.push_all(
            vec![entry(batch, "a", now()), entry(batch, "b", now()), entry(batch, "c", now())],
            now(),
        );
        assert_eq!(evicted, 1);
        let remaining: Vec<_> = buffer.entries().cloned().collect();
        assert_eq!(urls(&remaining), vec!["b", "c"]);
    }

    #[test]
    fn test_age_bound_evicts_old_entries() {
        let mut buffer = RecentlyClosedBuffer::new(RecentlyClosedLimits {
            capacity: 10,
            max_age: Some(Duration::hours(1)),
        });
        let batch = BatchId::new();
        buffer.push_all(vec![entry(batch, "old", now() - Duration::hours(2))], now() - Duration::hours(2));
        buffer.push_all(vec![entry(batch, "new", now())], now());

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.take_most_recent().unwrap().url.as_deref(), Some("new"));
    }

    #[test]
    fn test_take_most_recent() {
        let mut buffer = RecentlyClosedBuffer::default();
        buffer.push_all(vec![entry(BatchId::new(), "a", now())], now());
        buffer.push_all(vec![entry(BatchId::new(), "b", now())], now());

        assert_eq!(buffer.take_most_recent().unwrap().url.as_deref(), Some("b"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_take_batch_preserves_order() {
        let mut buffer = RecentlyClosedBuffer::default();
        let first = BatchId::new();
        let second = BatchId::new();
        buffer.push_all(vec![entry(first, "a", now()), entry(first, "b", now())], now());
        buffer.push_all(vec![entry(second, "x", now())], now());
        buffer.push_all(vec![entry(first, "c", now())], now());

        let taken = buffer.take_batch(first);
        assert_eq!(urls(&taken), vec!["a", "b", "c"]);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.take_batch(first).is_empty());
    }

    #[test]
    fn test_take_by_id() {
        let mut buffer = RecentlyClosedBuffer::default();
        let closed = entry(BatchId::new(), "a", now());
        let id = closed.id;
        buffer.push_all(vec![closed], now());

        assert!(buffer.get(id).is_some());
        assert_eq!(buffer.take(id).unwrap().id, id);
        assert!(buffer.take(id).is_none());
    }

    #[test]
    fn test_seed_round_trips_restorable_fields() {
        let closed = entry(BatchId::new(), "https://example.com", now());
        let seed = closed.seed();
        assert_eq!(seed.url.as_deref(), Some("https://example.com"));
        assert_eq!(seed.title.as_deref(), Some("HTTPS://EXAMPLE.COM"));
        assert!(!seed.is_private);
    }
}
