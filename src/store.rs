//! Tab store collaborator
//!
//! The store owns the browsing sessions. The coordinator only asks it to
//! create and destroy tabs, stamps activity, and reads the fields it caches
//! in [`TabRef`].

use crate::tab::{TabId, TabRef, TabSeed};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Owner of tab entities
pub trait TabStore: Send + Sync {
    /// Create and register a tab
    fn create_tab(&self, seed: TabSeed, now: DateTime<Utc>) -> TabRef;

    /// Release a tab. Unknown ids are ignored.
    fn destroy_tab(&self, id: TabId);

    fn update_last_active(&self, id: TabId, at: DateTime<Utc>);

    /// Current fields of a live tab
    fn get(&self, id: TabId) -> Option<TabRef>;

    fn contains(&self, id: TabId) -> bool {
        self.get(id).is_some()
    }
}

/// Process-local tab store
#[derive(Debug, Default)]
pub struct InMemoryTabStore {
    tabs: RwLock<HashMap<TabId, TabRef>>,
}

impl InMemoryTabStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Change a tab's search-term group. Callers notify the coordinator
    /// through `on_tab_mutated` afterwards.
    pub fn set_group_key(&self, id: TabId, key: Option<String>) -> bool {
        self.update(id, |tab| tab.group_key = key)
    }

    pub fn set_title(&self, id: TabId, title: impl Into<String>) -> bool {
        let title = title.into();
        self.update(id, |tab| tab.title = title)
    }

    pub fn set_url(&self, id: TabId, url: Option<String>) -> bool {
        self.update(id, |tab| tab.url = url)
    }

    pub fn set_snapshot_available(&self, id: TabId, available: bool) -> bool {
        self.update(id, |tab| tab.has_renderable_snapshot = available)
    }

    /// Drop a tab behind the coordinator's back, as a deallocation would
    pub fn forget(&self, id: TabId) -> bool {
        self.write().remove(&id).is_some()
    }

    fn update<F: FnOnce(&mut TabRef)>(&self, id: TabId, apply: F) -> bool {
        match self.write().get_mut(&id) {
            Some(tab) => {
                apply(tab);
                true
            }
            None => false,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TabId, TabRef>> {
        self.tabs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TabId, TabRef>> {
        self.tabs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TabStore for InMemoryTabStore {
    fn create_tab(&self, seed: TabSeed, now: DateTime<Utc>) -> TabRef {
        let mut tab = TabRef::new(TabId::new(), seed.url, seed.is_private, now);
        tab.title = seed.title.unwrap_or_default();
        tab.favicon_url = seed.favicon_url;
        tab.group_key = seed.group_key;
        tab.parent_id = seed.parent_id;

        self.write().insert(tab.id, tab.clone());
        tracing::trace!(tab = %tab.id, "Store created tab");
        tab
    }

    fn destroy_tab(&self, id: TabId) {
        if self.write().remove(&id).is_some() {
            tracing::trace!(tab = %id, "Store destroyed tab");
        }
    }

    fn update_last_active(&self, id: TabId, at: DateTime<Utc>) {
        self.update(id, |tab| tab.last_active_at = at);
    }

    fn get(&self, id: TabId) -> Option<TabRef> {
        self.read().get(&id).cloned()
    }
}
