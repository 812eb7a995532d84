//! Tab display and lifecycle coordinator
//!
//! Owns the backing order of each privacy mode, the selection, and the
//! recently closed buffer, and keeps the display surface consistent with
//! them through batched change operations.
//!
//! All mutation happens synchronously on the caller's context. Only
//! persistence runs in the background, serialized through a
//! [`PersistenceQueue`]; `remove` and `remove_all` expose its completion
//! through a [`RemovalHandle`].

use crate::batcher::{BatchPhase, ChangeBatcher, ChangeOp, ChangeSet};
use crate::clock::{Clock, SystemClock};
use crate::config::TabGridConfig;
use crate::display::DisplaySurface;
use crate::error::{ApplyError, CoordinatorError, CoordinatorResult};
use crate::events::{EventEmitter, LifecycleEvent, LifecycleObserver};
use crate::insertion::InsertionPolicy;
use crate::partition::{partition, DisplaySection, PartitionPolicy, Section, SectionLayout};
use crate::persistence::{Persistence, PersistenceQueue, SessionSnapshot};
use crate::recently_closed::{
    BatchId, EntryId, RecentlyClosedBuffer, RecentlyClosedEntry, RecentlyClosedLimits,
};
use crate::store::TabStore;
use crate::tab::{PrivacyMode, TabId, TabRef, TabSeed};
use crate::weak_list::WeakRefList;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Behavioural settings of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorSettings {
    pub partition: PartitionPolicy,
    pub insertion: InsertionPolicy,
    pub recently_closed: RecentlyClosedLimits,
    pub close_private_tabs_on_exit: bool,
}

impl CoordinatorSettings {
    pub fn from_config(config: &TabGridConfig) -> Self {
        Self {
            partition: config.partition_policy(),
            insertion: config.insertion_policy(),
            recently_closed: config.recently_closed_limits(),
            close_private_tabs_on_exit: config.privacy.close_private_tabs_on_exit,
        }
    }
}

/// External collaborators, injected at construction
pub struct Collaborators {
    pub store: Arc<dyn TabStore>,
    pub persistence: Arc<dyn Persistence>,
    pub display: Arc<dyn DisplaySurface>,
    pub observers: Vec<Arc<dyn LifecycleObserver>>,
    pub clock: Arc<dyn Clock>,
    /// Runtime the persistence worker is spawned on
    pub runtime: Handle,
}

impl Collaborators {
    pub fn new(
        store: Arc<dyn TabStore>,
        persistence: Arc<dyn Persistence>,
        display: Arc<dyn DisplaySurface>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            persistence,
            display,
            observers: Vec::new(),
            clock: Arc::new(SystemClock),
            runtime,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// At most one selected tab per privacy mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionState {
    normal: Option<TabId>,
    private: Option<TabId>,
}

impl SelectionState {
    pub fn get(&self, mode: PrivacyMode) -> Option<TabId> {
        match mode {
            PrivacyMode::Normal => self.normal,
            PrivacyMode::Private => self.private,
        }
    }

    fn set(&mut self, mode: PrivacyMode, tab: Option<TabId>) {
        match mode {
            PrivacyMode::Normal => self.normal = tab,
            PrivacyMode::Private => self.private = tab,
        }
    }
}

/// Values delivered when a removal completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// Recently closed batch holding `closed`, `None` when nothing was closed
    pub batch: Option<BatchId>,
    pub closed: Vec<RecentlyClosedEntry>,
    /// Selection of the affected mode before the removal
    pub previous_selection: Option<TabId>,
    /// Whether the follow-up save succeeded
    pub persisted: bool,
}

/// Async completion of `remove`/`remove_all`.
///
/// The structural change is already committed when the handle is returned.
#[derive(Debug)]
pub struct RemovalHandle {
    outcome: RemovalOutcome,
    saved: oneshot::Receiver<bool>,
}

impl RemovalHandle {
    fn new(outcome: RemovalOutcome, saved: oneshot::Receiver<bool>) -> Self {
        Self { outcome, saved }
    }

    /// Removal values, available without waiting
    pub fn outcome(&self) -> &RemovalOutcome {
        &self.outcome
    }

    /// Wait for background persistence to confirm
    pub async fn wait(self) -> RemovalOutcome {
        let persisted = self.saved.await.unwrap_or(false);
        RemovalOutcome {
            persisted,
            ..self.outcome
        }
    }
}

/// Result of [`LifecycleCoordinator::flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending or a flush was already in flight
    Idle,
    Applied,
    /// The batch failed and a full reload was applied instead
    Recovered,
    /// The corrective reload failed too; it stays pending
    Failed,
}

/// Pull-based view for the display surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub mode: PrivacyMode,
    /// Backing order of the active mode
    pub tabs: Vec<TabRef>,
    pub layout: SectionLayout,
    pub selected: Option<TabId>,
}

#[derive(Debug, Default)]
struct ModeLists {
    normal: WeakRefList<TabId>,
    private: WeakRefList<TabId>,
}

/// Orchestrates tab lists, sections, insertion, batching and undo-close
pub struct LifecycleCoordinator {
    store: Arc<dyn TabStore>,
    display: Arc<dyn DisplaySurface>,
    clock: Arc<dyn Clock>,
    events: EventEmitter,
    persistence: PersistenceQueue,
    settings: CoordinatorSettings,
    lists: ModeLists,
    /// Cached fields of every listed tab, refreshed from the store
    tabs: HashMap<TabId, TabRef>,
    selection: SelectionState,
    active_mode: PrivacyMode,
    batcher: ChangeBatcher,
    recently_closed: RecentlyClosedBuffer,
    /// Derived sections the display was last told about
    published: Vec<DisplaySection>,
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("active_mode", &self.active_mode)
            .field("normal", &self.lists.normal.count())
            .field("private", &self.lists.private.count())
            .field("selection", &self.selection)
            .field("batch_phase", &self.batcher.phase())
            .field("recently_closed", &self.recently_closed.len())
            .finish()
    }
}

impl LifecycleCoordinator {
    pub fn new(settings: CoordinatorSettings, collaborators: Collaborators) -> Self {
        let persistence =
            PersistenceQueue::spawn(&collaborators.runtime, collaborators.persistence);
        Self {
            store: collaborators.store,
            display: collaborators.display,
            clock: collaborators.clock,
            events: EventEmitter::new(collaborators.observers),
            persistence,
            settings,
            lists: ModeLists::default(),
            tabs: HashMap::new(),
            selection: SelectionState::default(),
            active_mode: PrivacyMode::Normal,
            batcher: ChangeBatcher::new(),
            recently_closed: RecentlyClosedBuffer::new(settings.recently_closed),
            published: Vec::new(),
        }
    }

    // === Accessors ===

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn active_mode(&self) -> PrivacyMode {
        self.active_mode
    }

    pub fn selected(&self, mode: PrivacyMode) -> Option<TabId> {
        self.selection.get(mode)
    }

    pub fn count(&self, mode: PrivacyMode) -> usize {
        self.list(mode).count()
    }

    /// Backing order of `mode`
    pub fn tab_ids(&self, mode: PrivacyMode) -> Vec<TabId> {
        self.list(mode).to_vec()
    }

    pub fn tabs(&self, mode: PrivacyMode) -> Vec<TabRef> {
        self.list(mode)
            .iter()
            .filter_map(|id| self.tabs.get(&id).cloned())
            .collect()
    }

    pub fn tab(&self, id: TabId) -> Option<&TabRef> {
        self.tabs.get(&id)
    }

    /// Backing index of a tab within its mode, grouped tabs included
    pub fn index_of(&self, id: TabId) -> Option<usize> {
        let tab = self.tabs.get(&id)?;
        self.list(tab.mode()).position(&id)
    }

    /// Sections of the active mode
    pub fn sections(&self) -> SectionLayout {
        self.layout_for(self.active_mode)
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        let mode = self.active_mode;
        DisplaySnapshot {
            mode,
            tabs: self.tabs(mode),
            layout: self.layout_for(mode),
            selected: self.selection.get(mode),
        }
    }

    pub fn recently_closed(&self) -> &RecentlyClosedBuffer {
        &self.recently_closed
    }

    pub fn batch_phase(&self) -> BatchPhase {
        self.batcher.phase()
    }

    /// Ops waiting for the next flush
    pub fn pending_ops(&self) -> Vec<ChangeOp> {
        self.batcher.pending()
    }

    // === Mutations ===

    /// Open a tab, after `parent` when given, and select it
    pub fn add(&mut self, url: Option<String>, parent: Option<TabId>, is_private: bool) -> TabRef {
        self.add_seed(TabSeed::new(url, is_private).with_parent(parent))
    }

    /// Open a tab from a full seed and select it
    pub fn add_seed(&mut self, seed: TabSeed) -> TabRef {
        self.sync();
        let mode = PrivacyMode::from_private(seed.is_private);
        let parent_index = seed
            .parent_id
            .and_then(|parent| self.list(mode).position(&parent));
        if seed.parent_id.is_some() && parent_index.is_none() {
            tracing::debug!(%mode, "Parent tab not in list, appending");
        }

        let tab = self.store.create_tab(seed, self.clock.now());
        let index = self
            .settings
            .insertion
            .insertion_index(self.list(mode).count(), parent_index);
        self.insert_at(tab.clone(), index);
        self.set_selected(mode, Some(tab.id));

        self.publish_sections();
        self.persist();
        tab
    }

    /// Close a tab and buffer it for undo
    pub fn remove(&mut self, id: TabId) -> CoordinatorResult<RemovalHandle> {
        self.sync();
        let (mode, index) = self.locate(id)?;
        let Some(tab) = self.tabs.get(&id).cloned() else {
            return Err(self.stale(id));
        };

        let now = self.clock.now();
        let previous_selection = self.selection.get(mode);
        let was_selected = previous_selection == Some(id);
        let batch = BatchId::new();
        let entry = RecentlyClosedEntry::from_tab(&tab, batch, now, was_selected);

        self.list_mut(mode).remove(index);
        if was_selected {
            // Same index first, then the new last tab
            let list = self.list(mode);
            let neighbor = list.at(index).or_else(|| list.last());
            self.set_selected(mode, neighbor);
        }
        if mode == self.active_mode {
            self.batcher.record_delete(id, index);
        }
        self.tabs.remove(&id);
        self.store.destroy_tab(id);
        self.recently_closed.push_all([entry.clone()], now);

        tracing::debug!(tab = %id, index, %mode, "Removed tab");
        self.events.emit(LifecycleEvent::TabRemoved { tab: id, mode });

        if mode == PrivacyMode::Normal && self.list(mode).is_empty() {
            self.open_blank_tab(mode);
        }

        self.publish_sections();
        let saved = self.persist();
        Ok(RemovalHandle::new(
            RemovalOutcome {
                batch: Some(batch),
                closed: vec![entry],
                previous_selection,
                persisted: false,
            },
            saved,
        ))
    }

    /// Close every tab of one mode as a single undo batch.
    ///
    /// Normal mode gets a fresh blank tab right away; private mode may end
    /// up empty.
    pub fn remove_all(&mut self, is_private: bool) -> RemovalHandle {
        self.sync();
        let mode = PrivacyMode::from_private(is_private);
        let now = self.clock.now();
        let previous_selection = self.selection.get(mode);
        let batch = BatchId::new();

        let closed: Vec<RecentlyClosedEntry> = self
            .list_mut(mode)
            .remove_all()
            .into_iter()
            .filter_map(|id| self.tabs.remove(&id))
            .map(|tab| {
                self.store.destroy_tab(tab.id);
                RecentlyClosedEntry::from_tab(&tab, batch, now, previous_selection == Some(tab.id))
            })
            .collect();

        self.set_selected(mode, None);
        if !closed.is_empty() {
            self.recently_closed.push_all(closed.iter().cloned(), now);
        }
        if mode == self.active_mode {
            self.batcher.record_reload();
        }

        tracing::info!(%mode, count = closed.len(), "Removed all tabs");
        self.events.emit(LifecycleEvent::AllTabsRemoved {
            mode,
            count: closed.len(),
            batch: (!closed.is_empty()).then_some(batch),
        });

        if mode == PrivacyMode::Normal {
            self.open_blank_tab(mode);
        }

        self.publish_sections();
        let saved = self.persist();
        RemovalHandle::new(
            RemovalOutcome {
                batch: (!closed.is_empty()).then_some(batch),
                closed,
                previous_selection,
                persisted: false,
            },
            saved,
        )
    }

    /// Reopen one recently closed tab at the end of its mode and select it
    pub fn restore(&mut self, entry_id: EntryId) -> CoordinatorResult<TabRef> {
        self.sync();
        self.recently_closed.prune(self.clock.now());
        let Some(entry) = self.recently_closed.take(entry_id) else {
            tracing::warn!(entry = %entry_id, "Recently closed entry not found");
            return Err(CoordinatorError::UnknownRecentlyClosed(entry_id));
        };
        Ok(self.restore_entry(&entry))
    }

    /// Reopen the newest recently closed tab that is still within bounds
    pub fn restore_most_recent(&mut self) -> Option<TabRef> {
        self.sync();
        self.recently_closed.prune(self.clock.now());
        let entry = self.recently_closed.take_most_recent()?;
        Some(self.restore_entry(&entry))
    }

    /// Reopen a whole removal batch in its original order
    pub fn restore_batch(&mut self, batch: BatchId) -> CoordinatorResult<Vec<TabRef>> {
        self.sync();
        self.recently_closed.prune(self.clock.now());
        let entries = self.recently_closed.take_batch(batch);
        if entries.is_empty() {
            tracing::warn!(batch = %batch, "Recently closed batch not found");
            return Err(CoordinatorError::UnknownBatch(batch));
        }

        let mut restored = Vec::with_capacity(entries.len());
        for entry in &entries {
            let tab = self.reopen(entry);
            if entry.was_selected {
                self.set_selected(entry.mode, Some(tab.id));
            }
            restored.push(tab);
        }
        tracing::info!(batch = %batch, count = restored.len(), "Restored tab batch");

        self.publish_sections();
        self.persist();
        Ok(restored)
    }

    /// Switch the displayed mode. The backing lists are left alone.
    pub fn toggle_privacy_mode(&mut self, to_normal: bool) {
        let target = if to_normal {
            PrivacyMode::Normal
        } else {
            PrivacyMode::Private
        };
        if target == self.active_mode {
            tracing::debug!(mode = %target, "Privacy mode unchanged");
            return;
        }

        self.sync();
        let leaving = self.active_mode;
        self.active_mode = target;
        if leaving == PrivacyMode::Private && self.settings.close_private_tabs_on_exit {
            self.discard_private_tabs();
        }
        self.batcher.record_reload();

        tracing::info!(mode = %target, "Privacy mode changed");
        self.events
            .emit(LifecycleEvent::PrivacyModeChanged { mode: target });
        self.publish_sections();
    }

    /// Move a tab within the Regular section of the active mode
    pub fn reorder(&mut self, from: usize, to: usize) -> CoordinatorResult<()> {
        self.sync();
        let mode = self.active_mode;
        let len = self.list(mode).count();
        if from >= len || to >= len {
            tracing::warn!(from, to, len, "Reorder out of range");
            return Err(CoordinatorError::InvalidRange { from, to, len });
        }
        if from == to {
            return Ok(());
        }

        let layout = self.layout_for(mode);
        for index in [from, to] {
            let section = self
                .list(mode)
                .at(index)
                .and_then(|id| layout.section_of(id))
                .cloned()
                .unwrap_or(Section::Regular);
            if !section.is_reorderable() {
                tracing::warn!(index, %section, "Reorder touches a derived section");
                return Err(CoordinatorError::NotReorderable { index, section });
            }
        }

        let Some(id) = self.list_mut(mode).remove(from) else {
            return Err(CoordinatorError::InvalidRange { from, to, len });
        };
        self.list_mut(mode).insert(to, id);
        self.batcher.record_move(id, from, to);
        tracing::debug!(tab = %id, from, to, "Reordered tab");

        self.publish_sections();
        self.persist();
        Ok(())
    }

    /// Select a tab in its own mode and mark it active
    pub fn select(&mut self, id: TabId) -> CoordinatorResult<()> {
        self.sync();
        let (mode, _) = self.locate(id)?;
        let now = self.clock.now();
        self.store.update_last_active(id, now);
        if let Some(tab) = self.tabs.get_mut(&id) {
            tab.last_active_at = now;
        }
        self.set_selected(mode, Some(id));

        self.publish_sections();
        if mode == PrivacyMode::Normal {
            self.persist();
        }
        Ok(())
    }

    /// Store callback: a tab's fields changed
    pub fn on_tab_mutated(&mut self, id: TabId) -> CoordinatorResult<()> {
        self.sync();
        self.locate(id).map(|_| ())
    }

    /// Replace the partition policy and re-render if sections change
    pub fn set_policy(&mut self, policy: PartitionPolicy) {
        self.settings.partition = policy;
        self.sync();
    }

    /// Re-evaluate sections, e.g. from an inactivity timer
    pub fn refresh_sections(&mut self) {
        self.sync();
    }

    /// Rebuild the normal list from a saved session
    pub fn restore_session(&mut self, snapshot: SessionSnapshot) -> Vec<TabRef> {
        self.sync();
        let mut remapped: HashMap<TabId, TabId> = HashMap::new();
        let mut restored = Vec::with_capacity(snapshot.tabs.len());

        for saved in snapshot.tabs.iter().filter(|tab| !tab.is_private) {
            let seed = TabSeed::new(saved.url.clone(), false)
                .with_title(saved.title.clone())
                .with_favicon(saved.favicon_url.clone())
                .with_group_key(saved.group_key.clone())
                .with_parent(saved.parent_id.and_then(|parent| remapped.get(&parent).copied()));
            let tab = self.store.create_tab(seed, saved.last_active_at);

            remapped.insert(saved.id, tab.id);
            self.append_tab(tab.clone());
            restored.push(tab);
        }

        let selected = snapshot
            .selected
            .and_then(|old| remapped.get(&old).copied())
            .or_else(|| self.selection.get(PrivacyMode::Normal))
            .or_else(|| restored.last().map(|tab| tab.id));
        self.set_selected(PrivacyMode::Normal, selected);
        tracing::info!(tabs = restored.len(), "Restored session");

        self.publish_sections();
        self.persist();
        restored
    }

    // === Flushing ===

    /// Take the pending batch for applying. Mutations made until
    /// [`complete_flush`](Self::complete_flush) go into the next batch.
    pub fn begin_flush(&mut self) -> Option<ChangeSet> {
        let ops = self.batcher.begin_flush()?;
        Some(ChangeSet {
            ops,
            visible: self.list(self.active_mode).to_vec(),
        })
    }

    /// Close the in-flight batch. A failed apply schedules a full reload.
    pub fn complete_flush(&mut self, result: Result<(), ApplyError>) {
        self.batcher.complete_flush();
        if let Err(e) = result {
            tracing::warn!("Display apply failed, scheduling full reload: {}", e);
            self.batcher.record_reload();
        }
    }

    /// Apply the pending batch to the display surface
    pub async fn flush(&mut self) -> FlushOutcome {
        let Some(changes) = self.begin_flush() else {
            return FlushOutcome::Idle;
        };
        let display = Arc::clone(&self.display);
        let result = display.apply(changes).await;
        let failed = result.is_err();
        self.complete_flush(result);
        if !failed {
            return FlushOutcome::Applied;
        }

        let Some(reload) = self.begin_flush() else {
            return FlushOutcome::Failed;
        };
        let result = display.apply(reload).await;
        let failed = result.is_err();
        self.complete_flush(result);
        if failed {
            tracing::error!("Corrective reload failed; it stays pending");
            FlushOutcome::Failed
        } else {
            FlushOutcome::Recovered
        }
    }

    // === Internals ===

    fn list(&self, mode: PrivacyMode) -> &WeakRefList<TabId> {
        match mode {
            PrivacyMode::Normal => &self.lists.normal,
            PrivacyMode::Private => &self.lists.private,
        }
    }

    fn list_mut(&mut self, mode: PrivacyMode) -> &mut WeakRefList<TabId> {
        match mode {
            PrivacyMode::Normal => &mut self.lists.normal,
            PrivacyMode::Private => &mut self.lists.private,
        }
    }

    fn layout_for(&self, mode: PrivacyMode) -> SectionLayout {
        partition(
            &self.tabs(mode),
            mode,
            &self.settings.partition,
            self.clock.now(),
            self.selection.get(mode),
        )
    }

    fn stale(&self, id: TabId) -> CoordinatorError {
        tracing::warn!(tab = %id, "Stale tab reference");
        CoordinatorError::StaleReference(id)
    }

    fn locate(&self, id: TabId) -> CoordinatorResult<(PrivacyMode, usize)> {
        let mode = match self.tabs.get(&id) {
            Some(tab) => tab.mode(),
            None => return Err(self.stale(id)),
        };
        match self.list(mode).position(&id) {
            Some(index) => Ok((mode, index)),
            None => Err(self.stale(id)),
        }
    }

    fn set_selected(&mut self, mode: PrivacyMode, tab: Option<TabId>) {
        if self.selection.get(mode) != tab {
            self.selection.set(mode, tab);
            self.events
                .emit(LifecycleEvent::SelectionChanged { mode, tab });
        }
    }

    /// Insert a store-created tab into its mode's list
    fn insert_at(&mut self, tab: TabRef, index: usize) {
        self.list_mut(tab.mode()).insert(index, tab.id);
        self.track_inserted(tab, index);
    }

    /// Put a store-created tab at the end of its mode's list
    fn append_tab(&mut self, tab: TabRef) {
        let mode = tab.mode();
        let index = self.list(mode).count();
        self.list_mut(mode).append(tab.id);
        self.track_inserted(tab, index);
    }

    fn track_inserted(&mut self, tab: TabRef, index: usize) {
        let mode = tab.mode();
        let id = tab.id;
        self.tabs.insert(id, tab);
        if mode == self.active_mode {
            self.batcher.record_insert(id, index);
        }
        tracing::debug!(tab = %id, index, %mode, "Added tab");
        self.events
            .emit(LifecycleEvent::TabAdded { tab: id, mode, index });
    }

    fn open_blank_tab(&mut self, mode: PrivacyMode) -> TabRef {
        let tab = self
            .store
            .create_tab(TabSeed::blank(mode.is_private()), self.clock.now());
        self.append_tab(tab.clone());
        self.set_selected(mode, Some(tab.id));
        tab
    }

    fn restore_entry(&mut self, entry: &RecentlyClosedEntry) -> TabRef {
        let tab = self.reopen(entry);
        self.set_selected(entry.mode, Some(tab.id));
        self.publish_sections();
        self.persist();
        tab
    }

    /// Recreate a tab from a recently closed entry at the end of its mode
    fn reopen(&mut self, entry: &RecentlyClosedEntry) -> TabRef {
        let tab = self.store.create_tab(entry.seed(), self.clock.now());
        self.append_tab(tab.clone());
        if self.selection.get(entry.mode).is_none() {
            self.set_selected(entry.mode, Some(tab.id));
        }
        self.events.emit(LifecycleEvent::TabRestored {
            tab: tab.id,
            mode: entry.mode,
        });
        tab
    }

    fn discard_private_tabs(&mut self) {
        let ids = self.list_mut(PrivacyMode::Private).remove_all();
        for id in &ids {
            self.tabs.remove(id);
            self.store.destroy_tab(*id);
        }
        self.set_selected(PrivacyMode::Private, None);
        tracing::info!(count = ids.len(), "Closed private tabs on exit");
        self.events.emit(LifecycleEvent::AllTabsRemoved {
            mode: PrivacyMode::Private,
            count: ids.len(),
            batch: None,
        });
    }

    /// Drop entries the store no longer holds, refresh cached fields and
    /// publish any section change that happened outside the coordinator
    fn sync(&mut self) {
        for mode in [PrivacyMode::Normal, PrivacyMode::Private] {
            let store = Arc::clone(&self.store);
            let dead = self.list_mut(mode).sweep(|id| store.contains(*id));
            if dead.is_empty() {
                continue;
            }

            for (index, id) in dead.iter().rev() {
                if mode == self.active_mode {
                    self.batcher.record_delete(*id, *index);
                }
                self.tabs.remove(id);
                tracing::debug!(tab = %id, %mode, "Reaped tab released by the store");
                self.events
                    .emit(LifecycleEvent::TabRemoved { tab: *id, mode });
            }

            let selected = self.selection.get(mode);
            if let Some(&(old_index, _)) = dead.iter().find(|(_, id)| Some(*id) == selected) {
                let shift = dead.iter().filter(|(index, _)| *index < old_index).count();
                let list = self.list(mode);
                let neighbor = list.at(old_index - shift).or_else(|| list.last());
                self.set_selected(mode, neighbor);
            }

            if mode == PrivacyMode::Normal && self.list(mode).is_empty() {
                let blank = self.open_blank_tab(mode);
                tracing::debug!(
                    tab = %blank.id,
                    "Normal mode emptied by the store, opened a blank tab"
                );
            }
        }

        for (id, cached) in self.tabs.iter_mut() {
            if let Some(fresh) = self.store.get(*id) {
                *cached = fresh;
            }
        }
        self.publish_sections();
    }

    /// Schedule a full reload when derived sections changed
    fn publish_sections(&mut self) {
        let layout = self.layout_for(self.active_mode);
        let derived: Vec<DisplaySection> = layout.derived().into_iter().cloned().collect();
        if derived != self.published {
            tracing::debug!(sections = derived.len(), "Derived sections changed");
            self.batcher.record_reload();
            self.published = derived;
        }
    }

    fn persist(&self) -> oneshot::Receiver<bool> {
        let snapshot = SessionSnapshot::new(
            self.tabs(PrivacyMode::Normal),
            self.selection.get(PrivacyMode::Normal),
            self.clock.now(),
        );
        self.persistence.submit(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::display::MirrorSurface;
    use crate::persistence::MemoryPersistence;
    use crate::store::InMemoryTabStore;
    use chrono::{TimeZone, Utc};

    struct Harness {
        coordinator: LifecycleCoordinator,
        store: Arc<InMemoryTabStore>,
        surface: Arc<MirrorSurface>,
    }

    fn harness_with(settings: CoordinatorSettings) -> Harness {
        let store = Arc::new(InMemoryTabStore::new());
        let surface = Arc::new(MirrorSurface::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        ));
        let collaborators = Collaborators::new(
            store.clone(),
            Arc::new(MemoryPersistence::new()),
            surface.clone(),
            Handle::current(),
        )
        .with_clock(clock);
        Harness {
            coordinator: LifecycleCoordinator::new(settings, collaborators),
            store,
            surface,
        }
    }

    fn harness() -> Harness {
        harness_with(CoordinatorSettings::default())
    }

    fn add_plain(coordinator: &mut LifecycleCoordinator, count: usize) -> Vec<TabId> {
        (0..count)
            .map(|i| coordinator.add(Some(format!("https://{i}.test")), None, false).id)
            .collect()
    }

    #[tokio::test]
    async fn test_add_appends_and_selects() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        assert_eq!(h.coordinator.tab_ids(PrivacyMode::Normal), ids);
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), Some(ids[2]));
        assert_eq!(
            h.coordinator.pending_ops(),
            vec![
                ChangeOp::Insert { index: 0 },
                ChangeOp::Insert { index: 1 },
                ChangeOp::Insert { index: 2 }
            ]
        );
    }

    #[tokio::test]
    async fn test_add_after_parent() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        let child = h.coordinator.add(None, Some(ids[1]), false);
        assert_eq!(h.coordinator.index_of(child.id), Some(2));
        assert_eq!(child.parent_id, Some(ids[1]));
    }

    #[tokio::test]
    async fn test_private_add_records_no_op_in_normal_mode() {
        let mut h = harness();
        let tab = h.coordinator.add(None, None, true);
        assert!(h.coordinator.pending_ops().is_empty());
        assert_eq!(h.coordinator.selected(PrivacyMode::Private), Some(tab.id));
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), None);
    }

    #[tokio::test]
    async fn test_remove_selected_picks_same_index() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        h.coordinator.select(ids[0]).unwrap();

        let handle = h.coordinator.remove(ids[0]).unwrap();
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), Some(ids[1]));
        assert_eq!(handle.outcome().previous_selection, Some(ids[0]));
        assert_eq!(h.coordinator.recently_closed().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_selected_last_picks_new_last() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        h.coordinator.remove(ids[2]).unwrap();
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), Some(ids[1]));
    }

    #[tokio::test]
    async fn test_remove_stale_reference() {
        let mut h = harness();
        add_plain(&mut h.coordinator, 1);
        let stranger = TabId::new();
        let result = h.coordinator.remove(stranger);
        assert_eq!(result.unwrap_err(), CoordinatorError::StaleReference(stranger));
        assert_eq!(h.coordinator.count(PrivacyMode::Normal), 1);
    }

    #[tokio::test]
    async fn test_removing_last_normal_tab_opens_blank() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 1);
        h.coordinator.remove(ids[0]).unwrap();
        assert_eq!(h.coordinator.count(PrivacyMode::Normal), 1);
        let fresh = h.coordinator.tab_ids(PrivacyMode::Normal)[0];
        assert_ne!(fresh, ids[0]);
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), Some(fresh));
    }

    #[tokio::test]
    async fn test_reorder_rejects_inactive_index() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        h.store
            .update_last_active(ids[0], Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        h.coordinator.flush().await;

        let result = h.coordinator.reorder(0, 2);
        assert!(matches!(
            result,
            Err(CoordinatorError::NotReorderable {
                index: 0,
                section: Section::Inactive
            })
        ));
        // The stale timestamp surfaced as a section change, no move was recorded
        assert_eq!(h.coordinator.pending_ops(), vec![ChangeOp::ReloadAll]);
        assert_eq!(h.coordinator.tab_ids(PrivacyMode::Normal), ids);
    }

    #[tokio::test]
    async fn test_reorder_out_of_range() {
        let mut h = harness();
        add_plain(&mut h.coordinator, 2);
        assert_eq!(
            h.coordinator.reorder(0, 5),
            Err(CoordinatorError::InvalidRange { from: 0, to: 5, len: 2 })
        );
    }

    #[tokio::test]
    async fn test_reentrant_mutation_goes_to_next_batch() {
        let mut h = harness();
        add_plain(&mut h.coordinator, 2);
        let changes = h.coordinator.begin_flush().unwrap();
        assert_eq!(h.coordinator.batch_phase(), BatchPhase::Flushing);

        h.coordinator.add(None, None, false);
        assert_eq!(h.coordinator.pending_ops(), vec![ChangeOp::Insert { index: 2 }]);

        let result = h.surface.apply(changes).await;
        h.coordinator.complete_flush(result);
        assert_eq!(h.coordinator.batch_phase(), BatchPhase::Accumulating);

        assert_eq!(h.coordinator.flush().await, FlushOutcome::Applied);
        assert_eq!(h.surface.items(), h.coordinator.tab_ids(PrivacyMode::Normal));
    }

    #[tokio::test]
    async fn test_apply_failure_recovers_with_reload() {
        let mut h = harness();
        add_plain(&mut h.coordinator, 2);
        h.surface
            .fail_next_apply(ApplyError::Rejected("layout busy".to_string()));

        assert_eq!(h.coordinator.flush().await, FlushOutcome::Recovered);
        let applied = h.surface.applied();
        assert_eq!(applied.len(), 1);
        assert!(applied[0].is_reload());
        assert_eq!(h.surface.items(), h.coordinator.tab_ids(PrivacyMode::Normal));
    }

    #[tokio::test]
    async fn test_toggle_privacy_mode_reloads() {
        let mut h = harness();
        add_plain(&mut h.coordinator, 1);
        let private = h.coordinator.add(None, None, true);
        h.coordinator.flush().await;

        h.coordinator.toggle_privacy_mode(false);
        assert_eq!(h.coordinator.active_mode(), PrivacyMode::Private);
        assert_eq!(h.coordinator.pending_ops(), vec![ChangeOp::ReloadAll]);
        h.coordinator.flush().await;
        assert_eq!(h.surface.items(), vec![private.id]);

        h.coordinator.toggle_privacy_mode(false);
        assert!(h.coordinator.pending_ops().is_empty());
    }

    #[tokio::test]
    async fn test_close_private_tabs_on_exit() {
        let mut h = harness_with(CoordinatorSettings {
            close_private_tabs_on_exit: true,
            ..CoordinatorSettings::default()
        });
        h.coordinator.toggle_privacy_mode(false);
        let private = h.coordinator.add(None, None, true);
        h.coordinator.toggle_privacy_mode(true);

        assert_eq!(h.coordinator.count(PrivacyMode::Private), 0);
        assert!(!h.store.contains(private.id));
        assert!(h.coordinator.recently_closed().is_empty());
    }

    #[tokio::test]
    async fn test_dead_tab_is_reaped() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        h.coordinator.flush().await;

        h.store.forget(ids[2]);
        h.coordinator.refresh_sections();
        assert_eq!(h.coordinator.tab_ids(PrivacyMode::Normal), vec![ids[0], ids[1]]);
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), Some(ids[1]));
        assert_eq!(h.coordinator.pending_ops(), vec![ChangeOp::Delete { index: 2 }]);

        assert_eq!(h.coordinator.flush().await, FlushOutcome::Applied);
    }

    #[tokio::test]
    async fn test_reaping_every_normal_tab_opens_blank() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 1);
        h.coordinator.flush().await;

        h.store.forget(ids[0]);
        h.coordinator.refresh_sections();

        assert_eq!(h.coordinator.count(PrivacyMode::Normal), 1);
        let fresh = h.coordinator.tab_ids(PrivacyMode::Normal)[0];
        assert_ne!(fresh, ids[0]);
        assert!(h.store.contains(fresh));
        assert_eq!(h.coordinator.selected(PrivacyMode::Normal), Some(fresh));
        assert_eq!(
            h.coordinator.pending_ops(),
            vec![ChangeOp::Delete { index: 0 }, ChangeOp::Insert { index: 0 }]
        );

        assert_eq!(h.coordinator.flush().await, FlushOutcome::Applied);
        assert_eq!(h.surface.items(), vec![fresh]);
    }

    #[tokio::test]
    async fn test_grouping_off_keeps_idle_tabs_regular() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        h.store
            .update_last_active(ids[0], Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        h.coordinator.refresh_sections();
        assert_eq!(h.coordinator.sections().inactive(), &[ids[0]]);
        h.coordinator.flush().await;

        h.coordinator.set_policy(PartitionPolicy {
            grouping_enabled: false,
            ..PartitionPolicy::default()
        });

        assert_eq!(h.coordinator.pending_ops(), vec![ChangeOp::ReloadAll]);
        let layout = h.coordinator.sections();
        assert!(layout.derived().is_empty());
        assert_eq!(layout.regular(), ids.as_slice());
        assert_eq!(h.coordinator.flush().await, FlushOutcome::Applied);
    }

    #[tokio::test]
    async fn test_group_change_triggers_reload() {
        let mut h = harness();
        let ids = add_plain(&mut h.coordinator, 3);
        h.coordinator.flush().await;

        h.store.set_group_key(ids[0], Some("rust".to_string()));
        h.store.set_group_key(ids[2], Some("rust".to_string()));
        h.coordinator.on_tab_mutated(ids[0]).unwrap();

        assert_eq!(h.coordinator.pending_ops(), vec![ChangeOp::ReloadAll]);
        let layout = h.coordinator.sections();
        assert_eq!(layout.grouped().count(), 1);
        assert_eq!(layout.regular(), &[ids[1]]);
        assert_eq!(h.coordinator.index_of(ids[2]), Some(2));
    }
}
