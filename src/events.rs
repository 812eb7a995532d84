//! Lifecycle notifications
//!
//! Observers are handed to the coordinator at construction. Delivery is
//! fire-and-forget: observers cannot fail and nothing waits on them.

use crate::recently_closed::BatchId;
use crate::tab::{PrivacyMode, TabId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event notifications for tab lifecycle changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TabAdded { tab: TabId, mode: PrivacyMode, index: usize },
    TabRemoved { tab: TabId, mode: PrivacyMode },
    AllTabsRemoved { mode: PrivacyMode, count: usize, batch: Option<BatchId> },
    TabRestored { tab: TabId, mode: PrivacyMode },
    SelectionChanged { mode: PrivacyMode, tab: Option<TabId> },
    PrivacyModeChanged { mode: PrivacyMode },
}

/// Receives lifecycle events
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Fans events out to registered observers
#[derive(Clone, Default)]
pub struct EventEmitter {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new(observers: Vec<Arc<dyn LifecycleObserver>>) -> Self {
        Self { observers }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        tracing::trace!(?event, "Emitting lifecycle event");
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    /// Observer plus the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl LifecycleObserver for ChannelObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.sender.send(event.clone());
    }
}
