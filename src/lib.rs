//! tabgrid Library
//!
//! This library provides the tab display and lifecycle layer of a browser
//! tab grid, including:
//! - Backing tab order per privacy mode with weak, self-cleaning entries
//! - Derived sections (inactive, grouped, regular) computed on demand
//! - Batched change operations for an animated display surface
//! - Undo-close through a bounded recently closed buffer
//! - Background session persistence

pub mod batcher;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod events;
pub mod insertion;
pub mod logging;
pub mod partition;
pub mod persistence;
pub mod recently_closed;
pub mod store;
pub mod tab;
pub mod weak_list;

pub use batcher::{BatchPhase, ChangeBatcher, ChangeOp, ChangeSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TabGridConfig;
pub use coordinator::{
    Collaborators, CoordinatorSettings, DisplaySnapshot, FlushOutcome, LifecycleCoordinator,
    RemovalHandle, RemovalOutcome,
};
pub use display::{DisplaySurface, MirrorSurface};
pub use error::{ApplyError, CoordinatorError, PersistenceError, Result, TabGridError};
pub use events::{ChannelObserver, LifecycleEvent, LifecycleObserver};
pub use partition::{partition, PartitionPolicy, Section, SectionLayout};
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence, SessionSnapshot};
pub use recently_closed::{BatchId, EntryId, RecentlyClosedBuffer, RecentlyClosedEntry};
pub use store::{InMemoryTabStore, TabStore};
pub use tab::{PrivacyMode, TabId, TabRef, TabSeed};
