//! Session persistence
//!
//! Provides:
//! - Versioned JSON session snapshots with atomic writes
//! - The async `Persistence` seam the coordinator saves through
//! - A queue that runs saves one at a time, in mutation order

use crate::error::PersistenceError;
use crate::tab::{TabId, TabRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Version of the session file format
pub const SESSION_VERSION: u32 = 1;

/// Persisted state of the normal-mode tab list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Normal-mode tabs in backing order
    pub tabs: Vec<TabRef>,
    pub selected: Option<TabId>,
}

impl SessionSnapshot {
    pub fn new(tabs: Vec<TabRef>, selected: Option<TabId>, saved_at: DateTime<Utc>) -> Self {
        Self {
            version: SESSION_VERSION,
            saved_at,
            tabs,
            selected,
        }
    }

    /// Save to `path` via a temporary file and rename
    pub fn save_to(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, path)?;

        tracing::debug!(tabs = self.tabs.len(), "Session saved to {:?}", path);
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, PersistenceError> {
        if !path.exists() {
            return Err(PersistenceError::NotFound);
        }

        let json = std::fs::read_to_string(path)?;
        let snapshot: SessionSnapshot = serde_json::from_str(&json)?;

        if snapshot.version != SESSION_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: SESSION_VERSION,
                actual: snapshot.version,
            });
        }

        tracing::info!(tabs = snapshot.tabs.len(), "Session loaded from {:?}", path);
        Ok(snapshot)
    }
}

/// Background storage for tab metadata
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn persist_snapshot(&self, snapshot: SessionSnapshot) -> Result<(), PersistenceError>;
}

/// Stores the session as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SessionSnapshot, PersistenceError> {
        SessionSnapshot::load_from(&self.path)
    }
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    async fn persist_snapshot(&self, snapshot: SessionSnapshot) -> Result<(), PersistenceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || snapshot.save_to(&path))
            .await
            .map_err(|e| PersistenceError::Rejected(format!("save task failed: {e}")))?
    }
}

/// Keeps snapshots in memory; can be told to fail
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<Vec<SessionSnapshot>>,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<SessionSnapshot> {
        self.lock().clone()
    }

    pub fn latest(&self) -> Option<SessionSnapshot> {
        self.lock().last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SessionSnapshot>> {
        self.saved.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn persist_snapshot(&self, snapshot: SessionSnapshot) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Rejected("storage unavailable".to_string()));
        }
        self.lock().push(snapshot);
        Ok(())
    }
}

struct PersistRequest {
    snapshot: SessionSnapshot,
    ack: oneshot::Sender<bool>,
}

/// Serializes saves onto a single background task
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<PersistRequest>,
}

impl std::fmt::Debug for PersistRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistRequest")
            .field("tabs", &self.snapshot.tabs.len())
            .finish()
    }
}

impl PersistenceQueue {
    /// Start the save worker on `runtime`
    pub fn spawn(runtime: &Handle, persistence: Arc<dyn Persistence>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<PersistRequest>();
        runtime.spawn(async move {
            while let Some(request) = receiver.recv().await {
                let tabs = request.snapshot.tabs.len();
                let saved = match persistence.persist_snapshot(request.snapshot).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(tabs, "Failed to persist tab snapshot: {}", e);
                        false
                    }
                };
                let _ = request.ack.send(saved);
            }
            tracing::debug!("Persistence queue closed");
        });
        Self { sender }
    }

    /// Queue a save. The receiver resolves to whether it succeeded.
    pub fn submit(&self, snapshot: SessionSnapshot) -> oneshot::Receiver<bool> {
        let (ack, receiver) = oneshot::channel();
        if self.sender.send(PersistRequest { snapshot, ack }).is_err() {
            tracing::warn!("Persistence queue is gone; snapshot dropped");
        }
        receiver
    }
}
