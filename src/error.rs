//! `tabgrid` Error Types
//!
//! Centralized error handling using thiserror for type-safe errors.

use crate::batcher::ChangeOp;
use crate::partition::Section;
use crate::recently_closed::{BatchId, EntryId};
use crate::tab::TabId;
use thiserror::Error;

/// Top-level error type for `tabgrid`
#[derive(Error, Debug)]
pub enum TabGridError {
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Display apply error: {0}")]
    Apply(#[from] ApplyError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural-integrity conditions reported by coordinator operations.
///
/// The coordinator has logged the condition and skipped the requested
/// change by the time one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Stale tab reference: {0}")]
    StaleReference(TabId),

    #[error("Invalid range: {from} -> {to} (len {len})")]
    InvalidRange { from: usize, to: usize, len: usize },

    #[error("Index {index} lies in the {section} section, which is not reorderable")]
    NotReorderable { index: usize, section: Section },

    #[error("Recently closed entry not found: {0}")]
    UnknownRecentlyClosed(EntryId),

    #[error("Recently closed batch not found: {0}")]
    UnknownBatch(BatchId),
}

/// Failures reported by a display surface while committing a batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Structural mismatch: expected {expected} items, found {actual}")]
    StructuralMismatch { expected: usize, actual: usize },

    #[error("Operation {op:?} out of bounds for {len} items")]
    OutOfBounds { op: ChangeOp, len: usize },

    #[error("Apply rejected: {0}")]
    Rejected(String),
}

/// Background save failures
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("No session file found")]
    NotFound,

    #[error("Save rejected: {0}")]
    Rejected(String),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Result type alias for `tabgrid`
pub type Result<T> = std::result::Result<T, TabGridError>;

/// Result type alias for coordinator operations
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
