//! Display surface collaborator
//!
//! A surface receives [`ChangeSet`]s and must commit each one all-or-nothing.

use crate::batcher::{ChangeOp, ChangeSet};
use crate::error::ApplyError;
use crate::tab::TabId;
use async_trait::async_trait;
use std::sync::Mutex;

/// Rendering side of the coordinator (grid or list view)
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    async fn apply(&self, changes: ChangeSet) -> Result<(), ApplyError>;
}

#[derive(Debug, Default)]
struct MirrorState {
    items: Vec<TabId>,
    applied: Vec<ChangeSet>,
    fail_next: Option<ApplyError>,
}

/// Surface that mirrors the visible list and validates every batch.
///
/// Ops are replayed against the mirrored list. Positions that existed
/// before the batch must line up with the batch's `visible` order
/// afterwards, otherwise the batch is rejected and nothing is committed.
#[derive(Debug, Default)]
pub struct MirrorSurface {
    state: Mutex<MirrorState>,
}

impl MirrorSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently committed order
    pub fn items(&self) -> Vec<TabId> {
        self.lock().items.clone()
    }

    /// Every batch committed so far
    pub fn applied(&self) -> Vec<ChangeSet> {
        self.lock().applied.clone()
    }

    /// Make the next apply fail with `error`
    pub fn fail_next_apply(&self, error: ApplyError) {
        self.lock().fail_next = Some(error);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MirrorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DisplaySurface for MirrorSurface {
    async fn apply(&self, changes: ChangeSet) -> Result<(), ApplyError> {
        let mut state = self.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        if !changes.is_reload() {
            replay(&state.items, &changes)?;
        }

        state.items = changes.visible.clone();
        state.applied.push(changes);
        Ok(())
    }
}

/// Replay `changes.ops` over `items` and check the outcome against `changes.visible`
fn replay(items: &[TabId], changes: &ChangeSet) -> Result<(), ApplyError> {
    // `None` marks a slot created by an insert in this batch
    let mut working: Vec<Option<TabId>> = items.iter().copied().map(Some).collect();

    for op in &changes.ops {
        let len = working.len();
        match *op {
            ChangeOp::Insert { index } if index <= len => working.insert(index, None),
            ChangeOp::Delete { index } if index < len => {
                working.remove(index);
            }
            ChangeOp::Move { from, to } if from < len && to < len => {
                let moved = working.remove(from);
                working.insert(to, moved);
            }
            ChangeOp::ReloadAll => return Ok(()),
            op => return Err(ApplyError::OutOfBounds { op, len }),
        }
    }

    if working.len() != changes.visible.len() {
        return Err(ApplyError::StructuralMismatch {
            expected: changes.visible.len(),
            actual: working.len(),
        });
    }

    for (position, (slot, expected)) in working.iter().zip(&changes.visible).enumerate() {
        match slot {
            Some(existing) if existing != expected => {
                return Err(ApplyError::Rejected(format!(
                    "position {position} holds {existing}, expected {expected}"
                )));
            }
            None if items.contains(expected) => {
                return Err(ApplyError::Rejected(format!(
                    "position {position} inserted {expected}, which was already shown"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn ids(count: usize) -> Vec<TabId> {
        (0..count).map(|_| TabId::new()).collect()
    }

    #[test]
    fn test_reload_replaces_items() {
        let surface = MirrorSurface::new();
        let visible = ids(3);
        block_on(surface.apply(ChangeSet {
            ops: vec![ChangeOp::ReloadAll],
            visible: visible.clone(),
        }))
        .unwrap();
        assert_eq!(surface.items(), visible);
        assert_eq!(surface.applied().len(), 1);
    }

    #[test]
    fn test_valid_sequence_commits() {
        let surface = MirrorSurface::new();
        let tabs = ids(3);
        block_on(surface.apply(ChangeSet {
            ops: vec![ChangeOp::ReloadAll],
            visible: tabs[..2].to_vec(),
        }))
        .unwrap();

        // [a, b] -> insert c@1 -> [a, c, b] -> move 2->0 -> [b, a, c]
        let visible = vec![tabs[1], tabs[0], tabs[2]];
        block_on(surface.apply(ChangeSet {
            ops: vec![ChangeOp::Insert { index: 1 }, ChangeOp::Move { from: 2, to: 0 }],
            visible: visible.clone(),
        }))
        .unwrap();
        assert_eq!(surface.items(), visible);
    }

    #[test]
    fn test_out_of_bounds_rejected_without_commit() {
        let surface = MirrorSurface::new();
        let result = block_on(surface.apply(ChangeSet {
            ops: vec![ChangeOp::Delete { index: 0 }],
            visible: Vec::new(),
        }));
        assert_eq!(
            result,
            Err(ApplyError::OutOfBounds {
                op: ChangeOp::Delete { index: 0 },
                len: 0
            })
        );
        assert!(surface.applied().is_empty());
    }

    #[test]
    fn test_order_mismatch_rejected() {
        let surface = MirrorSurface::new();
        let tabs = ids(2);
        block_on(surface.apply(ChangeSet {
            ops: vec![ChangeOp::ReloadAll],
            visible: tabs.clone(),
        }))
        .unwrap();

        let result = block_on(surface.apply(ChangeSet {
            ops: vec![ChangeOp::Delete { index: 0 }],
            visible: vec![tabs[0]],
        }));
        assert!(matches!(result, Err(ApplyError::Rejected(_))));
        assert_eq!(surface.items(), tabs);
    }

    #[test]
    fn test_injected_failure() {
        let surface = MirrorSurface::new();
        surface.fail_next_apply(ApplyError::Rejected("busy".to_string()));
        let changes = ChangeSet {
            ops: vec![ChangeOp::ReloadAll],
            visible: ids(1),
        };
        assert!(block_on(surface.apply(changes.clone())).is_err());
        assert!(block_on(surface.apply(changes)).is_ok());
    }
}
