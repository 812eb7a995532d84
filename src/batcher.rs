//! Batching of structural change operations for the display surface
//!
//! Mutations record [`ChangeOp`]s into an open batch. A flush hands the
//! whole batch to the display surface, which applies it as one transaction.
//! While a batch is in flight, newly recorded ops go to a deferred batch and
//! never into the one being applied.
//!
//! Indices in a batch are sequential: each op addresses the list as it is
//! after every earlier op of the same batch has been applied.

use crate::tab::TabId;
use serde::{Deserialize, Serialize};

/// One structural diff instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOp {
    Insert { index: usize },
    Delete { index: usize },
    /// Remove at `from`, then insert at `to`
    Move { from: usize, to: usize },
    ReloadAll,
}

/// Externally visible batcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Accumulating,
    Flushing,
}

/// A batch handed to the display surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub ops: Vec<ChangeOp>,
    /// Visible backing order once every op has been applied
    pub visible: Vec<TabId>,
}

impl ChangeSet {
    pub fn is_reload(&self) -> bool {
        self.ops.contains(&ChangeOp::ReloadAll)
    }
}

#[derive(Debug, Clone)]
struct PendingOp {
    op: ChangeOp,
    subject: Option<TabId>,
}

#[derive(Debug)]
enum BatchState {
    Idle,
    Accumulating(Vec<PendingOp>),
    Flushing {
        in_flight: usize,
        deferred: Vec<PendingOp>,
    },
}

/// Accumulates change ops and drives the Idle/Accumulating/Flushing cycle
#[derive(Debug)]
pub struct ChangeBatcher {
    state: BatchState,
}

impl Default for ChangeBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBatcher {
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
        }
    }

    pub fn phase(&self) -> BatchPhase {
        match self.state {
            BatchState::Idle => BatchPhase::Idle,
            BatchState::Accumulating(_) => BatchPhase::Accumulating,
            BatchState::Flushing { .. } => BatchPhase::Flushing,
        }
    }

    /// Ops waiting for the next flush (the deferred batch while flushing)
    pub fn pending(&self) -> Vec<ChangeOp> {
        let batch = match &self.state {
            BatchState::Idle => return Vec::new(),
            BatchState::Accumulating(batch) => batch,
            BatchState::Flushing { deferred, .. } => deferred,
        };
        batch.iter().map(|pending| pending.op).collect()
    }

    pub fn has_pending(&self) -> bool {
        match &self.state {
            BatchState::Idle => false,
            BatchState::Accumulating(batch) => !batch.is_empty(),
            BatchState::Flushing { deferred, .. } => !deferred.is_empty(),
        }
    }

    pub fn record_insert(&mut self, subject: TabId, index: usize) {
        self.record(ChangeOp::Insert { index }, Some(subject));
    }

    pub fn record_delete(&mut self, subject: TabId, index: usize) {
        self.record(ChangeOp::Delete { index }, Some(subject));
    }

    pub fn record_move(&mut self, subject: TabId, from: usize, to: usize) {
        self.record(ChangeOp::Move { from, to }, Some(subject));
    }

    pub fn record_reload(&mut self) {
        self.record(ChangeOp::ReloadAll, None);
    }

    fn record(&mut self, op: ChangeOp, subject: Option<TabId>) {
        let pending = PendingOp { op, subject };
        match self.state {
            BatchState::Idle => {
                let mut batch = Vec::new();
                push(&mut batch, pending);
                if !batch.is_empty() {
                    self.state = BatchState::Accumulating(batch);
                }
            }
            BatchState::Accumulating(ref mut batch) => push(batch, pending),
            BatchState::Flushing {
                ref mut deferred, ..
            } => {
                tracing::trace!("Deferring change op recorded during flush");
                push(deferred, pending);
            }
        }
    }

    /// Hand the accumulated batch over for applying.
    ///
    /// Returns `None` when there is nothing to flush or a flush is already
    /// in flight.
    pub fn begin_flush(&mut self) -> Option<Vec<ChangeOp>> {
        match std::mem::replace(&mut self.state, BatchState::Idle) {
            BatchState::Accumulating(batch) if !batch.is_empty() => {
                let ops: Vec<ChangeOp> = batch.into_iter().map(|pending| pending.op).collect();
                self.state = BatchState::Flushing {
                    in_flight: ops.len(),
                    deferred: Vec::new(),
                };
                tracing::debug!(ops = ops.len(), "Flushing change batch");
                Some(ops)
            }
            BatchState::Accumulating(_) | BatchState::Idle => None,
            flushing @ BatchState::Flushing { .. } => {
                tracing::debug!("Flush requested while a batch is in flight");
                self.state = flushing;
                None
            }
        }
    }

    /// Close the in-flight batch. Ops deferred meanwhile become the next batch.
    pub fn complete_flush(&mut self) {
        match std::mem::replace(&mut self.state, BatchState::Idle) {
            BatchState::Flushing {
                in_flight,
                deferred,
            } => {
                tracing::trace!(in_flight, deferred = deferred.len(), "Flush completed");
                if !deferred.is_empty() {
                    self.state = BatchState::Accumulating(deferred);
                }
            }
            other => {
                tracing::warn!("complete_flush called without a batch in flight");
                self.state = other;
            }
        }
    }
}

fn push(batch: &mut Vec<PendingOp>, pending: PendingOp) {
    if batch.iter().any(|entry| entry.op == ChangeOp::ReloadAll) {
        return;
    }

    match pending.op {
        ChangeOp::ReloadAll => {
            batch.clear();
            batch.push(pending);
        }
        ChangeOp::Move { from, to } if from == to => {}
        ChangeOp::Delete { .. } => {
            let inserted = pending.subject.and_then(|subject| {
                batch.iter().position(|entry| {
                    entry.subject == Some(subject) && matches!(entry.op, ChangeOp::Insert { .. })
                })
            });
            match (inserted, pending.subject) {
                (Some(position), Some(subject)) => cancel_insert(batch, position, subject),
                _ => batch.push(pending),
            }
        }
        _ => batch.push(pending),
    }
}

/// Drop the pending insert at `position` together with the delete that
/// undoes it, renumbering every op in between as if `subject` never existed.
fn cancel_insert(batch: &mut Vec<PendingOp>, position: usize, subject: TabId) {
    let ChangeOp::Insert { index } = batch[position].op else {
        return;
    };
    let tail = batch.split_off(position + 1);
    batch.pop();

    // Position of `subject` in the list as seen by each op of the tail
    let mut current = index;
    for pending in tail {
        let op = match pending.op {
            ChangeOp::Insert { index } => {
                let shifted = if index <= current { index } else { index - 1 };
                if index <= current {
                    current += 1;
                }
                ChangeOp::Insert { index: shifted }
            }
            ChangeOp::Delete { index } => {
                let shifted = if index < current { index } else { index - 1 };
                if index < current {
                    current -= 1;
                }
                ChangeOp::Delete { index: shifted }
            }
            ChangeOp::Move { to, .. } if pending.subject == Some(subject) => {
                current = to;
                continue;
            }
            ChangeOp::Move { from, to } => {
                let from_shifted = if from < current { from } else { from - 1 };
                if from < current {
                    current -= 1;
                }
                let to_shifted = if to <= current { to } else { to - 1 };
                if to <= current {
                    current += 1;
                }
                if from_shifted == to_shifted {
                    continue;
                }
                ChangeOp::Move {
                    from: from_shifted,
                    to: to_shifted,
                }
            }
            ChangeOp::ReloadAll => ChangeOp::ReloadAll,
        };
        batch.push(PendingOp {
            op,
            subject: pending.subject,
        });
    }
}
