//! `MergeWalker`: the merge coordinator.
//!
//! At any instant the tree contains exactly one live-current record per
//! still-productive child cursor. `next()` extracts the minimum, advances
//! that child, and re-inserts it if it produced another record.

use std::sync::Arc;

use crate::cursor::{CursorOutcome, IndexCursor};
use crate::error::ScanResult;
use crate::key::{compare_keyed, KeyCodec};
use crate::node::{Arena, NodeId};
use crate::record::Record;

/// Priming state, made an explicit tagged variant rather than an implicit
/// `first: bool` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkerState {
    Unprimed,
    Active,
    Drained,
}

/// Outcome of one `MergeWalker::next` call.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Record(Record),
    LockDenied(crate::record::RecordId),
    Exhausted,
}

/// Owns a collection of child cursors and the AVL tree over them; exposes a
/// single `next()` that returns the globally smallest current record across
/// all children.
pub struct MergeWalker {
    arena: Arena,
    root: Option<NodeId>,
    /// Children that have not yet produced their first record, in the order
    /// they were registered. Flattened into a `Vec` since the arena already
    /// gives every child a stable id.
    setup_list: Vec<NodeId>,
    state: WalkerState,
    codec: Arc<dyn KeyCodec>,
    /// A denial surfaced by a child's re-advance, not yet handed back to the
    /// caller because the call that produced it already had to return the
    /// record it had just extracted (see `next`).
    pending_denial: Option<crate::record::RecordId>,
    /// The child whose re-advance is paused on a denial, either still
    /// pending in `pending_denial` or already surfaced on a prior call.
    /// Resumed — not retried — on the following `next()`/`prime()` step,
    /// since the denied candidate itself has already been consumed.
    pending_resume: Option<NodeId>,
}

impl MergeWalker {
    pub(crate) fn new(cursors: Vec<IndexCursor>, codec: Arc<dyn KeyCodec>) -> Self {
        let (arena, ids) = Arena::new(cursors);
        MergeWalker {
            arena,
            root: None,
            setup_list: ids,
            state: WalkerState::Unprimed,
            codec,
            pending_denial: None,
            pending_resume: None,
        }
    }

    fn cmp(codec: &dyn KeyCodec, a: &IndexCursor, b: &IndexCursor) -> std::cmp::Ordering {
        let a_id = a.current_record_id().expect("only live nodes are compared");
        let b_id = b.current_record_id().expect("only live nodes are compared");
        compare_keyed(codec, a.current_key_bytes(), a_id, b.current_key_bytes(), b_id)
    }

    /// Advance `id` until it either produces a record that gets inserted
    /// into the tree, or drains. Shared by priming and the steady-state
    /// step: both repeatedly advance, insert on success, and drop on
    /// exhaustion.
    fn advance_and_insert(&mut self, id: NodeId, lock_for_update: bool) -> ScanResult<Option<crate::record::RecordId>> {
        loop {
            match self.arena.cursor_mut(id).advance_outcome(lock_for_update)? {
                CursorOutcome::Record(_) => {
                    self.arena.reset_links(id);
                    let codec = Arc::clone(&self.codec);
                    let inserted = self.arena.insert(&mut self.root, id, |a, b| Self::cmp(&*codec, a, b));
                    if inserted {
                        return Ok(None);
                    }
                    // Exact (key, record_id) duplicate across two indexes
                    // (spec.md I3) — this row is already represented in the
                    // tree by another child. Drop it and keep advancing.
                    tracing::trace!(index = %self.arena.cursor(id).identity().name, "dropping duplicate (key, record_id)");
                    continue;
                }
                CursorOutcome::LockDenied(rid) => return Ok(Some(rid)),
                CursorOutcome::Exhausted => return Ok(None),
            }
        }
    }

    /// Prime every not-yet-started child, one at a time, so a denial
    /// partway through doesn't strand the children still waiting behind it:
    /// the denying child is remembered in `pending_resume` and the rest of
    /// `setup_list` stays put for the next call to pick up from.
    fn prime(&mut self, lock_for_update: bool) -> ScanResult<Option<crate::record::RecordId>> {
        if let Some(id) = self.pending_resume.take() {
            if let Some(denied) = self.advance_and_insert(id, lock_for_update)? {
                self.pending_resume = Some(id);
                return Ok(Some(denied));
            }
        }
        while let Some(id) = self.setup_list.pop() {
            if let Some(denied) = self.advance_and_insert(id, lock_for_update)? {
                self.pending_resume = Some(id);
                return Ok(Some(denied));
            }
        }
        self.state = WalkerState::Active;
        Ok(None)
    }

    /// spec.md §4.5 steady-state `next()`: extract the tree minimum, take
    /// its current record, remove it, re-advance and reinsert it if it has
    /// more to give, and return the saved record.
    pub fn next(&mut self, lock_for_update: bool) -> ScanResult<MergeOutcome> {
        if self.state == WalkerState::Unprimed {
            if let Some(denied) = self.prime(lock_for_update)? {
                return Ok(MergeOutcome::LockDenied(denied));
            }
        }

        // A denial from a previous call's re-advance hasn't been surfaced
        // yet — the record it would have otherwise displaced was already
        // handed back by that earlier call, so there is nothing left to
        // protect here.
        if let Some(denied) = self.pending_denial.take() {
            return Ok(MergeOutcome::LockDenied(denied));
        }
        // A denial already surfaced on a prior call; resume that child's
        // stream from where it paused before touching the tree again.
        if let Some(id) = self.pending_resume.take() {
            if let Some(denied) = self.advance_and_insert(id, lock_for_update)? {
                self.pending_resume = Some(id);
                return Ok(MergeOutcome::LockDenied(denied));
            }
        }

        let Some(root) = self.root else {
            self.state = WalkerState::Drained;
            return Ok(MergeOutcome::Exhausted);
        };

        let m = self.arena.minimum(root);
        let record = self
            .arena
            .cursor_mut(m)
            .take_current_record()
            .expect("a node live in the tree always holds its current record");

        self.arena.remove(&mut self.root, m);

        if let Some(denied) = self.advance_and_insert(m, lock_for_update)? {
            // The denial belongs to this child's *next* candidate, not to
            // the record just extracted — yield that record now and defer
            // the denial (and the child's resume) to the calls that follow.
            self.pending_denial = Some(denied);
            self.pending_resume = Some(m);
        }

        Ok(MergeOutcome::Record(record))
    }

    /// Release every still-retained record across both the live tree and
    /// the not-yet-primed setup list, and mark the walker drained so a
    /// subsequent `next()` is a safe no-op (spec.md §8 P4, P5; §9 Design
    /// Notes on the original's destructor leaving `currentRecord`
    /// unreleased being a bug to guarantee against here).
    pub fn close(&mut self) {
        for id in self.setup_list.drain(..) {
            self.arena.cursor_mut(id).take_current_record();
        }
        self.drain_tree_records(self.root);
        self.root = None;
        self.state = WalkerState::Drained;
        self.pending_denial = None;
        self.pending_resume = None;
    }

    fn drain_tree_records(&mut self, node: Option<NodeId>) {
        let Some(id) = node else { return };
        let lower = self.arena.lower(id);
        let higher = self.arena.higher(id);
        self.arena.cursor_mut(id).take_current_record();
        self.drain_tree_records(lower);
        self.drain_tree_records(higher);
    }

    #[cfg(test)]
    pub(crate) fn assert_avl_invariant(&self) {
        let codec = Arc::clone(&self.codec);
        self.arena.assert_avl_invariant(self.root, &|a, b| Self::cmp(&*codec, a, b));
    }
}

impl Drop for MergeWalker {
    fn drop(&mut self) {
        self.close();
    }
}
