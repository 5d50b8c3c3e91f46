//! The AVL tournament tree over child cursors.
//!
//! A C-style intrusive-pointer AVL implementation typically embeds
//! `parent`/`lower`/`higher` pointers directly in each node and leans on a
//! sentinel node to hold the true root's `higher` pointer. This one instead
//! keeps an arena of cursors indexed by `NodeId`: tree links become
//! `Option<NodeId>` and the tree's root is tracked directly by the owning
//! `MergeWalker` (`Option<NodeId>`). That sidesteps the sentinel trick
//! entirely — there is no sentinel node whose balance must be protected from
//! updates, so the ascent loop just stops when a node has no parent.

use std::cmp::Ordering;

use crate::cursor::IndexCursor;
use crate::error::abort_invariant;

/// Index into a `MergeWalker`'s arena. Never reused across a scan's life —
/// once assigned to a child cursor at `open`, the id is stable until the
/// `MergeWalker` itself is dropped (a drained cursor stays in the arena, just
/// unlinked from the tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// One arena slot: a child cursor plus its tree links and balance factor.
pub(crate) struct Slot {
    pub cursor: IndexCursor,
    pub parent: Option<NodeId>,
    pub lower: Option<NodeId>,
    pub higher: Option<NodeId>,
    /// Transiently ∈ {-2..=2} during a rotation, always ∈ {-1,0,1} at rest.
    pub balance: i8,
}

impl Slot {
    fn fresh(cursor: IndexCursor) -> Self {
        Slot { cursor, parent: None, lower: None, higher: None, balance: 0 }
    }
}

/// Owns every child cursor for the life of a scan. Structural tree
/// operations (`insert`, `remove`, rotations) live here rather than on
/// `MergeWalker` so they can be unit-tested against the arena directly,
/// bypassing cursor advancement.
pub(crate) struct Arena {
    slots: Vec<Slot>,
}

impl Arena {
    pub fn new(cursors: Vec<IndexCursor>) -> (Self, Vec<NodeId>) {
        let ids: Vec<NodeId> = (0..cursors.len() as u32).map(NodeId).collect();
        let slots = cursors.into_iter().map(Slot::fresh).collect();
        (Arena { slots }, ids)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn cursor(&self, id: NodeId) -> &IndexCursor {
        &self.slots[id.0 as usize].cursor
    }

    pub fn cursor_mut(&mut self, id: NodeId) -> &mut IndexCursor {
        &mut self.slots[id.0 as usize].cursor
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0 as usize].parent
    }

    pub fn lower(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0 as usize].lower
    }

    pub fn higher(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0 as usize].higher
    }

    pub fn balance(&self, id: NodeId) -> i8 {
        self.slots[id.0 as usize].balance
    }

    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.0 as usize]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.0 as usize]
    }

    /// Reset this node's tree links and balance so it can be reinserted
    /// after being drained and re-advanced.
    pub fn reset_links(&mut self, id: NodeId) {
        let slot = self.slot_mut(id);
        slot.parent = None;
        slot.lower = None;
        slot.higher = None;
        slot.balance = 0;
    }

    /// Walk leftward (`lower`) from `start` to the subtree minimum.
    pub fn minimum(&self, start: NodeId) -> NodeId {
        let mut node = start;
        while let Some(l) = self.lower(node) {
            node = l;
        }
        node
    }

    /// Replace the link by which `old_child` was reached from its parent
    /// with `new_child`, or update the tree root if `old_child` had none.
    /// Also re-pegs `new_child`'s parent. Used by every structural change
    /// (rotations, remove, the two-child successor splice).
    fn reset_parent_link(&mut self, root: &mut Option<NodeId>, old_child: NodeId, new_child: Option<NodeId>) {
        match self.parent(old_child) {
            None => *root = new_child,
            Some(p) => {
                if self.lower(p) == Some(old_child) {
                    self.slot_mut(p).lower = new_child;
                } else {
                    self.slot_mut(p).higher = new_child;
                }
            }
        }
        if let Some(nc) = new_child {
            let old_parent = self.parent(old_child);
            self.slot_mut(nc).parent = old_parent;
        }
    }

    /// Standard AVL left rotation, re-pegging parent pointers and the
    /// balance factors by the classical formula.
    fn rotate_left(&mut self, root: &mut Option<NodeId>, n: NodeId) {
        let pivot = match self.higher(n) {
            Some(p) => p,
            None => abort_invariant("avl-rotate-left", "rotate_left called on a node with no higher child"),
        };
        let pivot_lower = self.lower(pivot);
        self.slot_mut(n).higher = pivot_lower;
        if let Some(pl) = pivot_lower {
            self.slot_mut(pl).parent = Some(n);
        }
        self.slot_mut(pivot).lower = Some(n);

        let pivot_balance = self.balance(pivot);
        self.slot_mut(n).balance -= 1 + pivot_balance.max(0);
        let n_balance = self.balance(n);
        self.slot_mut(pivot).balance -= 1 - n_balance.min(0);

        self.reset_parent_link(root, n, Some(pivot));
        self.slot_mut(n).parent = Some(pivot);
    }

    /// Mirror image of `rotate_left`.
    fn rotate_right(&mut self, root: &mut Option<NodeId>, n: NodeId) {
        let pivot = match self.lower(n) {
            Some(p) => p,
            None => abort_invariant("avl-rotate-right", "rotate_right called on a node with no lower child"),
        };
        let pivot_higher = self.higher(pivot);
        self.slot_mut(n).lower = pivot_higher;
        if let Some(ph) = pivot_higher {
            self.slot_mut(ph).parent = Some(n);
        }
        self.slot_mut(pivot).higher = Some(n);

        let pivot_balance = self.balance(pivot);
        self.slot_mut(n).balance += 1 - pivot_balance.min(0);
        let n_balance = self.balance(n);
        self.slot_mut(pivot).balance += 1 + n_balance.max(0);

        self.reset_parent_link(root, n, Some(pivot));
        self.slot_mut(n).parent = Some(pivot);
    }

    /// Rebalance `n` after an insert grew one of its subtrees by one. The
    /// left-heavy branch mirrors the right-heavy one: `balance < -1` is the
    /// symmetric counterpart of `balance > 1` above it, not `balance < 1`,
    /// which would fire on every balance other than +1 instead of just the
    /// left-heavy case.
    fn rebalance_insert(&mut self, root: &mut Option<NodeId>, n: NodeId) {
        let bal = self.balance(n);
        if bal > 1 {
            let h = self.higher(n).expect("balance > 1 implies a higher child");
            if self.balance(h) < 0 {
                self.rotate_right(root, h);
            }
            self.rotate_left(root, n);
        } else if bal < -1 {
            let l = self.lower(n).expect("balance < -1 implies a lower child");
            if self.balance(l) > 0 {
                self.rotate_left(root, l);
            }
            self.rotate_right(root, n);
        }
    }

    /// Same shape as `rebalance_insert` but reports whether the subtree's
    /// height decreased, needed for correct upward propagation on delete.
    /// Uses the same symmetric `balance < -1` left-heavy predicate.
    fn rebalance_delete(&mut self, root: &mut Option<NodeId>, n: NodeId) -> bool {
        let bal = self.balance(n);
        if bal > 1 {
            let h = self.higher(n).expect("balance > 1 implies a higher child");
            if self.balance(h) < 0 {
                self.rotate_right(root, h);
                self.rotate_left(root, n);
                return true;
            }
            self.rotate_left(root, n);
            let new_parent = self.parent(n).expect("rotate_left always gives n a new parent");
            self.balance(new_parent) == 0
        } else if bal < -1 {
            let l = self.lower(n).expect("balance < -1 implies a lower child");
            if self.balance(l) > 0 {
                self.rotate_left(root, l);
                self.rotate_right(root, n);
                return true;
            }
            self.rotate_right(root, n);
            let new_parent = self.parent(n).expect("rotate_right always gives n a new parent");
            self.balance(new_parent) == 0
        } else {
            false
        }
    }

    /// Starting at `start` (whose own balance receives `delta` first), walk
    /// toward the root applying the delta and rebalancing as needed,
    /// stopping as soon as a subtree's height is known not to have changed.
    ///
    /// `start` itself is always processed, even when it has no parent (it is
    /// the tree root) — the parent/child-side lookup only decides whether
    /// the walk continues past `start`, never whether `start` is handled.
    /// Captured before `start`'s balance is mutated, since a rotation here
    /// can repoint `start`'s own parent link at a new local pivot.
    fn rebalance_upward(&mut self, root: &mut Option<NodeId>, start: NodeId, mut delta: i8) {
        let mut node = start;
        loop {
            let ascend = self.parent(node).map(|p| (p, if self.lower(p) == Some(node) { 1i8 } else { -1i8 }));

            self.slot_mut(node).balance += delta;
            if self.balance(node) == delta {
                break;
            }
            if self.balance(node) > 1 || self.balance(node) < -1 {
                if !self.rebalance_delete(root, node) {
                    break;
                }
            }

            match ascend {
                Some((parent, parent_delta)) => {
                    delta = parent_delta;
                    node = parent;
                }
                None => break,
            }
        }
    }

    /// BST descent by `cmp`, dropping exact duplicates. Returns `false` if
    /// `new_node` was a duplicate and was not inserted.
    pub fn insert(
        &mut self,
        root: &mut Option<NodeId>,
        new_node: NodeId,
        mut cmp: impl FnMut(&IndexCursor, &IndexCursor) -> Ordering,
    ) -> bool {
        let head = match *root {
            None => {
                *root = Some(new_node);
                self.slot_mut(new_node).parent = None;
                self.slot_mut(new_node).balance = 0;
                return true;
            }
            Some(h) => h,
        };

        let mut node = head;
        loop {
            let ordering = cmp(self.cursor(new_node), self.cursor(node));
            match ordering {
                Ordering::Less => match self.lower(node) {
                    Some(l) => node = l,
                    None => {
                        self.slot_mut(node).lower = Some(new_node);
                        self.slot_mut(node).balance -= 1;
                        break;
                    }
                },
                Ordering::Greater => match self.higher(node) {
                    Some(h) => node = h,
                    None => {
                        self.slot_mut(node).higher = Some(new_node);
                        self.slot_mut(node).balance += 1;
                        break;
                    }
                },
                Ordering::Equal => return false,
            }
        }
        self.slot_mut(new_node).parent = Some(node);

        let mut cur = node;
        while self.balance(cur) != 0 {
            let parent = match self.parent(cur) {
                Some(p) => p,
                None => break,
            };
            let came_from_lower = self.lower(parent) == Some(cur);
            if came_from_lower {
                self.slot_mut(parent).balance -= 1;
                if self.balance(parent) < -1 {
                    self.rebalance_insert(root, parent);
                    break;
                }
            } else {
                self.slot_mut(parent).balance += 1;
                if self.balance(parent) > 1 {
                    self.rebalance_insert(root, parent);
                    break;
                }
            }
            cur = parent;
        }
        true
    }

    /// The in-order successor of `subtree_root` (leftmost node in the
    /// subtree rooted there), detaching it on the way back up and applying
    /// `rebalance_delete` wherever a subtree shrinks. Returns the successor
    /// and whether the subtree it was pulled from got shallower.
    fn get_successor(&mut self, root: &mut Option<NodeId>, node: NodeId) -> (NodeId, bool) {
        if let Some(lower) = self.lower(node) {
            let was = self.balance(node);
            let (succ, mut shallower) = self.get_successor(root, lower);
            if shallower {
                self.slot_mut(node).balance += 1;
                if self.balance(node) > 1 {
                    shallower = self.rebalance_delete(root, node);
                } else if was == 0 {
                    shallower = false;
                }
            }
            (succ, shallower)
        } else {
            let higher = self.higher(node);
            self.reset_parent_link(root, node, higher);
            (node, true)
        }
    }

    /// Splice a node with zero or one child out of the tree directly, or
    /// substitute its in-order successor when it has two children.
    pub fn remove(&mut self, root: &mut Option<NodeId>, node: NodeId) {
        match (self.lower(node), self.higher(node)) {
            (lower, higher) if lower.is_none() || higher.is_none() => {
                let next = lower.or(higher);
                let parent = self.parent(node);
                match parent {
                    None => {
                        *root = next;
                        if let Some(n) = next {
                            self.slot_mut(n).parent = None;
                        }
                    }
                    Some(p) => {
                        let delta: i8 = if self.lower(p) == Some(node) { 1 } else { -1 };
                        self.reset_parent_link(root, node, next);
                        self.rebalance_upward(root, p, delta);
                    }
                }
            }
            (Some(_lower), Some(higher)) => {
                let (succ, shallower) = self.get_successor(root, higher);
                let orig_lower = self.lower(node);
                let orig_higher = self.higher(node);
                self.slot_mut(succ).lower = orig_lower;
                if let Some(l) = orig_lower {
                    self.slot_mut(l).parent = Some(succ);
                }
                self.slot_mut(succ).higher = orig_higher;
                if let Some(h) = orig_higher {
                    self.slot_mut(h).parent = Some(succ);
                }
                self.slot_mut(succ).balance = self.balance(node);
                self.reset_parent_link(root, node, Some(succ));
                if shallower {
                    self.rebalance_upward(root, succ, -1);
                }
            }
            _ => unreachable!(),
        }
    }

    /// Property test hook: walk the whole tree and assert the AVL height
    /// invariant and BST order hold everywhere.
    #[cfg(test)]
    pub fn assert_avl_invariant(&self, root: Option<NodeId>, cmp: &dyn Fn(&IndexCursor, &IndexCursor) -> Ordering) -> i32 {
        fn height(arena: &Arena, node: Option<NodeId>, cmp: &dyn Fn(&IndexCursor, &IndexCursor) -> Ordering) -> i32 {
            match node {
                None => 0,
                Some(n) => {
                    let lh = height(arena, arena.lower(n), cmp);
                    let hh = height(arena, arena.higher(n), cmp);
                    assert!((lh - hh).abs() <= 1, "AVL invariant violated at a node");
                    if let Some(l) = arena.lower(n) {
                        assert_eq!(cmp(arena.cursor(l), arena.cursor(n)), Ordering::Less);
                    }
                    if let Some(h) = arena.higher(n) {
                        assert_eq!(cmp(arena.cursor(h), arena.cursor(n)), Ordering::Greater);
                    }
                    1 + lh.max(hh)
                }
            }
        }
        height(self, root, cmp)
    }
}
