/*
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

//! [`SafeNode`], the per-attempt copy-on-write wrapper over a user node.
//!
//! Engine-internal code fixes `N::Ref = *const N`: the live tree is addressed by raw pointers
//! into an arena (pointers are raw addresses into an arena; nodes never move once allocated),
//! so a `SafeNode<N, C>` can always dereference its `original`/`copy` pointers
//! directly instead of going through the opaque `NodeRef` abstraction a second time.
//!
//! Child-slot arrays (`children_pointers_snapshot`, `children`, `modified`) are sized at
//! `C::ARITY` and held in `Vec`, not a fixed-length array: tying an array's length to an
//! associated const of a generic type parameter needs the unstable `generic_const_exprs`
//! feature, so the bound is only enforced at construction time (every `Vec` here is built with
//! exactly `C::ARITY` elements and never resized afterwards).

use crate::{config::Config, connpoint::ConnPoint, node::TreeNode};
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Wraps a node that is live in the tree; its snapshot participates in validation.
    OrigTreeNode,
    /// Wraps a node that is live in the tree but is stitched in without independent validation,
    /// because an ancestor's own snapshot already covers it (`ConnPoint::wrap_no_validate`).
    OrigTreeNoValidation,
    /// Wraps a brand-new node that has no live-tree counterpart yet.
    NewNode,
}

pub struct SafeNode<N, C>
where
    N: TreeNode<C, Ref = *const N>,
    C: Config,
{
    original: *const N,
    copy: Cell<Option<*mut N>>,
    children_pointers_snapshot: Vec<*const N>,
    children: Vec<Cell<*mut SafeNode<N, C>>>,
    modified: Vec<Cell<bool>>,
    node_type: NodeType,
    deleted: Cell<bool>,
}

impl<N, C> SafeNode<N, C>
where
    N: TreeNode<C, Ref = *const N>,
    C: Config,
{
    /// Wraps a live-tree node. `validate` selects `OrigTreeNode` (normal) vs
    /// `OrigTreeNoValidation` (`ConnPoint::wrap_no_validate`).
    pub(crate) fn new_orig(original: *const N, validate: bool) -> Self {
        let snapshot = if original.is_null() {
            Vec::new()
        } else {
            let node = unsafe { &*original };
            (0..C::ARITY).map(|i| node.get_child(i)).collect()
        };
        Self {
            original,
            copy: Cell::new(None),
            children_pointers_snapshot: snapshot,
            children: (0..C::ARITY).map(|_| Cell::new(std::ptr::null_mut())).collect(),
            modified: (0..C::ARITY).map(|_| Cell::new(false)).collect(),
            node_type: if validate {
                NodeType::OrigTreeNode
            } else {
                NodeType::OrigTreeNoValidation
            },
            deleted: Cell::new(false),
        }
    }

    /// Wraps a node that was just placement-allocated into the user arena (`ConnPoint::create_safe`).
    /// `modified` starts all-true since every slot's authoritative value is
    /// already the arena-resident node, not a snapshot awaiting promotion.
    pub(crate) fn new_created(node_ptr: *mut N) -> Self {
        Self {
            original: std::ptr::null(),
            copy: Cell::new(Some(node_ptr)),
            children_pointers_snapshot: Vec::new(),
            children: (0..C::ARITY).map(|_| Cell::new(std::ptr::null_mut())).collect(),
            modified: (0..C::ARITY).map(|_| Cell::new(true)).collect(),
            node_type: NodeType::NewNode,
            deleted: Cell::new(false),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.set(true);
    }

    /// Borrow read-only of the live node. Never triggers promotion.
    pub fn peek_original(&self) -> Option<&N> {
        if self.original.is_null() {
            None
        } else {
            Some(unsafe { &*self.original })
        }
    }

    /// Reads child slot `i`: the captured snapshot if not yet promoted, otherwise the
    /// (possibly modified) slot of `copy`.
    pub fn peek_child(&self, i: usize) -> *const N {
        match self.copy.get() {
            Some(p) => unsafe { &*p }.get_child(i),
            None => self.children_pointers_snapshot[i],
        }
    }

    /// Ensures `copy` is a private clone of `original` with child slots equal to the snapshot;
    /// returns a mutable reference. Idempotent.
    ///
    /// When `Config::TM_EARLY_ABORT`/`TM_EARLY_ABORT_ON_COPY` is set, the moment of promotion is
    /// also the moment this attempt eagerly re-checks whether the snapshot it just copied from is
    /// already stale, abandoning the attempt (via `cp.mark_validation_aborted()`) before the
    /// tree-of-copies grows any further, instead of only discovering the mismatch at commit.
    pub fn rw_ref<const PATH_N: usize>(&self, cp: &ConnPoint<N, C, PATH_N>) -> &mut N {
        if self.copy.get().is_none() {
            let orig = self
                .peek_original()
                .expect("rw_ref: ORIG_TREE_NODE with a null original");
            let mut cloned = orig.clone();
            for (i, &snap) in self.children_pointers_snapshot.iter().enumerate() {
                cloned.set_child(i, snap);
            }
            let ptr = unsafe { cp.user_arena().create(cloned) };
            self.copy.set(Some(ptr));
            if self.node_type == NodeType::OrigTreeNode {
                if C::TM_EARLY_ABORT_ON_COPY && !self.validate_snapshot() {
                    cp.mark_validation_aborted();
                } else if C::TM_EARLY_ABORT {
                    cp.early_validate_all();
                }
            }
        }
        unsafe { &mut *self.copy.get().unwrap() }
    }

    /// The pointer that should be stitched into a parent slot to connect this node: the copy if
    /// one was ever made, otherwise the untouched original.
    pub fn node_to_be_connected(&self) -> *const N {
        match self.copy.get() {
            Some(p) => p as *const N,
            None => self.original,
        }
    }

    /// Returns the child SafeNode for slot `i`, creating one on first call and forcing
    /// promotion of `self`.
    pub fn get_child<const PATH_N: usize>(
        &self,
        i: usize,
        cp: &ConnPoint<N, C, PATH_N>,
    ) -> *mut SafeNode<N, C> {
        self.rw_ref(cp);
        let existing = self.children[i].get();
        if !existing.is_null() {
            return existing;
        }
        let child_ref = self.peek_child(i);
        let wrapped = match self.node_type {
            NodeType::NewNode => cp.wrap_no_validate(child_ref),
            _ => cp.wrap_safe(child_ref),
        };
        self.children[i].set(wrapped);
        wrapped
    }

    /// Marks slot `i` modified and stores `safe`'s `node_to_be_connected()` (or null) into
    /// `copy`. Returns the previously displaced child SafeNode, if any, for subtree-delete
    /// bookkeeping.
    pub fn set_child<const PATH_N: usize>(
        &self,
        i: usize,
        safe: Option<*mut SafeNode<N, C>>,
        cp: &ConnPoint<N, C, PATH_N>,
    ) -> Option<*mut SafeNode<N, C>> {
        let new_val = match safe {
            Some(s) => unsafe { &*s }.node_to_be_connected(),
            None => std::ptr::null(),
        };
        self.rw_ref(cp).set_child(i, new_val);
        self.modified[i].set(true);
        let displaced = self.children[i].get();
        self.children[i].set(safe.unwrap_or(std::ptr::null_mut()));
        if displaced.is_null() {
            None
        } else {
            Some(displaced)
        }
    }

    /// Recursively soft-deletes the subtree rooted at child slot `i` and clears the slot.
    pub fn clip_tree<const PATH_N: usize>(&self, i: usize, cp: &ConnPoint<N, C, PATH_N>) {
        let existing = self.children[i].get();
        if !existing.is_null() {
            let child = unsafe { &*existing };
            for j in 0..C::ARITY {
                child.clip_tree(j, cp);
            }
            child.mark_deleted();
        }
        self.set_child(i, None, cp);
    }

    /// For an `OrigTreeNode`, every snapshot slot must still match the live node's current slot.
    /// Trivially true for `NewNode`/`OrigTreeNoValidation`, which carry no snapshot to check.
    pub fn validate_snapshot(&self) -> bool {
        if self.node_type != NodeType::OrigTreeNode {
            return true;
        }
        match self.peek_original() {
            Some(orig) => self
                .children_pointers_snapshot
                .iter()
                .enumerate()
                .all(|(i, &snap)| orig.get_child(i) == snap),
            None => true,
        }
    }
}
