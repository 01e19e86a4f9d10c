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

//! The path stack and [`PathTracker`].
//!
//! `N` should be set to the concrete map's `Config::PATH_MAX_LEN` by convention; it is a plain
//! const generic parameter rather than one projected from `Config` directly, since tying a
//! fixed-size array's length to an associated const of a generic type parameter is not
//! expressible on stable Rust (it would require the unstable `generic_const_exprs` feature).
//! `DEFAULT_PATH_MAX_LEN` mirrors `Config::PATH_MAX_LEN`'s default.

use crate::{error::FatalError, mem::UArray, node::NodeRef};

pub const DEFAULT_PATH_MAX_LEN: usize = 10_000;

/// One recorded hop: the node we were at, and the child-slot index we followed out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop<R: NodeRef> {
    pub node: R,
    pub child_index: usize,
}

/// Sentinel meaning "the slot is the root pointer of the whole structure, not a slot inside any
/// node" (`AT_ROOT`).
pub const AT_ROOT: usize = usize::MAX;

/// Bounded LIFO of `(node, next_child_index)` pairs. Overflow is fatal.
pub struct PathStack<R: NodeRef, const N: usize = DEFAULT_PATH_MAX_LEN> {
    frames: UArray<N, Hop<R>>,
}

impl<R: NodeRef, const N: usize> Default for PathStack<R, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: NodeRef, const N: usize> PathStack<R, N> {
    pub const fn new() -> Self {
        Self {
            frames: UArray::new(),
        }
    }
    pub fn push(&mut self, node: R, child_index: usize) {
        if !self.frames.try_push(Hop { node, child_index }) {
            FatalError::PathOverflow.raise();
        }
    }
    pub fn pop(&mut self) -> Option<Hop<R>> {
        self.frames.pop()
    }
    pub fn top(&self) -> Option<&Hop<R>> {
        self.frames.last()
    }
    pub fn bottom(&self) -> Option<&Hop<R>> {
        self.frames.first()
    }
    pub fn empty(&self) -> bool {
        self.frames.is_empty()
    }
    pub fn size(&self) -> usize {
        self.frames.len()
    }
    pub fn get(&self, i: usize) -> Option<&Hop<R>> {
        self.frames.get(i)
    }
    pub fn as_slice(&self) -> &[Hop<R>] {
        &self.frames
    }
    /// O(1) ownership transfer: `self` is left empty, `other` receives the frames. Used when a
    /// `ConnPointSnapshot` hands its path over to a `ConnPoint`, and when `connect_here` restores
    /// the tracker's own stack after building a snapshot from it.
    pub fn move_to(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.frames, &mut other.frames);
        self.frames.clear();
    }
}

/// Iterator-like helper that walks the live tree while building the path stack.
/// Generic over the same capability set the engine is built against: it only needs to read
/// child slots, so it works for both search-tree and general-tree maps.
pub struct PathTracker<'r, R: NodeRef, const N: usize = DEFAULT_PATH_MAX_LEN> {
    root_ptr: &'r mut R,
    current: R,
    path: PathStack<R, N>,
}

impl<'r, R: NodeRef, const N: usize> PathTracker<'r, R, N> {
    pub fn new(root_ptr: &'r mut R) -> Self {
        let current = *root_ptr;
        Self {
            root_ptr,
            current,
            path: PathStack::new(),
        }
    }

    pub fn current(&self) -> R {
        self.current
    }

    pub fn root_ptr(&self) -> *mut R {
        self.root_ptr as *const R as *mut R
    }

    /// Pushes the current node (with the child index we're about to follow) and descends.
    pub fn move_to_child(&mut self, child_index: usize, next: R) {
        self.path.push(self.current, child_index);
        self.current = next;
    }

    /// Pops up to `n` frames, moving `current` back up the path. Returns the number of frames
    /// actually popped (fewer than `n` if the root was reached first).
    pub fn move_up(&mut self, n: usize) -> usize {
        let mut popped = 0;
        while popped < n {
            match self.path.pop() {
                Some(hop) => {
                    self.current = hop.node;
                    popped += 1;
                }
                None => break,
            }
        }
        popped
    }

    /// Returns a `ConnPointSnapshot` where the *parent* of the current node is the connection
    /// point (or `AT_ROOT` if `current` is the root), restoring the tracker's own stack state so
    /// the tracker is otherwise unchanged.
    pub fn connect_here(&mut self) -> crate::connpoint::ConnPointSnapshot<R, N> {
        let snapshot = match self.path.pop() {
            Some(parent_hop) => {
                let snap = crate::connpoint::ConnPointSnapshot {
                    root_ptr: self.root_ptr as *const R as *mut R,
                    connection_point: Some(parent_hop.node),
                    con_ptr_snapshot: self.current,
                    con_ptr_child_index: parent_hop.child_index,
                    path: clone_frames(&self.path),
                };
                self.path.push(parent_hop.node, parent_hop.child_index);
                snap
            }
            None => crate::connpoint::ConnPointSnapshot {
                root_ptr: self.root_ptr as *const R as *mut R,
                connection_point: None,
                con_ptr_snapshot: self.current,
                con_ptr_child_index: AT_ROOT,
                path: PathStack::new(),
            },
        };
        snapshot
    }
}

fn clone_frames<R: NodeRef, const N: usize>(stack: &PathStack<R, N>) -> PathStack<R, N> {
    let mut out = PathStack::new();
    for hop in stack.as_slice() {
        out.push(hop.node, hop.child_index);
    }
    out
}
