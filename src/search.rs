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

//! Search-tree mode helpers: plain reads, no locks, no arena involvement.

use crate::{
    config::Config,
    node::{ChildIndex, SearchNode},
    path::PathTracker,
};

/// Descends from `root` following `next_child(k)` until either a node already holds `k` or we
/// run off the tree. Returns the node that `traversal_done(k)` fired on, or `None`.
pub fn find<N, C>(root: *const N, k: &N::Key) -> Option<*const N>
where
    N: SearchNode<C, Ref = *const N>,
    C: Config,
{
    let mut current = root;
    while !current.is_null() {
        let node = unsafe { &*current };
        if node.traversal_done(k) {
            return Some(current);
        }
        current = node.get_child(node.next_child(k));
    }
    None
}

/// As [`find`], but descends towards a specific already-located node instead of a key.
pub fn find_target_node<N, C>(root: *const N, target: *const N) -> Option<*const N>
where
    N: SearchNode<C, Ref = *const N>,
    C: Config,
{
    let mut current = root;
    while !current.is_null() {
        if current == target {
            return Some(current);
        }
        let node = unsafe { &*current };
        current = node.get_child(node.next_child_towards(unsafe { &*target }));
    }
    None
}

/// Outcome of a `find_conn_point` walk: the snapshot needed to build a `ConnPoint`,
/// plus whether the key was already present.
pub struct ConnPointLookup<N: SearchNode<C, Ref = *const N>, C: Config, const PATH_N: usize> {
    pub snapshot: crate::connpoint::ConnPointSnapshot<*const N, PATH_N>,
    pub found: bool,
    pub found_node: Option<*const N>,
    _marker: core::marker::PhantomData<C>,
}

/// Walks from `*root_ptr` pushing each hop onto a path, stopping where `find` would stop, and
/// packages the result as a `ConnPointSnapshot` plus a found/not-found flag.
pub fn find_conn_point<N, C, const PATH_N: usize>(
    k: &N::Key,
    root_ptr: &mut *const N,
) -> ConnPointLookup<N, C, PATH_N>
where
    N: SearchNode<C, Ref = *const N>,
    C: Config,
{
    let mut tracker: PathTracker<*const N, PATH_N> = PathTracker::new(root_ptr);
    loop {
        let current = tracker.current();
        if current.is_null() {
            break;
        }
        let node = unsafe { &*current };
        if node.traversal_done(k) {
            break;
        }
        let idx: ChildIndex = node.next_child(k);
        let next = node.get_child(idx);
        tracker.move_to_child(idx, next);
    }
    let found_node = {
        let c = tracker.current();
        if c.is_null() {
            None
        } else {
            Some(c)
        }
    };
    let snapshot = tracker.connect_here();
    let found = found_node
        .map(|n| unsafe { &*n }.has_key(k))
        .unwrap_or(false);
    ConnPointLookup {
        snapshot,
        found,
        found_node,
        _marker: core::marker::PhantomData,
    }
}
