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

//! The user-node contract.
//!
//! A concrete map (BST, AVL, ...) supplies a value type implementing [`TreeNode`] and, if it
//! wants to use the search-mode helpers in `crate::search`, also [`SearchNode`]. These are a
//! capability set the generic engine is written against, rather than a single concrete type or a
//! template-method base class.

use crate::config::Config;

/// Addresses a single child slot of a [`TreeNode`]. The engine never dereferences this itself;
/// it is handed back to the user node's own `get_child`/`set_child`.
pub type ChildIndex = usize;

/// A rooted, bounded-arity tree node. `C::ARITY` (`K = maxChildren()`) bounds the
/// valid range of [`ChildIndex`] values this node accepts.
///
/// Implementors must be value-semantic: [`Clone`] must yield an independent node whose child
/// slots contain the same pointers as the original (a shallow clone of the slots, not a deep
/// clone of the subtrees) — this is what lets [`SafeNode::make_copy`](crate::safenode::SafeNode)
/// build a private copy-on-write node without recursively copying the subtree.
pub trait TreeNode<C: Config>: Clone + Sized + 'static {
    /// Pointer-ish handle to a node in the live tree. Concrete maps typically instantiate this
    /// as `*const Self`, `NonNull<Self>`, or an arena index; the engine only requires it to be
    /// copyable, comparable, and nullable.
    type Ref: NodeRef;

    /// Read child slot `i`.
    fn get_child(&self, i: ChildIndex) -> Self::Ref;
    /// Overwrite child slot `i`.
    fn set_child(&mut self, i: ChildIndex, child: Self::Ref);
}

/// A nullable, `Copy`, `Eq` handle to a live-tree node. This is the type stored in
/// `ConnPointSnapshot::con_ptr_snapshot`, compared against at commit time.
pub trait NodeRef: Copy + Eq + 'static {
    const NULL: Self;
    fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl<T> NodeRef for *const T {
    const NULL: Self = core::ptr::null();
}

/// The optional search contract: a node whose subtree is ordered by `KeyType` so that
/// `crate::search::find`/`find_conn_point` can descend it without the caller supplying a custom
/// walk.
pub trait SearchNode<C: Config>: TreeNode<C> {
    type Key: ?Sized;

    /// Does this node hold `k`?
    fn has_key(&self, k: &Self::Key) -> bool;
    /// Have we descended as far as we can for `k` (i.e. is this node a leaf for `k`'s purposes,
    /// or does it already hold `k`)?
    fn traversal_done(&self, k: &Self::Key) -> bool;
    /// Which child slot should the search continue into for `k`?
    fn next_child(&self, k: &Self::Key) -> ChildIndex;
    /// Which child slot leads towards a specific already-located node (used by
    /// `find_target_node` during reachability re-verification in search-tree mode)?
    fn next_child_towards(&self, target: &Self) -> ChildIndex;
}
