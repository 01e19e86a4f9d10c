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

//! [`ConnPoint`], the per-operation controller, and the [`ConnPointSnapshot`] that seeds it.

use crate::{
    config::Config,
    error::SafeTreeError,
    mem::{Checkpoint, SimplePool, TrackedPool},
    node::{NodeRef, SearchNode, TreeNode},
    path::{PathStack, AT_ROOT},
    safenode::{NodeType, SafeNode},
    sync::{fallback::GlobalLock, guard::{GuardOutcome, TSXTransOnlyGuard}},
};
use std::cell::{Cell, RefCell};

/// Immutable description of where an attempt will publish, captured by `PathTracker::connect_here`
/// while building the tree-of-copies.
pub struct ConnPointSnapshot<R: NodeRef, const PATH_N: usize> {
    pub root_ptr: *mut R,
    pub connection_point: Option<R>,
    pub con_ptr_snapshot: R,
    pub con_ptr_child_index: usize,
    pub path: PathStack<R, PATH_N>,
}

/// Per-operation controller. Owns the tree-of-copies, the path stack, the
/// validation set and the transaction envelope for exactly one attempt; committing (or rolling
/// back) happens in [`Drop`].
pub struct ConnPoint<'a, N, C, const PATH_N: usize = crate::path::DEFAULT_PATH_MAX_LEN>
where
    N: TreeNode<C, Ref = *const N>,
    C: Config,
{
    root_ptr: *mut *const N,
    connection_point: Cell<Option<*const N>>,
    con_ptr_snapshot: Cell<*const N>,
    con_ptr_child_index: Cell<usize>,
    path: RefCell<PathStack<*const N, PATH_N>>,
    head: Cell<*mut SafeNode<N, C>>,
    validation_set: RefCell<Vec<*mut SafeNode<N, C>>>,

    wrapper_pool: &'a SimplePool<SafeNode<N, C>>,
    user_pool: &'a TrackedPool<N>,
    lock: &'a GlobalLock,
    checkpoint: Checkpoint,

    tree_was_modified: Cell<bool>,
    copy_connected: Cell<bool>,
    validation_aborted: Cell<bool>,
    committed: Cell<bool>,
    /// Set the first time `connect_atomically`/`connect_atomically_search` runs to completion,
    /// success or failure. Distinct from `committed`: a caller that explicitly commits and gets
    /// back `Err` has still *attempted*, and `Drop` must not retry on its behalf — only a
    /// `ConnPoint` that nobody ever tried to commit falls
    /// through to the destructor-driven path.
    attempted: Cell<bool>,
    /// Set when this attempt is already running under the fallback lock (the caller's
    /// `TransactionAttempt(retries == 0)`): the commit skips HTM entirely and checks/publishes
    /// directly, since mutual exclusion is already guaranteed by the held lock.
    fallback_held: bool,
}

impl<'a, N, C, const PATH_N: usize> ConnPoint<'a, N, C, PATH_N>
where
    N: TreeNode<C, Ref = *const N>,
    C: Config,
{
    pub fn new(
        snapshot: ConnPointSnapshot<*const N, PATH_N>,
        wrapper_pool: &'a SimplePool<SafeNode<N, C>>,
        user_pool: &'a TrackedPool<N>,
        lock: &'a GlobalLock,
    ) -> Self {
        Self::new_with_fallback(snapshot, wrapper_pool, user_pool, lock, false)
    }

    /// As [`new`](Self::new), but `fallback_held` marks that the caller already holds `lock` for
    /// the whole attempt (`TransactionAttempt(retries == 0)`), so the eventual commit
    /// bypasses HTM and publishes directly instead of opening a speculative region.
    pub fn new_with_fallback(
        snapshot: ConnPointSnapshot<*const N, PATH_N>,
        wrapper_pool: &'a SimplePool<SafeNode<N, C>>,
        user_pool: &'a TrackedPool<N>,
        lock: &'a GlobalLock,
        fallback_held: bool,
    ) -> Self {
        let checkpoint = user_pool.set_checkpoint();
        Self {
            root_ptr: snapshot.root_ptr,
            connection_point: Cell::new(snapshot.connection_point),
            con_ptr_snapshot: Cell::new(snapshot.con_ptr_snapshot),
            con_ptr_child_index: Cell::new(snapshot.con_ptr_child_index),
            path: RefCell::new(snapshot.path),
            head: Cell::new(std::ptr::null_mut()),
            validation_set: RefCell::new(Vec::with_capacity(C::ARITY)),
            wrapper_pool,
            user_pool,
            lock,
            checkpoint,
            tree_was_modified: Cell::new(false),
            copy_connected: Cell::new(false),
            validation_aborted: Cell::new(false),
            committed: Cell::new(false),
            attempted: Cell::new(false),
            fallback_held,
        }
    }

    pub(crate) fn user_arena(&self) -> &'a TrackedPool<N> {
        self.user_pool
    }

    fn insert_wrapper(&self, node: SafeNode<N, C>) -> *mut SafeNode<N, C> {
        let ptr = unsafe { self.wrapper_pool.create(node) };
        self.validation_set.borrow_mut().push(ptr);
        ptr
    }

    /// SafeNode over a live-tree node, added to the validation set.
    pub fn wrap_safe(&self, n: *const N) -> *mut SafeNode<N, C> {
        self.insert_wrapper(SafeNode::new_orig(n, true))
    }

    /// SafeNode over a brand-new node; `modified` flags start true.
    pub fn create_safe(&self, n: N) -> *mut SafeNode<N, C> {
        let node_ptr = unsafe { self.user_pool.create(n) };
        self.insert_wrapper(SafeNode::new_created(node_ptr))
    }

    /// Wrap without validation, for subtrees already covered by an ancestor's snapshot.
    pub fn wrap_no_validate(&self, n: *const N) -> *mut SafeNode<N, C> {
        self.insert_wrapper(SafeNode::new_orig(n, false))
    }

    /// Lazily wraps `con_ptr_snapshot` and installs it as `head`.
    pub fn get_root(&self) -> *mut SafeNode<N, C> {
        let existing = self.head.get();
        if !existing.is_null() {
            return existing;
        }
        let wrapped = self.wrap_safe(self.con_ptr_snapshot.get());
        self.head.set(wrapped);
        wrapped
    }

    /// Replaces the tree-of-copies root; marks the tree modified.
    pub fn set_root(&self, safe: *mut SafeNode<N, C>) {
        self.head.set(safe);
        self.tree_was_modified.set(true);
    }

    /// Starts a fresh tree-of-copies rooted at a brand-new node (root-level creation).
    pub fn new_tree(&self, user_node: N) -> *mut SafeNode<N, C> {
        let safe = self.create_safe(user_node);
        self.set_root(safe);
        safe
    }

    /// Clears the tree-of-copies root: the connection point will be published with a null child
    /// (or the whole structure emptied, at `AT_ROOT`). Used when an operation deletes the only
    /// node left in a subtree.
    pub fn clear_root(&self) {
        self.head.set(std::ptr::null_mut());
        self.tree_was_modified.set(true);
    }

    pub fn head(&self) -> *mut SafeNode<N, C> {
        self.head.get()
    }

    pub fn connection_point(&self) -> Option<*const N> {
        self.connection_point.get()
    }

    /// Grows the tree-of-copies one level up: pops the path, wraps the *old* connection point as
    /// a new SafeNode, stitches the current `head` into its slot, and rotates `connection_point`
    /// up one step. Returns the new head, or `None` if already at the true root.
    pub fn pop_path(&self) -> Option<*mut SafeNode<N, C>> {
        let old_cp = self.connection_point.get()?;
        let old_child_index = self.con_ptr_child_index.get();

        let new_head = self.wrap_safe(old_cp);
        let current_head = self.head.get();
        if !current_head.is_null() {
            unsafe { &*new_head }.set_child(old_child_index, Some(current_head), self);
        }
        self.head.set(new_head);
        self.tree_was_modified.set(true);

        match self.path.borrow_mut().pop() {
            Some(hop) => {
                self.connection_point.set(Some(hop.node));
                self.con_ptr_child_index.set(hop.child_index);
            }
            None => {
                self.connection_point.set(None);
                self.con_ptr_child_index.set(AT_ROOT);
            }
        }
        self.con_ptr_snapshot.set(old_cp);
        Some(new_head)
    }

    fn pointer_slot_matches(&self) -> bool {
        match self.connection_point.get() {
            None => unsafe { *self.root_ptr } == self.con_ptr_snapshot.get(),
            Some(cp) => {
                let node = unsafe { &*cp };
                node.get_child(self.con_ptr_child_index.get()) == self.con_ptr_snapshot.get()
            }
        }
    }

    fn reachable_general(&self) -> bool {
        let cp = match self.connection_point.get() {
            None => return true,
            Some(cp) => cp,
        };
        let mut cursor = unsafe { *self.root_ptr };
        for hop in self.path.borrow().as_slice() {
            if cursor != hop.node {
                return false;
            }
            let node = unsafe { &*cursor };
            cursor = node.get_child(hop.child_index);
        }
        cursor == cp
    }

    fn reachable_search<K: ?Sized>(&self) -> bool
    where
        N: SearchNode<C, Key = K>,
    {
        let cp = match self.connection_point.get() {
            None => return true,
            Some(cp) => cp,
        };
        crate::search::find_target_node::<N, C>(unsafe { *self.root_ptr }, cp) == Some(cp)
    }

    fn snapshot_matches(&self) -> bool {
        self.validation_set
            .borrow()
            .iter()
            .all(|&s| unsafe { &*s }.validate_snapshot())
    }

    /// Marks this attempt as validation-failed outside the normal commit sequence
    /// (`Config::TM_EARLY_ABORT_ON_COPY`'s eager per-node check, called from
    /// `SafeNode::rw_ref` the instant a single promoted node's own snapshot is found stale).
    pub(crate) fn mark_validation_aborted(&self) {
        self.validation_aborted.set(true);
    }

    /// `Config::TM_EARLY_ABORT`'s eager whole-validation-set check, run the moment any node in
    /// this attempt is promoted rather than waiting for commit. Re-checking every node on every
    /// promotion is more work per call than the per-node `TM_EARLY_ABORT_ON_COPY` check, but
    /// catches a stale sibling snapshot the per-node check alone would miss.
    pub(crate) fn early_validate_all(&self) {
        if !self.snapshot_matches() {
            self.validation_aborted.set(true);
        }
    }

    /// The commit protocol. Must run inside a `TSXTransOnlyGuard` with a stubborn
    /// retry policy; `reachable` lets the caller pick the reachability-check strategy
    /// (`Config::TREE_TYPE`) without this method itself requiring `N: SearchNode`.
    fn connect_atomically_once(&self, reachable: impl Fn() -> bool) -> GuardOutcome<()> {
        if self.validation_aborted.get() {
            return GuardOutcome::ValidationFailed;
        }
        if !self.pointer_slot_matches() {
            return GuardOutcome::ValidationFailed;
        }
        if !reachable() {
            return GuardOutcome::ValidationFailed;
        }
        if !self.snapshot_matches() {
            return GuardOutcome::ValidationFailed;
        }
        let head = self.head.get();
        let head_user_node = if head.is_null() {
            std::ptr::null()
        } else {
            unsafe { &*head }.node_to_be_connected()
        };
        match self.connection_point.get() {
            None => unsafe { *self.root_ptr = head_user_node },
            Some(cp) => {
                let node = unsafe { &mut *(cp as *mut N) };
                node.set_child(self.con_ptr_child_index.get(), head_user_node);
            }
        }
        self.copy_connected.set(true);
        GuardOutcome::Committed(())
    }

    fn finish(&self, result: Result<(), crate::sync::guard::GuardExhausted>) -> Result<(), SafeTreeError> {
        self.attempted.set(true);
        match result {
            Ok(()) => {
                self.committed.set(true);
                Ok(())
            }
            Err(crate::sync::guard::GuardExhausted::ValidationFailed) => {
                self.validation_aborted.set(true);
                Err(SafeTreeError::ValidationFailed)
            }
            Err(crate::sync::guard::GuardExhausted::RetriesExhausted) => {
                Err(SafeTreeError::RetriesExhausted)
            }
        }
    }

    /// Runs the commit protocol using the path-replay reachability check (`Config::TreeType::
    /// GeneralTree`'s only option, since it makes no assumption about `N` beyond `TreeNode`).
    /// Under normal operation this opens a `TSXTransOnlyGuard`, retrying per
    /// `Config::RETRY_POLICY` up to `Config::MAX_RETRIES` ("within a TSXTransOnlyGuard (stubborn
    /// retry policy)"). When this attempt already holds the fallback lock (`fallback_held`),
    /// mutual exclusion is already guaranteed, so the checks and the single pointer store run
    /// directly with no HTM region at all — the fallback-lock holder re-executes
    /// non-speculatively with no speculation needed.
    ///
    /// A map whose node implements [`SearchNode`] and whose `Config::TREE_TYPE` is
    /// `TreeType::SearchTree` should call [`connect_atomically_search`](Self::connect_atomically_search)
    /// instead — it re-derives reachability from the root with `next_child_towards`, which is
    /// cheaper than replaying the recorded path and is the only reachability strategy
    /// `TreeType::SearchTree` names. This method has no way to honor that choice itself: it is
    /// generic over `N: TreeNode<C>` alone, with no `SearchNode` bound to dispatch through.
    pub fn connect_atomically(&self) -> Result<(), SafeTreeError> {
        let reachable = || self.reachable_general();
        if self.fallback_held {
            return self.finish(match self.connect_atomically_once(reachable) {
                GuardOutcome::Committed(()) => Ok(()),
                GuardOutcome::ValidationFailed => Err(crate::sync::guard::GuardExhausted::ValidationFailed),
            });
        }
        let guard = TSXTransOnlyGuard::new(self.lock, C::RETRY_POLICY, C::MAX_RETRIES);
        let result = guard.run(|| self.connect_atomically_once(reachable));
        self.finish(result)
    }

    /// As [`connect_atomically`](Self::connect_atomically), but re-derives reachability with
    /// `nextChild(target)` from the root instead of replaying the recorded path — cheaper when the
    /// map implements [`SearchNode`].
    pub fn connect_atomically_search<K: ?Sized>(&self) -> Result<(), SafeTreeError>
    where
        N: SearchNode<C, Key = K>,
    {
        let reachable = || self.reachable_search::<K>();
        if self.fallback_held {
            return self.finish(match self.connect_atomically_once(reachable) {
                GuardOutcome::Committed(()) => Ok(()),
                GuardOutcome::ValidationFailed => Err(crate::sync::guard::GuardExhausted::ValidationFailed),
            });
        }
        let guard = TSXTransOnlyGuard::new(self.lock, C::RETRY_POLICY, C::MAX_RETRIES);
        let result = guard.run(|| self.connect_atomically_once(reachable));
        self.finish(result)
    }

    fn rollback(&self) {
        self.user_pool.reset_to_checkpoint(self.checkpoint);
        for &s in self.validation_set.borrow().iter() {
            unsafe { &*s }.mark_deleted();
        }
        if C::TSX_MEM_POOL {
            self.wrapper_pool.reset();
        }
    }

    pub fn transaction_succeeded(&self) -> bool {
        self.committed.get() && self.copy_connected.get()
    }

    /// Whether this attempt validated and aborted (requiring the whole operation to restart), as
    /// opposed to one whose HTM retry budget simply ran out.
    pub fn validation_failed(&self) -> bool {
        self.validation_aborted.get()
    }

    pub fn is_fallback_held(&self) -> bool {
        self.fallback_held
    }
}

impl<N, C, const PATH_N: usize> Drop for ConnPoint<'_, N, C, PATH_N>
where
    N: TreeNode<C, Ref = *const N>,
    C: Config,
{
    fn drop(&mut self) {
        if self.tree_was_modified.get() && !self.attempted.get() {
            let _ = self.connect_atomically();
        }
        if !self.transaction_succeeded() {
            self.rollback();
        }
    }
}
