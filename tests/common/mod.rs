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

//! A minimal `i64 -> i64` binary search tree built on `safetree`, used by the integration tests
//! to exercise every module end to end. Not part of the crate's public API.

#![allow(dead_code)]

use safetree::{
    config::{Config, PreConfig, RetryPolicy, TreeType},
    connpoint::ConnPoint,
    envelope::{run_operation, OperationOutcome},
    mem::{ArenaRegistry, RegistryHandle, SimplePool, TrackedPool},
    node::{SearchNode, TreeNode},
    safenode::SafeNode,
    search::find_conn_point,
    sync::fallback::GlobalLock,
};
use std::cell::UnsafeCell;

pub type Key = i64;
pub type Value = i64;

/// Small enough to keep each attempt's path stack off the heap without wasting much stack space;
/// the tests never build trees deep enough to come close to it.
const PATH_N: usize = 256;
const OUTER_RETRIES: usize = 8;
const WRAPPER_POOL_CAP: usize = 4_096;
const USER_POOL_CAP: usize = 4_096;

#[derive(Clone)]
pub struct BstNode {
    pub key: Key,
    pub value: Value,
    children: [*const BstNode; 2],
}

pub struct BstConfig;

impl PreConfig for BstConfig {
    const ARITY: usize = 2;
    const TREE_TYPE: TreeType = TreeType::SearchTree;
    const RETRY_POLICY: RetryPolicy = RetryPolicy::Stubborn;
    const MAX_RETRIES: usize = 30;
}

impl TreeNode<BstConfig> for BstNode {
    type Ref = *const BstNode;

    fn get_child(&self, i: usize) -> *const BstNode {
        self.children[i]
    }

    fn set_child(&mut self, i: usize, child: *const BstNode) {
        self.children[i] = child;
    }
}

impl SearchNode<BstConfig> for BstNode {
    type Key = Key;

    fn has_key(&self, k: &Key) -> bool {
        self.key == *k
    }

    fn traversal_done(&self, k: &Key) -> bool {
        self.key == *k || self.get_child(self.next_child(k)).is_null()
    }

    fn next_child(&self, k: &Key) -> usize {
        if *k < self.key {
            0
        } else {
            1
        }
    }

    fn next_child_towards(&self, target: &BstNode) -> usize {
        if target.key < self.key {
            0
        } else {
            1
        }
    }
}

type SafeBstNode = SafeNode<BstNode, BstConfig>;
type BstConnPoint<'a> = ConnPoint<'a, BstNode, BstConfig, PATH_N>;

/// Caps the number of threads that may concurrently run `BstTree` operations
/// (`BstConfig::RCU_HTM_MAX_THREADS`, inherited from `Config`'s default). Registration happens
/// once per thread, on that thread's first `insert`/`remove` call, and stays registered for the
/// thread's lifetime.
static ARENA_REGISTRY: ArenaRegistry = ArenaRegistry::new(<BstConfig as Config>::RCU_HTM_MAX_THREADS);

thread_local! {
    static ARENA_HANDLE: RegistryHandle<'static> = ARENA_REGISTRY.register();
    static WRAPPER_POOL: SimplePool<SafeBstNode> = SimplePool::new(WRAPPER_POOL_CAP);
    static USER_POOL: TrackedPool<BstNode> = TrackedPool::new(USER_POOL_CAP);
}

/// Registers the calling thread's arena slot on first use; panics past
/// `RCU_HTM_MAX_THREADS` concurrently-registered threads.
fn ensure_registered() {
    ARENA_HANDLE.with(|_| {});
}

/// Whether a `SafeNode` returned by `get_child` stands for an absent child: `get_child` always
/// returns a real wrapper, one that wraps a null `original` when there was nothing there.
fn is_empty(safe: *mut SafeBstNode) -> bool {
    unsafe { &*safe }.peek_original().is_none()
}

/// A `safetree`-backed ordered map from `i64` to `i64`. One process-wide root pointer and
/// fallback lock, one pair of bump arenas per thread — never shared across
/// threads, unlike `root`/`lock` which coordinate every writer by design.
pub struct BstTree {
    root: UnsafeCell<*const BstNode>,
    lock: GlobalLock,
}

unsafe impl Send for BstTree {}
unsafe impl Sync for BstTree {}

impl BstTree {
    pub fn new() -> Self {
        Self {
            root: UnsafeCell::new(std::ptr::null()),
            lock: GlobalLock::new(),
        }
    }

    fn root_ptr(&self) -> &mut *const BstNode {
        unsafe { &mut *self.root.get() }
    }

    pub fn lookup(&self, k: Key) -> Option<Value> {
        let root = unsafe { *self.root.get() };
        safetree::search::find::<BstNode, BstConfig>(root, &k)
            .map(|p| unsafe { &*p })
            .filter(|n| n.key == k)
            .map(|n| n.value)
    }

    pub fn insert(&self, k: Key, v: Value) -> bool {
        ensure_registered();
        WRAPPER_POOL.with(|wrapper_pool| {
            USER_POOL.with(|user_pool| {
                run_operation(&self.lock, OUTER_RETRIES, |is_fallback| {
                    let lookup =
                        find_conn_point::<BstNode, BstConfig, PATH_N>(&k, self.root_ptr());
                    if lookup.found {
                        return OperationOutcome::Done(false);
                    }
                    let cp: BstConnPoint<'_> = ConnPoint::new_with_fallback(
                        lookup.snapshot,
                        wrapper_pool,
                        user_pool,
                        &self.lock,
                        is_fallback,
                    );
                    cp.new_tree(BstNode {
                        key: k,
                        value: v,
                        children: [std::ptr::null(), std::ptr::null()],
                    });
                    let committed = cp.connect_atomically_search::<Key>().is_ok();
                    drop(cp);
                    if committed {
                        OperationOutcome::Done(true)
                    } else {
                        OperationOutcome::Restart
                    }
                })
            })
        })
    }

    pub fn remove(&self, k: Key) -> bool {
        ensure_registered();
        WRAPPER_POOL.with(|wrapper_pool| {
            USER_POOL.with(|user_pool| {
                run_operation(&self.lock, OUTER_RETRIES, |is_fallback| {
                    let lookup =
                        find_conn_point::<BstNode, BstConfig, PATH_N>(&k, self.root_ptr());
                    if !lookup.found {
                        return OperationOutcome::Done(false);
                    }
                    let cp: BstConnPoint<'_> = ConnPoint::new_with_fallback(
                        lookup.snapshot,
                        wrapper_pool,
                        user_pool,
                        &self.lock,
                        is_fallback,
                    );
                    let target = cp.get_root();
                    let left = unsafe { &*target }.get_child(0, &cp);
                    let right = unsafe { &*target }.get_child(1, &cp);
                    match (is_empty(left), is_empty(right)) {
                        (true, true) => cp.clear_root(),
                        (false, true) => cp.set_root(left),
                        (true, false) => cp.set_root(right),
                        (false, false) => splice_two_child_removal(&cp, target, right),
                    }
                    let committed = cp.connect_atomically_search::<Key>().is_ok();
                    drop(cp);
                    if committed {
                        OperationOutcome::Done(true)
                    } else {
                        OperationOutcome::Restart
                    }
                })
            })
        })
    }

    /// Sum of every key currently in the tree. Only meaningful once every writer has joined —
    /// this walks the live tree with no synchronization of its own.
    pub fn key_sum(&self) -> i64 {
        fn walk(n: *const BstNode, sum: &mut i64) {
            if n.is_null() {
                return;
            }
            let node = unsafe { &*n };
            *sum += node.key;
            walk(node.children[0], sum);
            walk(node.children[1], sum);
        }
        let mut sum = 0;
        walk(unsafe { *self.root.get() }, &mut sum);
        sum
    }

    pub fn len(&self) -> usize {
        fn walk(n: *const BstNode) -> usize {
            if n.is_null() {
                0
            } else {
                let node = unsafe { &*n };
                1 + walk(node.children[0]) + walk(node.children[1])
            }
        }
        walk(unsafe { *self.root.get() })
    }

    /// In-order key sequence, used to check the binary-search-tree ordering law still holds.
    pub fn is_sorted(&self) -> bool {
        fn walk(n: *const BstNode, lo: &mut Option<Key>, ok: &mut bool) {
            if n.is_null() || !*ok {
                return;
            }
            let node = unsafe { &*n };
            walk(node.children[0], lo, ok);
            if let Some(prev) = *lo {
                if node.key <= prev {
                    *ok = false;
                    return;
                }
            }
            *lo = Some(node.key);
            walk(node.children[1], lo, ok);
        }
        let mut lo = None;
        let mut ok = true;
        walk(unsafe { *self.root.get() }, &mut lo, &mut ok);
        ok
    }
}

impl Default for BstTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Splices out the in-order successor of `target` (the leftmost descendant of `right`) and
/// promotes its key/value into `target`, re-stitching every ancestor along the path so each
/// level's copy points at its child's (possibly just-promoted) copy rather than the original.
fn splice_two_child_removal(
    cp: &BstConnPoint<'_>,
    target: *mut SafeBstNode,
    right: *mut SafeBstNode,
) {
    let mut chain = vec![right];
    loop {
        let top = *chain.last().unwrap();
        let l = unsafe { &*top }.get_child(0, cp);
        if is_empty(l) {
            break;
        }
        chain.push(l);
    }
    let successor = *chain.last().unwrap();
    let successor_right = unsafe { &*successor }.get_child(1, cp);
    let (skey, sval) = {
        let n = unsafe { &*successor }.rw_ref(cp);
        (n.key, n.value)
    };
    let successor_right_opt = if is_empty(successor_right) {
        None
    } else {
        Some(successor_right)
    };

    if chain.len() == 1 {
        // `right` itself has no left child: it is the successor.
        unsafe { &*target }.set_child(1, successor_right_opt, cp);
    } else {
        let parent_of_successor = chain[chain.len() - 2];
        unsafe { &*parent_of_successor }.set_child(0, successor_right_opt, cp);
        for i in (1..chain.len() - 1).rev() {
            let child = chain[i];
            let parent = chain[i - 1];
            unsafe { &*parent }.set_child(0, Some(child), cp);
        }
        unsafe { &*target }.set_child(1, Some(right), cp);
    }

    let target_mut = unsafe { &*target }.rw_ref(cp);
    target_mut.key = skey;
    target_mut.value = sval;
}
