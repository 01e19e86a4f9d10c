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

//! Concurrent scenarios exercising linearizability: at most one writer ever
//! wins a race on the same key, every committed insert from every thread is eventually visible,
//! and the tree stays a valid binary search tree (ordering law) at quiescence no matter how many
//! threads raced to build it.

mod common;

use common::BstTree;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, RwLock,
};
use std::thread::{self, JoinHandle};

const RACE_THREADS: usize = 8;

#[test]
fn two_threads_racing_the_same_key_exactly_one_wins() {
    let tree = Arc::new(BstTree::new());
    let gate = Arc::new(RwLock::new(()));
    let hold = gate.write().unwrap();
    let wins = Arc::new(AtomicUsize::new(0));

    let threads: Vec<JoinHandle<_>> = (0..RACE_THREADS)
        .map(|tid| {
            let tree = Arc::clone(&tree);
            let gate = Arc::clone(&gate);
            let wins = Arc::clone(&wins);
            thread::Builder::new()
                .name(format!("racer-{tid}"))
                .spawn(move || {
                    let _g = gate.read().unwrap();
                    if tree.insert(42, tid as i64) {
                        wins.fetch_add(1, Ordering::AcqRel);
                    }
                })
                .unwrap()
        })
        .collect();

    drop(hold); // rush every racer loose at once
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::Acquire), 1);
    assert_eq!(tree.len(), 1);
    assert!(tree.lookup(42).is_some());
}

const DISJOINT_TENANTS: usize = 16;
const KEYS_PER_TENANT: i64 = 2_000;

#[test]
fn disjoint_concurrent_inserts_are_all_visible() {
    let tree = Arc::new(BstTree::new());
    let gate = Arc::new(RwLock::new(()));
    let hold = gate.write().unwrap();

    let threads: Vec<JoinHandle<_>> = (0..DISJOINT_TENANTS)
        .map(|tid| {
            let tree = Arc::clone(&tree);
            let gate = Arc::clone(&gate);
            let base = tid as i64 * KEYS_PER_TENANT;
            thread::Builder::new()
                .name(format!("tenant-{tid}"))
                .spawn(move || {
                    let _g = gate.read().unwrap();
                    for k in base..base + KEYS_PER_TENANT {
                        assert!(tree.insert(k, k * 2));
                    }
                })
                .unwrap()
        })
        .collect();

    drop(hold);
    for t in threads {
        t.join().unwrap();
    }

    let total = DISJOINT_TENANTS as i64 * KEYS_PER_TENANT;
    assert_eq!(tree.len(), total as usize);
    assert!(tree.is_sorted());
    for k in 0..total {
        assert_eq!(tree.lookup(k), Some(k * 2));
    }
}

const MIXED_THREADS: usize = 8;
const MIXED_KEYS: i64 = 4_000;

/// Every thread inserts its own key range, then immediately races to remove a third of what it
/// just inserted. Whatever the final population is, the tree must still satisfy the BST ordering
/// invariant and every key claimed present must actually be reachable from the root.
#[test]
fn mixed_insert_remove_preserves_ordering_invariant() {
    let tree = Arc::new(BstTree::new());
    let gate = Arc::new(RwLock::new(()));
    let hold = gate.write().unwrap();

    let threads: Vec<JoinHandle<_>> = (0..MIXED_THREADS)
        .map(|tid| {
            let tree = Arc::clone(&tree);
            let gate = Arc::clone(&gate);
            let base = tid as i64 * MIXED_KEYS;
            thread::Builder::new()
                .name(format!("mixed-{tid}"))
                .spawn(move || {
                    let _g = gate.read().unwrap();
                    for k in base..base + MIXED_KEYS {
                        assert!(tree.insert(k, k));
                    }
                    for k in (base..base + MIXED_KEYS).step_by(3) {
                        assert!(tree.remove(k));
                    }
                })
                .unwrap()
        })
        .collect();

    drop(hold);
    for t in threads {
        t.join().unwrap();
    }

    assert!(tree.is_sorted());
    let removed_per_thread = ((MIXED_KEYS + 2) / 3) as usize;
    let expected_len = MIXED_THREADS * (MIXED_KEYS as usize - removed_per_thread);
    assert_eq!(tree.len(), expected_len);
    for tid in 0..MIXED_THREADS {
        let base = tid as i64 * MIXED_KEYS;
        for k in base..base + MIXED_KEYS {
            let removed = (k - base) % 3 == 0;
            assert_eq!(tree.lookup(k), if removed { None } else { Some(k) });
        }
    }
}
