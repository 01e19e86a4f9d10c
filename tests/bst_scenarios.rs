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

//! Single-threaded end-to-end scenarios against the `tests/common` reference BST.

mod common;

use common::BstTree;

#[test]
fn empty_tree_single_insert() {
    let tree = BstTree::new();
    assert_eq!(tree.lookup(1), None);
    assert!(tree.insert(1, 100));
    assert_eq!(tree.lookup(1), Some(100));
    assert_eq!(tree.len(), 1);
}

#[test]
fn duplicate_insert_is_rejected() {
    let tree = BstTree::new();
    assert!(tree.insert(7, 1));
    assert!(!tree.insert(7, 2));
    assert_eq!(tree.lookup(7), Some(1));
    assert_eq!(tree.len(), 1);
}

#[test]
fn remove_from_empty_tree_fails() {
    let tree = BstTree::new();
    assert!(!tree.remove(1));
}

#[test]
fn ordered_insert_stays_sorted() {
    let tree = BstTree::new();
    for k in 0..1000 {
        assert!(tree.insert(k, k * 2));
    }
    assert_eq!(tree.len(), 1000);
    assert!(tree.is_sorted());
    for k in 0..1000 {
        assert_eq!(tree.lookup(k), Some(k * 2));
    }
}

#[test]
fn reverse_ordered_insert_stays_sorted() {
    let tree = BstTree::new();
    for k in (0..500).rev() {
        assert!(tree.insert(k, k));
    }
    assert_eq!(tree.len(), 500);
    assert!(tree.is_sorted());
}

#[test]
fn remove_leaf() {
    let tree = BstTree::new();
    assert!(tree.insert(50, 50));
    assert!(tree.insert(25, 25));
    assert!(tree.insert(75, 75));
    // 25 and 75 are both leaves under root 50.
    assert!(tree.remove(25));
    assert_eq!(tree.lookup(25), None);
    assert_eq!(tree.lookup(50), Some(50));
    assert_eq!(tree.lookup(75), Some(75));
    assert_eq!(tree.len(), 2);
    assert!(tree.is_sorted());
}

#[test]
fn remove_node_with_one_child() {
    let tree = BstTree::new();
    assert!(tree.insert(50, 50));
    assert!(tree.insert(25, 25));
    assert!(tree.insert(10, 10));
    // 25 has a single (left) child, 10.
    assert!(tree.remove(25));
    assert_eq!(tree.lookup(25), None);
    assert_eq!(tree.lookup(10), Some(10));
    assert_eq!(tree.lookup(50), Some(50));
    assert_eq!(tree.len(), 2);
    assert!(tree.is_sorted());
}

#[test]
fn remove_internal_node_with_two_children() {
    let tree = BstTree::new();
    for (k, v) in [(50, 50), (25, 25), (75, 75), (60, 60), (90, 90), (55, 55), (65, 65)] {
        assert!(tree.insert(k, v));
    }
    // 75 has two children (60's subtree and 90); removing it promotes its in-order successor.
    assert!(tree.remove(75));
    assert_eq!(tree.lookup(75), None);
    assert_eq!(tree.len(), 6);
    assert!(tree.is_sorted());
    for k in [50, 25, 60, 90, 55, 65] {
        assert_eq!(tree.lookup(k), Some(k));
    }
}

#[test]
fn remove_root_until_empty() {
    let tree = BstTree::new();
    for k in 0..20 {
        assert!(tree.insert(k, k));
    }
    for k in 0..20 {
        assert!(tree.remove(k));
        assert!(tree.is_sorted());
    }
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.key_sum(), 0);
}

#[test]
fn insert_remove_reinsert_same_key() {
    let tree = BstTree::new();
    assert!(tree.insert(1, 1));
    assert!(tree.remove(1));
    assert_eq!(tree.lookup(1), None);
    assert!(tree.insert(1, 2));
    assert_eq!(tree.lookup(1), Some(2));
}
