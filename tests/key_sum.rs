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

//! The key-sum invariant: under a mixed concurrent insert/remove workload, the tree's
//! final `key_sum()` must equal the algebraic sum every thread believes it left behind, computed
//! independently of the engine from each thread's own insert/remove outcomes.

mod common;

use common::BstTree;
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WORKERS: usize = 8;
const KEYS_PER_WORKER: i64 = 6_250; // 8 * 6250 = 50_000 keys total
const RUN_FOR: Duration = Duration::from_secs(5);

#[test]
fn key_sum_invariant_under_mixed_concurrent_workload() {
    let _ = env_logger::try_init();

    let tree = Arc::new(BstTree::new());
    let gate = Arc::new(RwLock::new(()));
    let hold = gate.write().unwrap();

    let threads: Vec<JoinHandle<i64>> = (0..WORKERS)
        .map(|tid| {
            let tree = Arc::clone(&tree);
            let gate = Arc::clone(&gate);
            let base = tid as i64 * KEYS_PER_WORKER;
            thread::Builder::new()
                .name(format!("keysum-{tid}"))
                .spawn(move || {
                    let _g = gate.read().unwrap();
                    let mut rng = rand::thread_rng();
                    let mut present: HashSet<i64> = HashSet::new();
                    let mut local_sum: i64 = 0;
                    let deadline = Instant::now() + RUN_FOR;
                    while Instant::now() < deadline {
                        let k = base + rng.gen_range(0..KEYS_PER_WORKER);
                        if present.contains(&k) {
                            if tree.remove(k) {
                                present.remove(&k);
                                local_sum -= k;
                            }
                        } else if tree.insert(k, k) {
                            present.insert(k);
                            local_sum += k;
                        }
                    }
                    local_sum
                })
                .unwrap()
        })
        .collect();

    drop(hold);
    let expected: i64 = threads.into_iter().map(|t| t.join().unwrap()).sum();

    assert_eq!(tree.key_sum(), expected);
    assert!(tree.is_sorted());
}
