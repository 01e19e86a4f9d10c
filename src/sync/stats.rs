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

//! Per-thread abort/commit counters for [`TSXGuardWithStats`](crate::sync::guard::TSXGuardWithStats).
//! The real fields only exist in debug builds, a zero-sized stand-in otherwise, so release
//! builds pay nothing for instrumentation nobody reads.

use crate::macros::dbgfn;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(debug_assertions)]
struct StatsData {
    commits: AtomicUsize,
    conflict_aborts: AtomicUsize,
    capacity_aborts: AtomicUsize,
    lock_taken_aborts: AtomicUsize,
    fallback_runs: AtomicUsize,
}

pub struct Stats {
    #[cfg(debug_assertions)]
    data: StatsData,
    #[cfg(not(debug_assertions))]
    data: (),
}

impl Stats {
    #[cfg(debug_assertions)]
    const ZERO: AtomicUsize = AtomicUsize::new(0);
    #[cfg(debug_assertions)]
    const NEW: Self = Self {
        data: StatsData {
            commits: Self::ZERO,
            conflict_aborts: Self::ZERO,
            capacity_aborts: Self::ZERO,
            lock_taken_aborts: Self::ZERO,
            fallback_runs: Self::ZERO,
        },
    };
    #[cfg(not(debug_assertions))]
    const NEW: Self = Self { data: () };

    pub const fn new() -> Self {
        Self::NEW
    }

    dbgfn! {
        fn commit(self: &Self) {
            self.data.commits.fetch_add(1, Ordering::Relaxed);
        } else {
            ()
        }
        fn conflict_abort(self: &Self) {
            self.data.conflict_aborts.fetch_add(1, Ordering::Relaxed);
        } else {
            ()
        }
        fn capacity_abort(self: &Self) {
            self.data.capacity_aborts.fetch_add(1, Ordering::Relaxed);
        } else {
            ()
        }
        fn lock_taken_abort(self: &Self) {
            self.data.lock_taken_aborts.fetch_add(1, Ordering::Relaxed);
        } else {
            ()
        }
        fn fallback_run(self: &Self) {
            self.data.fallback_runs.fetch_add(1, Ordering::Relaxed);
        } else {
            ()
        }
        fn commits(self: &Self) -> usize {
            self.data.commits.load(Ordering::Relaxed)
        } else {
            0
        }
        fn fallback_runs(self: &Self) -> usize {
            self.data.fallback_runs.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

std::thread_local! {
    /// Per-thread stats cell, holding request-scoped scratch state.
    pub static THREAD_STATS: Stats = const { Stats::new() };
}
