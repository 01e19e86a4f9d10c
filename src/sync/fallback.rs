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

//! The single process-wide fallback lock. `parking_lot::Mutex` is reused for both purposes it
//! needs to serve: a cheap, non-blocking `is_locked()` (checked from *inside* a hardware
//! transaction, so it must never itself touch the OS scheduler) plus a normal blocking `lock()`
//! for the non-speculative fallback path, without pulling in a bespoke spinlock implementation.

use super::CachePadded;
use parking_lot::{Mutex, MutexGuard};

pub struct GlobalLock {
    inner: CachePadded<Mutex<()>>,
}

impl Default for GlobalLock {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalLock {
    pub const fn new() -> Self {
        Self {
            inner: CachePadded(Mutex::new(())),
        }
    }

    /// Non-blocking peek, safe to call from inside a hardware transaction: it is just a single
    /// relaxed-ish load on the lock word, never a syscall.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Blocks until the lock is acquired. Used by the fallback execution path (a
    /// `TransactionAttempt` entered with `retries == 0`) and, separately, while a transactional
    /// guard waits out a `GL_TAKEN` abort before retrying HTM — in that
    /// second case the guard only waits for the lock to *release*, using `Backoff::snooze`
    /// against `is_locked()`, never `lock()` itself (taking the lock there would serialize
    /// every waiting reader/writer behind the one that's merely spinning).
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock()
    }
}
