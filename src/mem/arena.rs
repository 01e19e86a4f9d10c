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

//! Thread-local bump allocators. Two flavors share one implementation
//! ([`RawPool`]): [`SimplePool`] just bumps and resets, [`TrackedPool`] additionally exposes a
//! checkpoint/rollback pair so a failed attempt can give back exactly the user nodes it
//! speculatively allocated.
//!
//! Out-of-memory is fatal (documented, not recovered from) rather than growing the backing
//! store: this is benchmark-grade service code, and a production port is free to substitute a
//! growable allocator.

use crate::error::FatalError;
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

struct RawPool<T> {
    buf: Box<[Cell<std::mem::MaybeUninit<T>>]>,
    watermark: Cell<usize>,
}

impl<T> RawPool<T> {
    fn new(capacity: usize) -> Self {
        let mut v = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            v.push(Cell::new(std::mem::MaybeUninit::uninit()));
        }
        Self {
            buf: v.into_boxed_slice(),
            watermark: Cell::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn watermark(&self) -> usize {
        self.watermark.get()
    }

    /// Places `v` at the current watermark and bumps it.
    ///
    /// # Safety
    /// The caller must not retain the returned pointer past the next `reset`/`rollback_to` of
    /// this pool that goes at or below the slot it points into.
    unsafe fn create(&self, v: T) -> *mut T {
        let at = self.watermark.get();
        if at == self.capacity() {
            FatalError::OutOfArena.raise();
        }
        let slot = self.buf[at].as_ptr();
        slot.write(std::mem::MaybeUninit::new(v));
        self.watermark.set(at + 1);
        (*slot).as_mut_ptr()
    }

    /// Resets the watermark to zero without running destructors: sound here because every
    /// value this arena ever holds (`SafeNode`, or a user node that was never published) is
    /// either trivially re-initializable or exclusively owned by the attempt that is resetting
    /// the arena. Reset is destructor-free by contract.
    fn reset(&self) {
        self.watermark.set(0);
    }

    fn rollback_to(&self, checkpoint: usize) {
        debug_assert!(checkpoint <= self.watermark.get());
        self.watermark.set(checkpoint);
    }
}

/// Wrapper-node arena ("simple pool"): reset on every attempt boundary, no
/// checkpointing.
pub struct SimplePool<T> {
    raw: RawPool<T>,
}

impl<T> SimplePool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            raw: RawPool::new(capacity),
        }
    }
    /// # Safety
    /// See [`RawPool::create`].
    pub unsafe fn create(&self, v: T) -> *mut T {
        self.raw.create(v)
    }
    pub fn reset(&self) {
        self.raw.reset();
    }
}

/// User-node arena ("tracked pool"): additionally supports checkpoint/rollback so an
/// aborted attempt reclaims exactly the nodes it speculatively allocated ("arena quiescence").
pub struct TrackedPool<T> {
    raw: RawPool<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

impl<T> TrackedPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            raw: RawPool::new(capacity),
        }
    }
    /// # Safety
    /// See [`RawPool::create`].
    pub unsafe fn create(&self, v: T) -> *mut T {
        self.raw.create(v)
    }
    pub fn set_checkpoint(&self) -> Checkpoint {
        Checkpoint(self.raw.watermark())
    }
    pub fn reset_to_checkpoint(&self, checkpoint: Checkpoint) {
        self.raw.rollback_to(checkpoint.0);
    }
    pub fn reset(&self) {
        self.raw.reset();
    }
}

/// Caps the number of threads that may hold a registered thread-local arena
/// (`Config::RCU_HTM_MAX_THREADS`), and is the "short critical section" §5 refers to: taken only
/// at first-use registration, never on the hot path.
pub struct ArenaRegistry {
    max: usize,
    active: AtomicUsize,
    lock: Mutex<()>,
}

impl ArenaRegistry {
    pub const fn new(max: usize) -> Self {
        Self {
            max,
            active: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }

    /// Registers the calling thread's arena. Panics if `Config::RCU_HTM_MAX_THREADS` is
    /// exceeded — this is a deployment sizing error, not a runtime condition to recover from.
    pub fn register(&self) -> RegistryHandle<'_> {
        let _g = self.lock.lock();
        let prev = self.active.fetch_add(1, Ordering::AcqRel);
        if prev >= self.max {
            self.active.fetch_sub(1, Ordering::AcqRel);
            panic!(
                "safetree: RCU_HTM_MAX_THREADS ({}) exceeded by thread registration",
                self.max
            );
        }
        RegistryHandle { registry: self }
    }
}

/// Deregisters the thread's slot on drop (thread exit, in the common case — thread-local
/// destructors run as the thread unwinds its TLS).
pub struct RegistryHandle<'a> {
    registry: &'a ArenaRegistry,
}

impl Drop for RegistryHandle<'_> {
    fn drop(&mut self) {
        self.registry.active.fetch_sub(1, Ordering::AcqRel);
    }
}
