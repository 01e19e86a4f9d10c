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

pub mod fallback;
pub mod guard;
pub mod htm;
pub mod stats;

use std::{cell::Cell, hint::spin_loop, thread};

/// Type to perform exponential backoff. Used both while waiting for the fallback lock to
/// release and between HTM retries under the `Half` policy.
pub struct Backoff {
    cur: Cell<u8>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    const MAX_SPIN: u8 = 6;
    const MAX_YIELD: u8 = 8;
    pub fn new() -> Self {
        Self { cur: Cell::new(0) }
    }
    /// Spin a few times, giving way to the CPU but if we have spun too many times, then block
    /// by yielding to the OS scheduler. This will **eventually block** if we spin more than the
    /// set `MAX_SPIN`.
    pub fn snooze(&self) {
        if self.cur.get() <= Self::MAX_SPIN {
            for _ in 0..1u32 << self.cur.get() {
                spin_loop();
            }
        } else {
            thread::yield_now();
        }
        if self.cur.get() <= Self::MAX_YIELD {
            self.cur.set(self.cur.get() + 1)
        }
    }
    pub fn reset(&self) {
        self.cur.set(0);
    }
}

/// Cache-line padding, sized per architecture, used to keep the fallback lock word and the
/// per-thread stats cell from false-sharing with unrelated hot fields.
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(
    any(
        target_arch = "aarch64",
        target_arch = "powerpc64",
        target_arch = "x86_64",
    ),
    repr(align(128))
)]
#[cfg_attr(
    any(
        target_arch = "arm",
        target_arch = "hexagon",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "riscv32",
        target_arch = "riscv64",
        target_arch = "sparc"
    ),
    repr(align(32))
)]
#[cfg_attr(
    not(any(
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "hexagon",
        target_arch = "m68k",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "powerpc64",
        target_arch = "riscv32",
        target_arch = "riscv64",
        target_arch = "s390x",
        target_arch = "sparc",
        target_arch = "x86_64",
    )),
    repr(align(64))
)]
#[cfg_attr(target_arch = "m68k", repr(align(16)))]
#[derive(Debug, Default)]
pub struct CachePadded<T>(pub T);

impl<T> core::ops::Deref for CachePadded<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}
impl<T> core::ops::DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
