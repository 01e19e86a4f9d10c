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

//! Hardware Transactional Memory primitives, assumed available as
//! `tx_begin`/`tx_end`/`tx_abort`/`tx_test`. On x86_64 these are backed by Intel RTM, emitted as
//! raw inline assembly (`xbegin`/`xend`/`xabort`/`xtest`) rather than through
//! `core::arch::x86_64`'s intrinsic wrappers: those wrappers (`_xbegin`/`_xend`/`_xabort`/
//! `_xtest`) are still gated behind the unstable `stdarch_x86_rtm` feature (rust-lang/rust#111138)
//! on the stable compiler this crate targets, so the four opcodes are encoded directly with
//! `core::arch::asm!`, which has been stable since Rust 1.59. Availability is still gated on a
//! runtime CPUID check the same way any optional-ISA-extension code path must be gated. On every
//! other target (and on x86_64 without RTM) [`htm_available`] reports `false` and every
//! transactional guard in `crate::sync::guard` degrades to running under the fallback lock
//! unconditionally — this is the "HTM opcode bindings" external collaborator this engine treats
//! as given.

use crate::macros::constgrp;

constgrp! {
    /// Reserved explicit-abort codes. User abort codes passed to
    /// [`tx_abort`] must be strictly between these two.
    pub struct AbortCode: u8 {
        /// The fallback lock was observed held; the transaction must wait and retry.
        GL_TAKEN = 0x00,
        /// A commit-time validation check failed; the whole operation attempt restarts.
        VALIDATION_FAILED = 0xEE,
    }
}

/// Exclusive lower bound for caller-selectable abort codes.
pub const USER_OPTION_LOWER_BOUND: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A concurrently-running thread touched data in this transaction's read/write set.
    Conflict,
    /// The transaction's working set overflowed the CPU's speculative buffering capacity.
    Capacity,
    /// The transaction hit an explicit `tx_abort(code)`, decomposed into the reserved or
    /// user-chosen code.
    Explicit(u8),
    /// The processor suggests retrying is likely to succeed.
    RetrySuggested,
    /// Some other/unclassified abort (nested-transaction abort, debug breakpoint, ...).
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Started,
    Aborted(AbortReason),
}

#[inline]
pub fn htm_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::is_x86_feature_detected!("rtm")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Begins a hardware transaction. The caller must be prepared for control to return here twice:
/// once with [`TxOutcome::Started`] after the (speculative) fall-through, and once more with
/// [`TxOutcome::Aborted`] if the transaction is rolled back — mirroring `setjmp`/`longjmp`
/// semantics. Every memory access performed between `tx_begin` and the matching [`tx_end`] (or
/// an abort) is part of the transaction's read/write set.
#[inline(always)]
pub fn tx_begin() -> TxOutcome {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        imp::xbegin()
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        TxOutcome::Aborted(AbortReason::Other)
    }
}

/// Commits the currently-open hardware transaction.
///
/// # Safety
/// Must be called exactly once, on the same thread, after a matching [`tx_begin`] that returned
/// [`TxOutcome::Started`], with no intervening `tx_begin`.
#[inline(always)]
pub unsafe fn tx_end() {
    #[cfg(target_arch = "x86_64")]
    imp::xend();
}

/// Explicitly aborts the currently-open hardware transaction with `code`, unwinding back to the
/// matching [`tx_begin`] call, which will return `TxOutcome::Aborted(AbortReason::Explicit(code))`.
///
/// # Safety
/// Must be called from within an open transaction on the same thread that began it.
#[inline(always)]
pub unsafe fn tx_abort(code: u8) -> ! {
    #[cfg(target_arch = "x86_64")]
    {
        imp::xabort(code)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = code;
        unreachable!("tx_abort called without an open transaction on this target")
    }
}

/// True if currently executing inside a hardware transaction.
#[inline(always)]
pub fn tx_test() -> bool {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        imp::xtest()
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

#[cfg(target_arch = "x86_64")]
mod imp {
    use super::{AbortReason, TxOutcome};
    use core::arch::asm;

    /// Sentinel EAX value software pre-loads before `xbegin`; on the fall-through (no-abort)
    /// path the hardware leaves EAX untouched, so seeing this value back out means "started".
    /// Hardware overwrites EAX with the real abort status only when resuming at the abort label.
    const _XBEGIN_STARTED: u32 = 0xFFFF_FFFF;
    const _XABORT_EXPLICIT: u32 = 1 << 0;
    const _XABORT_RETRY: u32 = 1 << 1;
    const _XABORT_CONFLICT: u32 = 1 << 2;
    const _XABORT_CAPACITY: u32 = 1 << 3;

    #[inline(always)]
    fn decode(status: u32) -> AbortReason {
        if status & _XABORT_EXPLICIT != 0 {
            AbortReason::Explicit(((status >> 24) & 0xFF) as u8)
        } else if status & _XABORT_CONFLICT != 0 {
            AbortReason::Conflict
        } else if status & _XABORT_CAPACITY != 0 {
            AbortReason::Capacity
        } else if status & _XABORT_RETRY != 0 {
            AbortReason::RetrySuggested
        } else {
            AbortReason::Other
        }
    }

    /// # Safety: caller pairs this with [`super::tx_end`]/abort handling and only calls it on a
    /// thread where `htm_available()` has already been checked true.
    #[target_feature(enable = "rtm")]
    #[inline]
    pub(super) unsafe fn xbegin() -> TxOutcome {
        let status: u32;
        asm!(
            "mov eax, {started:e}",
            "xbegin 2f",
            "jmp 3f",
            "2:",
            "3:",
            started = const _XBEGIN_STARTED,
            out("eax") status,
            options(nostack),
        );
        if status == _XBEGIN_STARTED {
            TxOutcome::Started
        } else {
            TxOutcome::Aborted(decode(status))
        }
    }

    #[target_feature(enable = "rtm")]
    #[inline]
    pub(super) unsafe fn xend() {
        asm!("xend", options(nostack, preserves_flags));
    }

    #[target_feature(enable = "rtm")]
    #[inline]
    pub(super) unsafe fn xabort(code: u8) -> ! {
        // `xabort`'s operand must be an assembler-time immediate, so it can't be threaded through
        // as a runtime `asm!` register operand; dispatch through a full byte-indexed jump table
        // (all 256 values) so every reserved and user-chosen code reaches its own immediate form.
        macro_rules! arm {
            ($($c:literal),* $(,)?) => {
                match code {
                    $($c => asm!("xabort {0}", const $c, options(noreturn)),)*
                }
            };
        }
        arm!(
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B,
            0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29,
            0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37,
            0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F, 0x40, 0x41, 0x42, 0x43, 0x44, 0x45,
            0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0x53,
            0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, 0x60, 0x61,
            0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F,
            0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x7B, 0x7C, 0x7D,
            0x7E, 0x7F, 0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x8B,
            0x8C, 0x8D, 0x8E, 0x8F, 0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99,
            0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0x9F, 0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7,
            0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5,
            0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, 0xC0, 0xC1, 0xC2, 0xC3,
            0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE, 0xCF, 0xD0, 0xD1,
            0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF,
            0xE0, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xEB, 0xEC, 0xED,
            0xEE, 0xEF, 0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB,
            0xFC, 0xFD, 0xFE, 0xFF,
        );
    }

    #[target_feature(enable = "rtm")]
    #[inline]
    pub(super) unsafe fn xtest() -> bool {
        let in_tx: u8;
        asm!(
            "xtest",
            "setnz {in_tx}",
            in_tx = out(reg_byte) in_tx,
            options(nostack, preserves_flags),
        );
        in_tx != 0
    }
}
