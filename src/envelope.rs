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

//! The operation envelope: the retry loop and fallback-lock RAII that a concrete map
//! wraps around its `find_conn_point` / `ConnPoint` usage.
//!
//! There are two retry layers in this engine, and it's worth being explicit about which is
//! which: [`crate::connpoint::ConnPoint::connect_atomically`] retries *inside one attempt*,
//! absorbing ordinary HTM conflict/capacity aborts up to `Config::MAX_RETRIES` without ever
//! rebuilding the tree-of-copies. This module is the *outer* loop: when an attempt's commit comes
//! back `ValidationFailed`, the
//! whole walk-then-build-then-commit sequence restarts from scratch, because the tree-of-copies
//! was built against a live-tree view that a concurrent writer has since invalidated. That outer
//! restart is bounded too: after [`RetryOutcome::budget_exhausted`] worth of restarts, the next
//! attempt runs under [`TransactionAttempt::new`]'s held fallback lock, which guarantees the
//! following attempt cannot itself be invalidated (no other writer can be running concurrently),
//! so it is the last one that will ever be needed.

use crate::sync::fallback::GlobalLock;

/// RAII wrapper around one outer-loop attempt (`TransactionAttempt`). Constructed with
/// the *outer* retries remaining; when that count reaches zero the attempt holds the fallback
/// lock for its entire body instead of going through HTM at all: after the retry budget runs
/// out, the next attempt takes the fallback lock and publishes non-speculatively.
pub struct TransactionAttempt<'a> {
    guard: Option<parking_lot::MutexGuard<'a, ()>>,
}

impl<'a> TransactionAttempt<'a> {
    pub fn new(lock: &'a GlobalLock, outer_retries_remaining: usize) -> Self {
        if outer_retries_remaining == 0 {
            log::debug!("safetree: outer retry budget exhausted, acquiring fallback lock");
            Self {
                guard: Some(lock.lock()),
            }
        } else {
            Self { guard: None }
        }
    }

    /// Whether this attempt is already running under the fallback lock. A concrete map's
    /// `ConnPoint` must be constructed with
    /// [`ConnPoint::new_with_fallback`](crate::connpoint::ConnPoint::new_with_fallback) set to
    /// this value, so its eventual commit knows not to open an HTM region.
    pub fn is_fallback(&self) -> bool {
        self.guard.is_some()
    }
}

/// What one outer-loop attempt reported, distinct from the inner HTM retry machinery.
pub enum OperationOutcome<R> {
    /// The operation is done (found/not-found/committed); return this to the caller.
    Done(R),
    /// The attempt's commit failed validation; rebuild the snapshot and try the whole operation
    /// again.
    Restart,
}

/// Runs `attempt` (one full walk-build-commit cycle, given whether it runs under the fallback
/// lock) in a loop, decrementing `retries` on every [`OperationOutcome::Restart`] until it either
/// succeeds or the budget reaches zero and the final attempt is forced under the fallback lock.
/// That forced attempt is infallible from this loop's point of view (once the lock is held, no
/// concurrent writer can invalidate it), so `attempt` must not itself return `Restart`
/// while `is_fallback` is true — doing so is a logic error in the caller, not a condition this
/// loop retries around.
pub fn run_operation<R>(
    lock: &GlobalLock,
    retries: usize,
    mut attempt: impl FnMut(bool) -> OperationOutcome<R>,
) -> R {
    let mut remaining = retries;
    loop {
        let tx = TransactionAttempt::new(lock, remaining);
        match attempt(tx.is_fallback()) {
            OperationOutcome::Done(r) => return r,
            OperationOutcome::Restart => {
                debug_assert!(
                    !tx.is_fallback(),
                    "safetree: attempt restarted while holding the fallback lock"
                );
                remaining = remaining.saturating_sub(1);
            }
        }
    }
}

/// Retry-loop macro mirroring the canonical operation pseudocode: declares the outer `while not
/// success` loop, builds a [`TransactionAttempt`] each pass, and expects the body to `return` on
/// early exit or evaluate to an [`OperationOutcome`].
///
/// ```ignore
/// let result = operation!(lock, retries, |is_fallback| {
///     let lookup = search::find_conn_point::<N, C, PATH_N>(&key, root_ptr);
///     if lookup.found {
///         return OperationOutcome::Done(false); // AlreadyPresent
///     }
///     let cp = ConnPoint::new_with_fallback(lookup.snapshot, wrapper_pool, user_pool, lock, is_fallback);
///     // ...build the tree-of-copies, cp.set_root(...), etc...
///     drop(cp); // triggers the commit in Drop
///     if cp_succeeded {
///         OperationOutcome::Done(true)
///     } else {
///         OperationOutcome::Restart
///     }
/// });
/// ```
#[macro_export]
macro_rules! operation {
    ($lock:expr, $retries:expr, |$is_fallback:ident| $body:expr) => {
        $crate::envelope::run_operation($lock, $retries, |$is_fallback| $body)
    };
}
