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

//! The three transactional-guard flavors. Each wraps a single retry loop around a
//! closure run under HTM; they differ only in what happens once the retry budget is exhausted.

use super::{
    fallback::GlobalLock,
    htm::{self, AbortCode, AbortReason, TxOutcome},
    stats::Stats,
    Backoff,
};
use crate::config::RetryPolicy;

/// What a guarded closure reports back, distinct from an HTM abort: the closure itself can ask
/// for a non-retryable failure (`VALIDATION_FAILED`) without going through
/// `tx_abort` directly, which keeps `connpoint::ConnPoint::connect_atomically` free of raw HTM
/// plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    Committed(T),
    ValidationFailed,
}

/// Why a guard gave up entirely (only reachable from [`TSXTransOnlyGuard`], which never takes
/// the fallback lock itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardExhausted {
    RetriesExhausted,
    ValidationFailed,
}

struct RetryBudget {
    policy: RetryPolicy,
    remaining: usize,
}

impl RetryBudget {
    fn new(policy: RetryPolicy, max: usize) -> Self {
        Self {
            policy,
            remaining: max,
        }
    }
    fn has_budget(&self) -> bool {
        self.remaining > 0
    }
    /// Consumes one unit of budget for this abort, per the configured policy.
    fn consume(&mut self, reason: AbortReason) {
        match (self.policy, reason) {
            (RetryPolicy::Half, AbortReason::Conflict) => {
                self.remaining /= 2;
            }
            _ => {
                self.remaining = self.remaining.saturating_sub(1);
            }
        }
    }
}

/// Runs `body` inside an HTM transaction, checking the fallback lock before publishing, exactly
/// as required: before returning from the speculative region, inspect the fallback lock and
/// explicitly abort with `GL_TAKEN` if held. Returns `None` if the transaction aborted
/// (for any reason); the abort reason is written to `*last_reason`.
///
/// # Safety
/// `body` must not unwind (a panic across an open HTM transaction is undefined behavior on the
/// underlying ISA) and must not itself call [`htm::tx_begin`].
unsafe fn run_once<T>(
    lock: &GlobalLock,
    body: impl FnOnce() -> GuardOutcome<T>,
    last_reason: &mut Option<AbortReason>,
) -> Option<T> {
    match htm::tx_begin() {
        TxOutcome::Aborted(reason) => {
            *last_reason = Some(reason);
            None
        }
        TxOutcome::Started => {
            let outcome = body();
            match outcome {
                GuardOutcome::ValidationFailed => {
                    // SAFETY: we are inside the transaction this function began.
                    htm::tx_abort(AbortCode::VALIDATION_FAILED.d());
                }
                GuardOutcome::Committed(v) => {
                    if lock.is_locked() {
                        // SAFETY: still inside the open transaction.
                        htm::tx_abort(AbortCode::GL_TAKEN.d());
                    }
                    htm::tx_end();
                    Some(v)
                }
            }
        }
    }
}

fn wait_for_unlock(lock: &GlobalLock) {
    let backoff = Backoff::new();
    while lock.is_locked() {
        backoff.snooze();
    }
}

/// Executes `body` speculatively; on repeated or permanent HTM aborts, acquires the fallback
/// lock and re-executes non-speculatively exactly once (`TSXGuard`).
pub struct TSXGuard<'a> {
    lock: &'a GlobalLock,
    policy: RetryPolicy,
    max_retries: usize,
}

impl<'a> TSXGuard<'a> {
    pub fn new(lock: &'a GlobalLock, policy: RetryPolicy, max_retries: usize) -> Self {
        Self {
            lock,
            policy,
            max_retries,
        }
    }

    /// Runs `body` until it commits, retrying on abort per the configured policy and finally
    /// falling back to the global lock. `body` is re-invoked on every retry (including the
    /// non-speculative fallback run), so it must be idempotent up to the point it reports
    /// [`GuardOutcome::Committed`].
    pub fn run<T>(&self, mut body: impl FnMut() -> GuardOutcome<T>) -> Result<T, GuardExhausted> {
        if !htm::htm_available() {
            return self.run_fallback(body);
        }
        let mut budget = RetryBudget::new(self.policy, self.max_retries);
        while budget.has_budget() {
            let mut reason = None;
            // SAFETY: `body` is a plain closure over owned/borrowed Rust data and never unwinds
            // across the transaction boundary in this crate's usage (the commit envelope never
            // panics inside a guarded closure).
            let result = unsafe { run_once(self.lock, &mut body, &mut reason) };
            match result {
                Some(v) => return Ok(v),
                None => match reason {
                    Some(AbortReason::Explicit(c)) if c == AbortCode::VALIDATION_FAILED.d() => {
                        return Err(GuardExhausted::ValidationFailed)
                    }
                    Some(AbortReason::Explicit(c)) if c == AbortCode::GL_TAKEN.d() => {
                        wait_for_unlock(self.lock);
                        // a GL_TAKEN abort doesn't count against the retry budget: wait then
                        // retry, don't burn budget on contention that has nothing to do with
                        // this transaction's own working set.
                        continue;
                    }
                    Some(r) => budget.consume(r),
                    None => budget.consume(AbortReason::Other),
                },
            }
        }
        self.run_fallback(body)
    }

    fn run_fallback<T>(&self, mut body: impl FnMut() -> GuardOutcome<T>) -> Result<T, GuardExhausted> {
        let _held = self.lock.lock();
        match body() {
            GuardOutcome::Committed(v) => Ok(v),
            GuardOutcome::ValidationFailed => Err(GuardExhausted::ValidationFailed),
        }
    }
}

/// As [`TSXGuard`], but records per-thread abort/commit counters (`TSXGuardWithStats`).
/// Unlike [`TSXGuard`], this does not simply delegate to it: it runs its own copy of the retry
/// loop so every abort reason can be tallied individually as it's observed, rather than losing
/// that detail behind `TSXGuard::run`'s collapsed `GuardExhausted` result.
pub struct TSXGuardWithStats<'a> {
    lock: &'a GlobalLock,
    policy: RetryPolicy,
    max_retries: usize,
}

impl<'a> TSXGuardWithStats<'a> {
    pub fn new(lock: &'a GlobalLock, policy: RetryPolicy, max_retries: usize) -> Self {
        Self {
            lock,
            policy,
            max_retries,
        }
    }

    pub fn run<T>(
        &self,
        stats: &Stats,
        mut body: impl FnMut() -> GuardOutcome<T>,
    ) -> Result<T, GuardExhausted> {
        if !htm::htm_available() {
            return self.run_fallback(stats, body);
        }
        let mut budget = RetryBudget::new(self.policy, self.max_retries);
        while budget.has_budget() {
            let mut reason = None;
            // SAFETY: see `TSXGuard::run`.
            let result = unsafe { run_once(self.lock, &mut body, &mut reason) };
            match result {
                Some(v) => {
                    stats.commit();
                    return Ok(v);
                }
                None => match reason {
                    Some(AbortReason::Explicit(c)) if c == AbortCode::VALIDATION_FAILED.d() => {
                        return Err(GuardExhausted::ValidationFailed)
                    }
                    Some(AbortReason::Explicit(c)) if c == AbortCode::GL_TAKEN.d() => {
                        stats.lock_taken_abort();
                        wait_for_unlock(self.lock);
                        continue;
                    }
                    Some(AbortReason::Conflict) => {
                        stats.conflict_abort();
                        budget.consume(AbortReason::Conflict);
                    }
                    Some(AbortReason::Capacity) => {
                        stats.capacity_abort();
                        budget.consume(AbortReason::Capacity);
                    }
                    Some(r) => budget.consume(r),
                    None => budget.consume(AbortReason::Other),
                },
            }
        }
        self.run_fallback(stats, body)
    }

    fn run_fallback<T>(
        &self,
        stats: &Stats,
        mut body: impl FnMut() -> GuardOutcome<T>,
    ) -> Result<T, GuardExhausted> {
        stats.fallback_run();
        let _held = self.lock.lock();
        match body() {
            GuardOutcome::Committed(v) => {
                stats.commit();
                Ok(v)
            }
            GuardOutcome::ValidationFailed => Err(GuardExhausted::ValidationFailed),
        }
    }
}

/// Attempts HTM only; on exhaustion, reports [`GuardExhausted::RetriesExhausted`] instead of
/// taking the fallback lock itself (`TSXTransOnlyGuard`). The caller — the
/// `ConnPoint` destructor, via the operation envelope — is responsible for re-running the whole
/// attempt under the fallback lock.
pub struct TSXTransOnlyGuard<'a> {
    lock: &'a GlobalLock,
    policy: RetryPolicy,
    max_retries: usize,
}

impl<'a> TSXTransOnlyGuard<'a> {
    pub fn new(lock: &'a GlobalLock, policy: RetryPolicy, max_retries: usize) -> Self {
        Self {
            lock,
            policy,
            max_retries,
        }
    }

    pub fn run<T>(&self, mut body: impl FnMut() -> GuardOutcome<T>) -> Result<T, GuardExhausted> {
        if !htm::htm_available() {
            return Err(GuardExhausted::RetriesExhausted);
        }
        let mut budget = RetryBudget::new(self.policy, self.max_retries);
        while budget.has_budget() {
            let mut reason = None;
            // SAFETY: see `TSXGuard::run`.
            let result = unsafe { run_once(self.lock, &mut body, &mut reason) };
            match result {
                Some(v) => return Ok(v),
                None => match reason {
                    Some(AbortReason::Explicit(c)) if c == AbortCode::VALIDATION_FAILED.d() => {
                        return Err(GuardExhausted::ValidationFailed)
                    }
                    Some(AbortReason::Explicit(c)) if c == AbortCode::GL_TAKEN.d() => {
                        wait_for_unlock(self.lock);
                        continue;
                    }
                    Some(r) => budget.consume(r),
                    None => budget.consume(AbortReason::Other),
                },
            }
        }
        Err(GuardExhausted::RetriesExhausted)
    }
}
