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

//! Error kinds for the SafeTree engine.
//!
//! Only [`ValidationFailed`](SafeTreeError::ValidationFailed) and
//! [`RetriesExhausted`](SafeTreeError::RetriesExhausted) are ever observed by a user operation
//! body (`ConnPoint::connect_atomically`/`connect_atomically_search`'s return value); the commit
//! envelope (`crate::envelope`) absorbs everything else and either retries transparently or
//! panics, per the policy table in §7. A thread that finds the fallback lock held never surfaces
//! that as an error: `sync::guard` waits it out internally (`TSXGuard`/`TSXTransOnlyGuard`'s
//! `GL_TAKEN` handling), so there is no variant for it here.

use core::fmt;

pub type SafeTreeResult<T> = Result<T, SafeTreeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeTreeError {
    /// The HTM commit (or an eager snapshot check) observed a stale read; the whole operation
    /// attempt must restart from `find_conn_point`.
    ValidationFailed,
    /// The retry budget for an attempt was exhausted without a successful HTM commit; the
    /// caller must re-run the attempt while holding the fallback lock.
    RetriesExhausted,
}

impl fmt::Display for SafeTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ValidationFailed => "validation failed: a concurrent writer invalidated this attempt",
            Self::RetriesExhausted => "htm retry budget exhausted",
        };
        f.write_str(s)
    }
}

impl std::error::Error for SafeTreeError {}

/// Fatal conditions: these are bugs or mis-sizing, never recovered from. They abort the process
/// the way an arena running out of memory should, rather than unwinding through caller code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    /// The path stack overflowed its configured bound (`Config::PATH_MAX_LEN`).
    PathOverflow,
    /// A thread-local arena ran out of preallocated capacity.
    OutOfArena,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PathOverflow => "path stack overflow: tree deeper than PATH_MAX_LEN",
            Self::OutOfArena => "arena exhausted",
        };
        f.write_str(s)
    }
}

impl FatalError {
    #[cold]
    #[inline(never)]
    pub fn raise(self) -> ! {
        log::error!("safetree: fatal: {self}");
        panic!("safetree: fatal: {self}");
    }
}
