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

//! Compile-time configuration knobs, split into a small user-facing trait (`PreConfig`) with the
//! few independent choices, and a derived trait (`Config`) that fills in everything computable
//! from those choices. Concrete maps built on this engine supply their own zero-sized `PreConfig`
//! type rather than parameterizing at runtime.

/// Reachability-check strategy for `ConnPoint::connect_atomically`'s reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeType {
    /// The user node implements the search contract (`SearchNode`); reachability is re-derived
    /// with `nextChild(target)` from the root, which is cheaper than replaying the path.
    SearchTree,
    /// No search contract is assumed; reachability is checked by replaying the recorded path
    /// hop by hop.
    GeneralTree,
}

/// HTM retry budget policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry a fixed number of times regardless of abort reason.
    Stubborn,
    /// Halve the remaining retry budget on every conflict abort (capacity/explicit aborts still
    /// consume one attempt each).
    Half,
}

/// The independent configuration choices a concrete map must supply. Everything else on
/// [`Config`] is derived.
pub trait PreConfig: Sized + 'static {
    /// `K`, the compile-time arity of the user node.
    const ARITY: usize;
    /// Reachability-check strategy.
    const TREE_TYPE: TreeType;
    /// HTM retry policy for the commit envelope.
    const RETRY_POLICY: RetryPolicy;
    /// Stubborn/initial retry budget before falling back to the global lock.
    const MAX_RETRIES: usize;
}

pub trait Config: PreConfig {
    /// Path stack / validation-set bound. Exceeding this is `FatalError::PathOverflow`.
    const PATH_MAX_LEN: usize = 10_000;
    /// Caps the per-type arena registry, i.e. the number of threads that may concurrently hold
    /// a registered thread-local arena.
    const RCU_HTM_MAX_THREADS: usize = 256;
    /// Recycle wrapper-node (`SafeNode`) arenas on reset instead of leaking them until shutdown.
    const TSX_MEM_POOL: bool = true;
    /// Give the user-node arena a checkpoint/rollback capability. Turning this off is only sound
    /// if the concrete map never aborts a partially-built tree-of-copies, which is never the
    /// case for this engine — kept as a knob for parity with the source design rather than as
    /// something an implementer should actually disable.
    const USER_MEM_POOL: bool = true;
    /// Eagerly re-check a `SafeNode`'s snapshot the moment it is promoted (`make_copy`), instead
    /// of waiting for the commit-time validation pass, abandoning the attempt early on mismatch.
    const TM_EARLY_ABORT: bool = false;
    /// As `TM_EARLY_ABORT`, but scoped to the copy step specifically (checked inside
    /// `SafeNode::rw_ref` rather than across the whole validation set).
    const TM_EARLY_ABORT_ON_COPY: bool = false;
}

impl<T: PreConfig> Config for T {}

/// The default configuration: a binary search tree with stubborn retries and a retry budget of
/// 30. Concrete maps override this with their own zero-sized config type.
pub struct DefConfig;
impl PreConfig for DefConfig {
    const ARITY: usize = 2;
    const TREE_TYPE: TreeType = TreeType::SearchTree;
    const RETRY_POLICY: RetryPolicy = RetryPolicy::Stubborn;
    const MAX_RETRIES: usize = 30;
}
