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

//! # safetree
//!
//! A reusable concurrency framework for building non-blocking, linearizable, ordered in-memory
//! search-tree maps on top of Hardware Transactional Memory (HTM) combined with a
//! Read-Copy-Update (RCU) discipline.
//!
//! This crate does not ship a concrete map. A caller supplies a node type implementing
//! [`node::TreeNode`] (and, to use the search-mode helpers, [`node::SearchNode`]) describing a
//! rooted, bounded-arity tree; this crate supplies the machinery that walks it
//! ([`path::PathTracker`], [`search::find_conn_point`]), builds a private tree-of-copies over one
//! attempt ([`safenode::SafeNode`], [`connpoint::ConnPoint`]), and publishes it with a single
//! HTM-validated pointer store, falling back to a process-wide lock when HTM cannot make
//! progress ([`sync::guard`], [`envelope`]).
//!
//! See `tests/common` for a minimal binary-search-tree collaborator that exercises every module
//! end to end; it is not part of the public API.

pub mod config;
pub mod connpoint;
pub mod envelope;
pub mod error;
pub(crate) mod macros;
pub mod mem;
pub mod node;
pub mod path;
pub mod safenode;
pub mod search;
pub mod sync;

pub use config::{Config, PreConfig, RetryPolicy, TreeType};
pub use connpoint::{ConnPoint, ConnPointSnapshot};
pub use error::{FatalError, SafeTreeError, SafeTreeResult};
pub use node::{ChildIndex, NodeRef, SearchNode, TreeNode};
pub use path::{PathStack, PathTracker, AT_ROOT};
pub use safenode::{NodeType, SafeNode};
pub use search::{find, find_conn_point, find_target_node, ConnPointLookup};
