// Copyright (C) Parity Technologies (UK) Ltd.
// This file is part of Polkadot.

// Polkadot is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Polkadot is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Polkadot.  If not, see <http://www.gnu.org/licenses/>.

//! Interfaces of the runtime and chain collaborators, plus convenience helpers on top of them.
//!
//! The subsystems never talk to a runtime or a block tree directly. They go through the
//! [`RuntimeApi`] and [`ChainApi`] traits, so any backend (a live node, an in-memory mock) can be
//! plugged in. Every call may suspend.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;

use crate::primitives::{
	AsyncBackingParams, BackingState, CoreIndex, CoreState, Hash, Header, Id as ParaId,
	SessionIndex,
};

use crate::LOG_TARGET;

mod error;

pub use error::{ChainApiError, Error, Result, RuntimeApiError};

/// Runtime API requests consumed by the backing subsystems.
#[async_trait]
pub trait RuntimeApi: Send + Sync {
	/// Get the asynchronous backing parameters at the given relay parent.
	///
	/// Runtimes which predate asynchronous backing return
	/// [`RuntimeApiError::NotSupported`].
	async fn async_backing_params(
		&self,
		relay_parent: Hash,
	) -> std::result::Result<AsyncBackingParams, RuntimeApiError>;

	/// Get the backing state of the given para: its constraints and the candidates pending
	/// availability. `None` means the para is not known to the runtime.
	async fn para_backing_state(
		&self,
		relay_parent: Hash,
		para_id: ParaId,
	) -> std::result::Result<Option<BackingState>, RuntimeApiError>;

	/// Get the state of all availability cores.
	async fn availability_cores(
		&self,
		relay_parent: Hash,
	) -> std::result::Result<Vec<CoreState>, RuntimeApiError>;

	/// Get the claim queue.
	async fn claim_queue(
		&self,
		relay_parent: Hash,
	) -> std::result::Result<BTreeMap<CoreIndex, VecDeque<ParaId>>, RuntimeApiError>;

	/// Get the session index a child of the given block will be in.
	async fn session_index_for_child(
		&self,
		relay_parent: Hash,
	) -> std::result::Result<SessionIndex, RuntimeApiError>;
}

/// Block tree requests consumed by the backing subsystems.
#[async_trait]
pub trait ChainApi: Send + Sync {
	/// Get the header of a block. `None` means the header was not found.
	async fn block_header(
		&self,
		hash: Hash,
	) -> std::result::Result<Option<Header>, ChainApiError>;

	/// Get up to `k` ancestors of the given block, in descending order, not including the block
	/// itself.
	async fn ancestors(
		&self,
		hash: Hash,
		k: usize,
	) -> std::result::Result<Vec<Hash>, ChainApiError>;
}

/// Returns the session index a child of the given block will be in.
pub async fn request_session_index_for_child<R>(runtime: &R, parent: Hash) -> Result<SessionIndex>
where
	R: RuntimeApi + ?Sized,
{
	Ok(runtime.session_index_for_child(parent).await?)
}

/// Prospective parachains mode of a relay parent. Defined by
/// the Runtime API version.
///
/// Needed for the period of transition to asynchronous backing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProspectiveParachainsMode {
	/// Runtime API without support of `async_backing_params`: no prospective parachains.
	Disabled,
	/// vstaging runtime API: prospective parachains.
	Enabled {
		/// The maximum number of para blocks between the para head in a relay parent
		/// and a new candidate. Restricts nodes from building arbitrary long chains
		/// and spamming other validators.
		max_candidate_depth: usize,
		/// How many ancestors of a relay parent are allowed to build candidates on top
		/// of.
		allowed_ancestry_len: usize,
	},
}

impl ProspectiveParachainsMode {
	/// Returns `true` if mode is enabled, `false` otherwise.
	pub fn is_enabled(&self) -> bool {
		matches!(self, ProspectiveParachainsMode::Enabled { .. })
	}
}

/// Requests prospective parachains mode for a given relay parent based on
/// the Runtime API version.
pub async fn prospective_parachains_mode<R>(
	runtime: &R,
	relay_parent: Hash,
) -> Result<ProspectiveParachainsMode>
where
	R: RuntimeApi + ?Sized,
{
	match runtime.async_backing_params(relay_parent).await {
		Ok(AsyncBackingParams { max_candidate_depth, allowed_ancestry_len }) =>
			Ok(ProspectiveParachainsMode::Enabled {
				max_candidate_depth: max_candidate_depth as _,
				allowed_ancestry_len: allowed_ancestry_len as _,
			}),
		Err(RuntimeApiError::NotSupported { runtime_api_name }) => {
			gum::trace!(
				target: LOG_TARGET,
				?relay_parent,
				?runtime_api_name,
				"Prospective parachains are disabled, is not supported by the current Runtime API",
			);

			Ok(ProspectiveParachainsMode::Disabled)
		},
		Err(err) => Err(err.into()),
	}
}

/// An snapshot of the runtime claim queue at an arbitrary relay chain block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClaimQueueSnapshot(pub BTreeMap<CoreIndex, VecDeque<ParaId>>);

impl From<BTreeMap<CoreIndex, VecDeque<ParaId>>> for ClaimQueueSnapshot {
	fn from(claim_queue_snapshot: BTreeMap<CoreIndex, VecDeque<ParaId>>) -> Self {
		ClaimQueueSnapshot(claim_queue_snapshot)
	}
}

impl ClaimQueueSnapshot {
	/// Returns the `ParaId` that has a claim for `core_index` at the specified `depth` in the
	/// claim queue. A depth of `0` means the very next block.
	pub fn get_claim_for(&self, core_index: CoreIndex, depth: usize) -> Option<ParaId> {
		self.0.get(&core_index)?.get(depth).copied()
	}

	/// Returns an iterator over all claimed cores and the claiming `ParaId` at the specified
	/// `depth` in the claim queue.
	pub fn iter_claims_at_depth(
		&self,
		depth: usize,
	) -> impl Iterator<Item = (CoreIndex, ParaId)> + '_ {
		self.0
			.iter()
			.filter_map(move |(core_index, paras)| Some((*core_index, *paras.get(depth)?)))
	}

	/// Returns an iterator over all claims on the given core.
	pub fn iter_claims_for_core(
		&self,
		core_index: &CoreIndex,
	) -> impl Iterator<Item = &ParaId> + '_ {
		self.0.get(core_index).map(|c| c.iter()).into_iter().flatten()
	}

	/// Returns an iterator over the whole claim queue.
	pub fn iter_all_claims(&self) -> impl Iterator<Item = (&CoreIndex, &VecDeque<ParaId>)> + '_ {
		self.0.iter()
	}
}

/// Fetch the claim queue and wrap it into a helpful `ClaimQueueSnapshot`.
///
/// Returns `None` if the runtime does not support the claim queue.
pub async fn fetch_claim_queue<R>(
	runtime: &R,
	relay_parent: Hash,
) -> Result<Option<ClaimQueueSnapshot>>
where
	R: RuntimeApi + ?Sized,
{
	match runtime.claim_queue(relay_parent).await {
		Ok(claim_queue) => Ok(Some(claim_queue.into())),
		Err(RuntimeApiError::NotSupported { runtime_api_name }) => {
			gum::trace!(
				target: LOG_TARGET,
				?relay_parent,
				?runtime_api_name,
				"Claim queue is not supported by the current Runtime API",
			);

			Ok(None)
		},
		Err(err) => Err(err.into()),
	}
}
