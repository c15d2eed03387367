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

//! An in-memory stand-in for the runtime and the block tree.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use async_backing_primitives::{
	AsyncBackingParams, BackingState, BlockNumber, CoreIndex, CoreState, Hash, Header,
	Id as ParaId, SessionIndex,
};
use async_backing_subsystem_util::{ChainApi, ChainApiError, RuntimeApi, RuntimeApiError};

use crate::RELAY_STORAGE_ROOT;

#[derive(Default)]
struct MockState {
	headers: HashMap<Hash, Header>,
	// Relay parents without an entry report `NotSupported`.
	async_backing_params: HashMap<Hash, AsyncBackingParams>,
	// Relay parents without an entry report `NotSupported`.
	claim_queues: HashMap<Hash, BTreeMap<CoreIndex, VecDeque<ParaId>>>,
	availability_cores: HashMap<Hash, Vec<CoreState>>,
	backing_states: HashMap<(Hash, ParaId), BackingState>,
	sessions: HashMap<Hash, SessionIndex>,
	failing_backing_states: Vec<(Hash, ParaId)>,
	failing_ancestries: Vec<Hash>,
	header_requests: usize,
	backing_state_requests: usize,
}

/// Mocked runtime and chain collaborators.
///
/// Every setter may be called at any time, also while a request is in flight.
#[derive(Default)]
pub struct MockRuntime {
	state: Mutex<MockState>,
}

impl MockRuntime {
	/// Create an empty mock. Every block runs a runtime without asynchronous backing support.
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a relay-chain block.
	pub fn add_block(&self, hash: Hash, parent_hash: Hash, number: BlockNumber) {
		let header = Header {
			parent_hash,
			number,
			state_root: RELAY_STORAGE_ROOT,
			extrinsics_root: Hash::zero(),
		};
		self.state.lock().headers.insert(hash, header);
	}

	/// Set the asynchronous backing parameters at a relay parent.
	pub fn set_async_backing_params(&self, relay_parent: Hash, params: AsyncBackingParams) {
		self.state.lock().async_backing_params.insert(relay_parent, params);
	}

	/// Set the claim queue at a relay parent.
	pub fn set_claim_queue(
		&self,
		relay_parent: Hash,
		claim_queue: BTreeMap<CoreIndex, VecDeque<ParaId>>,
	) {
		self.state.lock().claim_queues.insert(relay_parent, claim_queue);
	}

	/// Set the availability cores at a relay parent.
	pub fn set_availability_cores(&self, relay_parent: Hash, cores: Vec<CoreState>) {
		self.state.lock().availability_cores.insert(relay_parent, cores);
	}

	/// Set the backing state of a para at a relay parent.
	pub fn set_backing_state(&self, relay_parent: Hash, para_id: ParaId, state: BackingState) {
		self.state.lock().backing_states.insert((relay_parent, para_id), state);
	}

	/// Make the backing state request for a para at a relay parent fail.
	pub fn fail_backing_state(&self, relay_parent: Hash, para_id: ParaId) {
		self.state.lock().failing_backing_states.push((relay_parent, para_id));
	}

	/// Make the ancestry request for a block fail.
	pub fn fail_ancestry(&self, hash: Hash) {
		self.state.lock().failing_ancestries.push(hash);
	}

	/// Set the session of the children of a block. Blocks default to session 1.
	pub fn set_session(&self, parent: Hash, session: SessionIndex) {
		self.state.lock().sessions.insert(parent, session);
	}

	/// The number of header requests served so far.
	pub fn header_requests(&self) -> usize {
		self.state.lock().header_requests
	}

	/// The number of backing state requests served so far.
	pub fn backing_state_requests(&self) -> usize {
		self.state.lock().backing_state_requests
	}
}

fn not_supported(runtime_api_name: &'static str) -> RuntimeApiError {
	RuntimeApiError::NotSupported { runtime_api_name }
}

#[async_trait]
impl RuntimeApi for MockRuntime {
	async fn async_backing_params(
		&self,
		relay_parent: Hash,
	) -> Result<AsyncBackingParams, RuntimeApiError> {
		self.state
			.lock()
			.async_backing_params
			.get(&relay_parent)
			.copied()
			.ok_or_else(|| not_supported("async_backing_params"))
	}

	async fn para_backing_state(
		&self,
		relay_parent: Hash,
		para_id: ParaId,
	) -> Result<Option<BackingState>, RuntimeApiError> {
		let mut state = self.state.lock();
		state.backing_state_requests += 1;
		if state.failing_backing_states.contains(&(relay_parent, para_id)) {
			return Err(RuntimeApiError::Execution {
				runtime_api_name: "para_backing_state",
				source: std::sync::Arc::new(ChainApiError::from("mocked failure")),
			})
		}
		Ok(state.backing_states.get(&(relay_parent, para_id)).cloned())
	}

	async fn availability_cores(
		&self,
		relay_parent: Hash,
	) -> Result<Vec<CoreState>, RuntimeApiError> {
		Ok(self.state.lock().availability_cores.get(&relay_parent).cloned().unwrap_or_default())
	}

	async fn claim_queue(
		&self,
		relay_parent: Hash,
	) -> Result<BTreeMap<CoreIndex, VecDeque<ParaId>>, RuntimeApiError> {
		self.state
			.lock()
			.claim_queues
			.get(&relay_parent)
			.cloned()
			.ok_or_else(|| not_supported("claim_queue"))
	}

	async fn session_index_for_child(
		&self,
		relay_parent: Hash,
	) -> Result<SessionIndex, RuntimeApiError> {
		Ok(self.state.lock().sessions.get(&relay_parent).copied().unwrap_or(1))
	}
}

#[async_trait]
impl ChainApi for MockRuntime {
	async fn block_header(&self, hash: Hash) -> Result<Option<Header>, ChainApiError> {
		let mut state = self.state.lock();
		state.header_requests += 1;
		Ok(state.headers.get(&hash).cloned())
	}

	async fn ancestors(&self, hash: Hash, k: usize) -> Result<Vec<Hash>, ChainApiError> {
		let state = self.state.lock();
		if state.failing_ancestries.contains(&hash) {
			return Err(ChainApiError::from("mocked failure"))
		}

		let mut ancestors = Vec::with_capacity(k);
		let mut current = hash;

		while ancestors.len() < k {
			match state.headers.get(&current) {
				Some(header) if header.number > 0 => {
					ancestors.push(header.parent_hash);
					current = header.parent_hash;
				},
				_ => break,
			}
		}

		Ok(ancestors)
	}
}
