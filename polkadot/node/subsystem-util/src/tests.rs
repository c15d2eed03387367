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

#![cfg(test)]

use super::*;
use crate::primitives::{
	AsyncBackingParams, BackingState, CoreIndex, CoreState, Hash, Id as ParaId, ScheduledCore,
	SessionIndex,
};
use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::executor::block_on;
use std::collections::{BTreeMap, VecDeque};

// A runtime which either supports every request or none of the optional ones.
struct TestRuntime {
	async_backing_params: Option<AsyncBackingParams>,
	claim_queue: Option<BTreeMap<CoreIndex, VecDeque<ParaId>>>,
	fail_session: bool,
}

fn not_supported(runtime_api_name: &'static str) -> RuntimeApiError {
	RuntimeApiError::NotSupported { runtime_api_name }
}

#[async_trait]
impl RuntimeApi for TestRuntime {
	async fn async_backing_params(
		&self,
		_relay_parent: Hash,
	) -> Result<AsyncBackingParams, RuntimeApiError> {
		self.async_backing_params.ok_or_else(|| not_supported("async_backing_params"))
	}

	async fn para_backing_state(
		&self,
		_relay_parent: Hash,
		_para_id: ParaId,
	) -> Result<Option<BackingState>, RuntimeApiError> {
		Ok(None)
	}

	async fn availability_cores(
		&self,
		_relay_parent: Hash,
	) -> Result<Vec<CoreState>, RuntimeApiError> {
		Ok(vec![CoreState::Scheduled(ScheduledCore { para_id: 1.into(), collator: None })])
	}

	async fn claim_queue(
		&self,
		_relay_parent: Hash,
	) -> Result<BTreeMap<CoreIndex, VecDeque<ParaId>>, RuntimeApiError> {
		self.claim_queue.clone().ok_or_else(|| not_supported("claim_queue"))
	}

	async fn session_index_for_child(
		&self,
		_relay_parent: Hash,
	) -> Result<SessionIndex, RuntimeApiError> {
		if self.fail_session {
			Err(RuntimeApiError::Execution {
				runtime_api_name: "session_index_for_child",
				source: std::sync::Arc::new(ChainApiError::from("boom")),
			})
		} else {
			Ok(3)
		}
	}
}

fn legacy_runtime() -> TestRuntime {
	TestRuntime { async_backing_params: None, claim_queue: None, fail_session: false }
}

fn claim_queue() -> BTreeMap<CoreIndex, VecDeque<ParaId>> {
	let mut claim_queue = BTreeMap::new();
	claim_queue.insert(CoreIndex(0), vec![1.into(), 2.into()].into());
	claim_queue.insert(CoreIndex(1), vec![3.into()].into());
	claim_queue
}

fn modern_runtime() -> TestRuntime {
	TestRuntime {
		async_backing_params: Some(AsyncBackingParams {
			max_candidate_depth: 4,
			allowed_ancestry_len: 3,
		}),
		claim_queue: Some(claim_queue()),
		fail_session: false,
	}
}

#[test]
fn prospective_parachains_mode_enabled() {
	let mode = block_on(prospective_parachains_mode(&modern_runtime(), Hash::zero())).unwrap();

	assert_eq!(
		mode,
		ProspectiveParachainsMode::Enabled { max_candidate_depth: 4, allowed_ancestry_len: 3 }
	);
	assert!(mode.is_enabled());
}

#[test]
fn prospective_parachains_mode_disabled_on_legacy_runtime() {
	let mode = block_on(prospective_parachains_mode(&legacy_runtime(), Hash::zero())).unwrap();

	assert_eq!(mode, ProspectiveParachainsMode::Disabled);
	assert!(!mode.is_enabled());
}

#[test]
fn claim_queue_not_supported_is_none() {
	assert_matches!(block_on(fetch_claim_queue(&legacy_runtime(), Hash::zero())), Ok(None));
}

#[test]
fn claim_queue_snapshot_accessors() {
	let snapshot = block_on(fetch_claim_queue(&modern_runtime(), Hash::zero())).unwrap().unwrap();

	assert_eq!(snapshot.get_claim_for(CoreIndex(0), 0), Some(1.into()));
	assert_eq!(snapshot.get_claim_for(CoreIndex(0), 1), Some(2.into()));
	assert_eq!(snapshot.get_claim_for(CoreIndex(1), 1), None);
	assert_eq!(snapshot.get_claim_for(CoreIndex(2), 0), None);

	assert_eq!(
		snapshot.iter_claims_at_depth(0).collect::<Vec<_>>(),
		vec![(CoreIndex(0), 1.into()), (CoreIndex(1), 3.into())]
	);
	assert_eq!(snapshot.iter_claims_at_depth(1).collect::<Vec<_>>(), vec![(CoreIndex(0), 2.into())]);
	assert_eq!(
		snapshot.iter_claims_for_core(&CoreIndex(0)).copied().collect::<Vec<ParaId>>(),
		vec![1.into(), 2.into()]
	);
	assert_eq!(snapshot.iter_claims_for_core(&CoreIndex(5)).count(), 0);
	assert_eq!(snapshot.iter_all_claims().count(), 2);
}

#[test]
fn runtime_errors_are_propagated() {
	let runtime = TestRuntime { fail_session: true, ..modern_runtime() };

	assert_matches!(
		block_on(request_session_index_for_child(&runtime, Hash::zero())),
		Err(runtime::Error::RuntimeRequest(RuntimeApiError::Execution { runtime_api_name, .. })) => {
			assert_eq!(runtime_api_name, "session_index_for_child");
		}
	);
	assert_matches!(block_on(request_session_index_for_child(&modern_runtime(), Hash::zero())), Ok(3));
}
