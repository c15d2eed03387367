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

//! Per relay parent bookkeeping of how many collations each para is owed.
//!
//! Every entry of the runtime's claim queue at a relay parent entitles the claiming para to one
//! collation at that relay parent. A fetch attempt occupies one of those claims until it
//! completes, so a para with as many fetches in flight as it has claims has to wait.

use std::collections::{BTreeMap, HashMap};

use async_backing_primitives::{Hash, Id as ParaId};
use async_backing_subsystem_util::ClaimQueueSnapshot;

use crate::LOG_TARGET;

/// Claims and in-flight fetches of one para at one relay parent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParaClaimState {
	/// Number of claim queue entries for the para, as of the last claim queue update.
	pub num_claims: usize,
	/// Number of fetch attempts which were registered and did not complete yet.
	pub num_active: usize,
}

impl ParaClaimState {
	fn has_free_claim(&self) -> bool {
		self.num_claims > self.num_active
	}
}

/// Claim bookkeeping for all relay parents of interest.
#[derive(Debug, Default)]
pub struct ClaimQueueState {
	// Ordered by para so that iteration is deterministic.
	state_by_relay_parent: HashMap<Hash, BTreeMap<ParaId, ParaClaimState>>,
}

impl ClaimQueueState {
	/// Create an empty `ClaimQueueState`.
	pub fn new() -> Self {
		Self::default()
	}

	/// Refresh the claims at `relay_parent` from the full claim queue snapshot.
	///
	/// Claim counts recorded earlier for this relay parent are replaced, in-flight fetches are
	/// kept.
	pub fn update_claim_queue(&mut self, relay_parent: Hash, claim_queue: &ClaimQueueSnapshot) {
		let paras = self.state_by_relay_parent.entry(relay_parent).or_default();

		for state in paras.values_mut() {
			state.num_claims = 0;
		}

		for (_, claims) in claim_queue.iter_all_claims() {
			for para_id in claims {
				paras.entry(*para_id).or_default().num_claims += 1;
			}
		}

		gum::trace!(
			target: LOG_TARGET,
			?relay_parent,
			claims = ?paras,
			"Updated claim queue state",
		);
	}

	/// Whether `para_id` may claim another collation at `relay_parent`.
	///
	/// Pairs without any recorded state are not restricted.
	pub fn can_claim_at(&self, relay_parent: &Hash, para_id: &ParaId) -> bool {
		self.para_state(relay_parent, para_id).map_or(true, |state| state.has_free_claim())
	}

	/// Note a fetch attempt for `para_id` at `relay_parent`.
	pub fn register_fetch_attempt(&mut self, relay_parent: Hash, para_id: ParaId) {
		let state = self
			.state_by_relay_parent
			.entry(relay_parent)
			.or_default()
			.entry(para_id)
			.or_default();
		state.num_active += 1;

		gum::trace!(
			target: LOG_TARGET,
			?relay_parent,
			?para_id,
			num_active = state.num_active,
			num_claims = state.num_claims,
			"Registered fetch attempt",
		);
	}

	/// Note that a fetch attempt for `para_id` at `relay_parent` is over, successful or not.
	pub fn complete_fetch_attempt(&mut self, relay_parent: Hash, para_id: ParaId) {
		let Some(state) = self
			.state_by_relay_parent
			.get_mut(&relay_parent)
			.and_then(|paras| paras.get_mut(&para_id))
		else {
			gum::debug!(
				target: LOG_TARGET,
				?relay_parent,
				?para_id,
				"Completed a fetch attempt which was never registered",
			);
			return
		};

		state.num_active = state.num_active.saturating_sub(1);
	}

	/// The claim state of `para_id` at `relay_parent`, if any was recorded.
	pub fn para_state(&self, relay_parent: &Hash, para_id: &ParaId) -> Option<&ParaClaimState> {
		self.state_by_relay_parent.get(relay_parent)?.get(para_id)
	}

	/// Number of claims `para_id` has at `relay_parent`.
	pub fn num_claims(&self, relay_parent: &Hash, para_id: &ParaId) -> usize {
		self.para_state(relay_parent, para_id).map_or(0, |state| state.num_claims)
	}

	/// Number of fetches in flight for `para_id` at `relay_parent`.
	pub fn num_active(&self, relay_parent: &Hash, para_id: &ParaId) -> usize {
		self.para_state(relay_parent, para_id).map_or(0, |state| state.num_active)
	}

	/// The paras at `relay_parent` which have more claims than fetches in flight, lowest id first.
	pub fn paras_with_free_claims<'a>(
		&'a self,
		relay_parent: &Hash,
	) -> impl Iterator<Item = ParaId> + 'a {
		self.state_by_relay_parent
			.get(relay_parent)
			.into_iter()
			.flatten()
			.filter(|(_, state)| state.has_free_claim())
			.map(|(para_id, _)| *para_id)
	}

	/// Forget everything about `relay_parent`.
	pub fn remove_relay_parent(&mut self, relay_parent: &Hash) {
		self.state_by_relay_parent.remove(relay_parent);
	}

	/// Keep only the relay parents matching `keep`.
	pub fn retain_relay_parents(&mut self, mut keep: impl FnMut(&Hash) -> bool) {
		self.state_by_relay_parent.retain(|relay_parent, _| keep(relay_parent));
	}

	/// Whether nothing is tracked.
	pub fn is_empty(&self) -> bool {
		self.state_by_relay_parent.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_backing_primitives::CoreIndex;
	use std::collections::VecDeque;

	fn snapshot(claims: Vec<(u32, Vec<ParaId>)>) -> ClaimQueueSnapshot {
		claims
			.into_iter()
			.map(|(core, paras)| (CoreIndex(core), VecDeque::from(paras)))
			.collect::<BTreeMap<_, _>>()
			.into()
	}

	#[test]
	fn sane_initial_state() {
		let state = ClaimQueueState::new();
		let relay_parent = Hash::from_low_u64_be(1);
		let para_id = ParaId::from(2000);

		assert!(state.is_empty());
		assert!(state.can_claim_at(&relay_parent, &para_id));
		assert_eq!(state.para_state(&relay_parent, &para_id), None);
		assert_eq!(state.paras_with_free_claims(&relay_parent).count(), 0);
	}

	#[test]
	fn fetch_attempt_occupies_claim() {
		let mut state = ClaimQueueState::new();
		let relay_parent = Hash::from_low_u64_be(1);
		let para_id = ParaId::from(2000);

		state.update_claim_queue(relay_parent, &snapshot(vec![(0, vec![para_id])]));
		assert!(state.can_claim_at(&relay_parent, &para_id));

		state.register_fetch_attempt(relay_parent, para_id);
		assert!(!state.can_claim_at(&relay_parent, &para_id));
		assert_eq!(
			state.para_state(&relay_parent, &para_id),
			Some(&ParaClaimState { num_claims: 1, num_active: 1 })
		);

		state.complete_fetch_attempt(relay_parent, para_id);
		assert!(state.can_claim_at(&relay_parent, &para_id));
		assert_eq!(state.num_active(&relay_parent, &para_id), 0);
	}

	#[test]
	fn claims_are_counted_over_all_cores_and_depths() {
		let mut state = ClaimQueueState::new();
		let relay_parent = Hash::from_low_u64_be(1);
		let para_a = ParaId::from(1);
		let para_b = ParaId::from(2);

		state.update_claim_queue(
			relay_parent,
			&snapshot(vec![(0, vec![para_a, para_b, para_a]), (1, vec![para_a])]),
		);

		assert_eq!(state.num_claims(&relay_parent, &para_a), 3);
		assert_eq!(state.num_claims(&relay_parent, &para_b), 1);

		state.register_fetch_attempt(relay_parent, para_b);
		state.register_fetch_attempt(relay_parent, para_a);
		state.register_fetch_attempt(relay_parent, para_a);

		assert_eq!(state.paras_with_free_claims(&relay_parent).collect::<Vec<_>>(), vec![para_a]);

		state.register_fetch_attempt(relay_parent, para_a);
		assert_eq!(state.paras_with_free_claims(&relay_parent).count(), 0);
	}

	#[test]
	fn update_replaces_claims_and_keeps_active_fetches() {
		let mut state = ClaimQueueState::new();
		let relay_parent = Hash::from_low_u64_be(1);
		let para_a = ParaId::from(1);
		let para_b = ParaId::from(2);

		state.update_claim_queue(relay_parent, &snapshot(vec![(0, vec![para_a, para_a])]));
		state.register_fetch_attempt(relay_parent, para_a);

		// Applying the same snapshot again doesn't accumulate claims.
		state.update_claim_queue(relay_parent, &snapshot(vec![(0, vec![para_a, para_a])]));
		assert_eq!(
			state.para_state(&relay_parent, &para_a),
			Some(&ParaClaimState { num_claims: 2, num_active: 1 })
		);

		state.update_claim_queue(relay_parent, &snapshot(vec![(0, vec![para_b])]));
		assert_eq!(
			state.para_state(&relay_parent, &para_a),
			Some(&ParaClaimState { num_claims: 0, num_active: 1 })
		);
		assert!(!state.can_claim_at(&relay_parent, &para_a));
		assert!(state.can_claim_at(&relay_parent, &para_b));
	}

	#[test]
	fn num_active_never_underflows() {
		let mut state = ClaimQueueState::new();
		let relay_parent = Hash::from_low_u64_be(1);
		let para_id = ParaId::from(2000);

		// Unknown pairs are ignored.
		state.complete_fetch_attempt(relay_parent, para_id);
		assert!(state.is_empty());

		state.update_claim_queue(relay_parent, &snapshot(vec![(0, vec![para_id])]));
		state.complete_fetch_attempt(relay_parent, para_id);
		state.complete_fetch_attempt(relay_parent, para_id);
		assert_eq!(state.num_active(&relay_parent, &para_id), 0);
		assert!(state.can_claim_at(&relay_parent, &para_id));
	}

	#[test]
	fn relay_parents_can_be_pruned() {
		let mut state = ClaimQueueState::new();
		let relay_parent_a = Hash::from_low_u64_be(1);
		let relay_parent_b = Hash::from_low_u64_be(2);
		let relay_parent_c = Hash::from_low_u64_be(3);
		let para_id = ParaId::from(2000);

		for relay_parent in [relay_parent_a, relay_parent_b, relay_parent_c] {
			state.update_claim_queue(relay_parent, &snapshot(vec![(0, vec![para_id])]));
			state.register_fetch_attempt(relay_parent, para_id);
		}

		state.remove_relay_parent(&relay_parent_a);
		assert_eq!(state.para_state(&relay_parent_a, &para_id), None);

		state.retain_relay_parents(|relay_parent| relay_parent == &relay_parent_c);
		assert_eq!(state.para_state(&relay_parent_b, &para_id), None);
		assert_eq!(state.num_active(&relay_parent_c, &para_id), 1);

		state.retain_relay_parents(|_| false);
		assert!(state.is_empty());
	}
}
