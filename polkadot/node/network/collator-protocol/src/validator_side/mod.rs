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

//! Validator side of the collator protocol.
//!
//! [`ValidatorSide`] decides whether an advertised collation may be fetched, which collation to
//! fetch next at a relay parent and keeps the collations which were fetched, or which wait for the
//! head data of their parent, until they are seconded or dropped.

use std::collections::{HashMap, HashSet};

use async_backing_primitives::{CandidateHash, CollatorId, Hash, Id as ParaId};
use async_backing_subsystem_util::{
	backing_implicit_view::View as ImplicitView, ClaimQueueSnapshot, ProspectiveParachainsMode,
};

use crate::LOG_TARGET;

mod claim_queue_state;
mod collation;


pub use claim_queue_state::{ClaimQueueState, ParaClaimState};
pub use collation::{
	fetched_collation_sanity_check, BlockedCollationId, CollationEvent, FetchedCollation,
	PendingCollation, PendingCollationFetch, ProspectiveCandidate,
};

/// Configuration of the [`ValidatorSide`].
#[derive(Debug, Clone, Copy)]
pub struct ValidatorSideConfig {
	/// Drop the claim bookkeeping of relay parents which are neither active leaves nor allowed
	/// relay parents of the implicit view whenever the active leaves are replaced.
	pub prune_claims_outside_view: bool,
}

impl Default for ValidatorSideConfig {
	fn default() -> Self {
		Self { prune_claims_outside_view: true }
	}
}

/// State of an active leaf as seen by the validator side.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLeafState {
	/// Whether async backing is enabled at the leaf, and with which parameters.
	pub prospective_parachains_mode: ProspectiveParachainsMode,
}

/// The collator which served the previous fetch, and optionally which candidate it served.
pub type PreviousFetch = (CollatorId, Option<CandidateHash>);

/// Validator side state of the collator protocol.
#[derive(Default)]
pub struct ValidatorSide {
	config: ValidatorSideConfig,
	active_leaves: HashMap<Hash, ActiveLeafState>,
	/// Collations fetched and waiting for validation, and who they were fetched from.
	fetched_candidates: HashMap<FetchedCollation, CollationEvent>,
	/// Collations which were fetched but whose parent head data is not known yet.
	blocked_from_seconding: HashMap<BlockedCollationId, Vec<PendingCollationFetch>>,
	claim_queue_state: ClaimQueueState,
}

impl ValidatorSide {
	/// Create a new, empty, validator side.
	pub fn new(config: ValidatorSideConfig) -> Self {
		Self { config, ..Default::default() }
	}

	/// Replace the active leaves.
	///
	/// Depending on the configuration, claims of relay parents which went out of view are
	/// dropped as well.
	pub fn update_active_leaves(
		&mut self,
		active_leaves: HashMap<Hash, ActiveLeafState>,
		implicit_view: &ImplicitView,
	) {
		self.active_leaves = active_leaves;

		if !self.config.prune_claims_outside_view {
			return
		}

		let in_view = self
			.active_leaves
			.keys()
			.chain(implicit_view.all_allowed_relay_parents())
			.copied()
			.collect::<HashSet<_>>();

		self.claim_queue_state.retain_relay_parents(|relay_parent| {
			let keep = in_view.contains(relay_parent);
			if !keep {
				gum::trace!(
					target: LOG_TARGET,
					?relay_parent,
					"Dropping claims of relay parent out of view",
				);
			}
			keep
		});
	}

	/// Whether an advertisement of a `para_id` collation at `relay_parent` can be processed.
	///
	/// The claims at `relay_parent` are refreshed from `claim_queue` first.
	pub fn can_process_advertisement(
		&mut self,
		relay_parent: Hash,
		para_id: ParaId,
		claim_queue: &ClaimQueueSnapshot,
	) -> bool {
		self.claim_queue_state.update_claim_queue(relay_parent, claim_queue);
		let can_claim = self.claim_queue_state.can_claim_at(&relay_parent, &para_id);

		if !can_claim {
			gum::debug!(
				target: LOG_TARGET,
				?relay_parent,
				?para_id,
				num_claims = self.claim_queue_state.num_claims(&relay_parent, &para_id),
				num_active = self.claim_queue_state.num_active(&relay_parent, &para_id),
				"No free claim for advertisement",
			);
		}

		can_claim
	}

	/// Note that a collation fetch for `para_id` at `relay_parent` started.
	pub fn register_collation_fetch(&mut self, relay_parent: Hash, para_id: ParaId) {
		self.claim_queue_state.register_fetch_attempt(relay_parent, para_id);
	}

	/// Note that a collation fetch for `para_id` at `relay_parent` finished or timed out.
	pub fn complete_collation_fetch(&mut self, relay_parent: Hash, para_id: ParaId) {
		self.claim_queue_state.complete_fetch_attempt(relay_parent, para_id);
	}

	/// Pick the collation to continue with at `relay_parent` after `previous_fetch` is done.
	///
	/// The first para, by id, which still has a free claim is served. Among the collations fetched
	/// for it, one from a collator other than the previous one is picked, the lowest candidate
	/// hash winning.
	pub fn get_next_collation_to_fetch(
		&self,
		relay_parent: &Hash,
		previous_fetch: &PreviousFetch,
	) -> Option<PreviousFetch> {
		if !self.active_leaves.contains_key(relay_parent) {
			gum::trace!(
				target: LOG_TARGET,
				?relay_parent,
				"Relay parent is not active anymore",
			);
			return None
		}

		let para_id = self.claim_queue_state.paras_with_free_claims(relay_parent).next()?;

		let (previous_collator, _) = previous_fetch;
		let next = self
			.fetched_candidates
			.iter()
			.filter(|(collation, event)| {
				&collation.relay_parent == relay_parent &&
					collation.para_id == para_id &&
					&event.collator_id != previous_collator
			})
			.min_by_key(|(collation, _)| collation.candidate_hash)
			.map(|(collation, event)| (event.collator_id.clone(), Some(collation.candidate_hash)));

		if next.is_none() {
			gum::trace!(
				target: LOG_TARGET,
				?relay_parent,
				?para_id,
				"No collation from another collator to continue with",
			);
		}

		next
	}

	/// Remember a fetched collation. An existing entry for the same collation is replaced.
	pub fn add_fetched_candidate(&mut self, collation: FetchedCollation, event: CollationEvent) {
		self.fetched_candidates.insert(collation, event);
	}

	/// Forget a fetched collation.
	pub fn remove_fetched_candidate(&mut self, collation: &FetchedCollation) {
		self.fetched_candidates.remove(collation);
	}

	/// Park a fetched collation until the head data of its parent is known.
	pub fn block_from_seconding(&mut self, id: BlockedCollationId, fetch: PendingCollationFetch) {
		gum::debug!(
			target: LOG_TARGET,
			para_id = ?id.para_id,
			parent_head_data_hash = ?id.parent_head_data_hash,
			candidate_hash = ?fetch.candidate_receipt.hash(),
			"Collation blocked from seconding, parent head data is unknown",
		);

		self.blocked_from_seconding.entry(id).or_default().push(fetch);
	}

	/// Take all collations parked under `id`, in the order they were parked.
	pub fn take_blocked_collations(
		&mut self,
		id: &BlockedCollationId,
	) -> Vec<PendingCollationFetch> {
		self.blocked_from_seconding.remove(id).unwrap_or_default()
	}

	/// Whether any collation is parked under `id`.
	pub fn has_blocked_collations(&self, id: &BlockedCollationId) -> bool {
		self.blocked_from_seconding.contains_key(id)
	}

	/// The fetched collations.
	pub fn fetched_candidates(&self) -> &HashMap<FetchedCollation, CollationEvent> {
		&self.fetched_candidates
	}

	/// The active leaves.
	pub fn active_leaves(&self) -> &HashMap<Hash, ActiveLeafState> {
		&self.active_leaves
	}

	/// The claim bookkeeping.
	pub fn claim_queue_state(&self) -> &ClaimQueueState {
		&self.claim_queue_state
	}
}
