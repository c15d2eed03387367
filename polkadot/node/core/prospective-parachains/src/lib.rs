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

//! The prospective parachains subsystem.
//!
//! For every active leaf and every para scheduled there, a fragment chain tracks the candidates
//! which could be backed on top of the leaf: those pending availability, the backed ones forming
//! the best chain and the seconded ones waiting to be connected. Chains of relay parents which are
//! no longer leaves stay around for as long as the implicit view allows building on them.
//!
//! Candidate validity is predicted with [`async_backing_subsystem_util::inclusion_emulator`].
//! Ancestry never crosses a session boundary.

#![deny(unused_crate_dependencies)]

use std::collections::{HashMap, HashSet};

use fragment_chain::CandidateStorage;
use futures::{channel::mpsc, prelude::*};

use async_backing_primitives::{
	async_backing::CandidatePendingAvailability, BlockNumber, CandidateHash,
	CommittedCandidateReceipt, CoreState, Hash, HeadData, Header, Id as ParaId,
	PersistedValidationData,
};
use async_backing_subsystem_util::{
	backing_implicit_view::{BlockInfoProspectiveParachains as BlockInfo, View as ImplicitView},
	inclusion_emulator::{Constraints, RelayChainBlockInfo},
	messages::{
		ActiveLeavesUpdate, Ancestors, FromOrchestra, HypotheticalCandidate,
		HypotheticalMembership, HypotheticalMembershipRequest, IntroduceSecondedCandidateRequest,
		OverseerSignal, ParentHeadData, ProspectiveParachainsMessage,
		ProspectiveValidationDataRequest,
	},
	request_session_index_for_child,
	runtime::{fetch_claim_queue, prospective_parachains_mode, ProspectiveParachainsMode},
	ChainApi, RuntimeApi,
};

use crate::{
	error::Result,
	fragment_chain::{
		CandidateEntry, Error as FragmentChainError, FragmentChain, Scope as FragmentChainScope,
	},
};

mod error;
mod fragment_chain;

mod metrics;
pub use self::metrics::Metrics;

pub use error::FatalError;

const LOG_TARGET: &str = "parachain::prospective-parachains";

struct RelayBlockViewData {
	fragment_chains: HashMap<ParaId, FragmentChain>,
}

// State owned by the subsystem loop.
struct View {
	// Every relay parent allowed by the implicit view, leaves included.
	per_relay_parent: HashMap<Hash, RelayBlockViewData>,
	// Always a subset of the keys of `per_relay_parent`.
	active_leaves: HashSet<Hash>,
	implicit_view: ImplicitView,
}

impl View {
	fn new() -> Self {
		View {
			per_relay_parent: HashMap::new(),
			active_leaves: HashSet::new(),
			implicit_view: ImplicitView::default(),
		}
	}

	fn get_fragment_chains(&self, relay_parent: &Hash) -> Option<&HashMap<ParaId, FragmentChain>> {
		self.per_relay_parent.get(relay_parent).map(|data| &data.fragment_chains)
	}
}

/// The prospective parachains subsystem.
#[derive(Default)]
pub struct ProspectiveParachainsSubsystem {
	metrics: Metrics,
}

impl ProspectiveParachainsSubsystem {
	/// Create a new instance of the `ProspectiveParachainsSubsystem`.
	pub fn new(metrics: Metrics) -> Self {
		Self { metrics }
	}

	/// Run the subsystem until it is told to conclude.
	///
	/// Messages are processed strictly in the order they are received. Runtime and chain
	/// information is requested through `sender`. Only a closed `receiver` is fatal, every other
	/// failure is logged and the subsystem keeps running.
	pub async fn run<Sender>(
		self,
		sender: Sender,
		receiver: mpsc::Receiver<FromOrchestra<ProspectiveParachainsMessage>>,
	) -> std::result::Result<(), FatalError>
	where
		Sender: RuntimeApi + ChainApi,
	{
		run(&sender, receiver, &self.metrics).await
	}
}

async fn run<Sender>(
	sender: &Sender,
	mut receiver: mpsc::Receiver<FromOrchestra<ProspectiveParachainsMessage>>,
	metrics: &Metrics,
) -> error::FatalResult<()>
where
	Sender: RuntimeApi + ChainApi,
{
	let mut view = View::new();
	loop {
		match receiver.next().await.ok_or(FatalError::ReceiverExhausted)? {
			FromOrchestra::Signal(OverseerSignal::Conclude) => return Ok(()),
			FromOrchestra::Signal(OverseerSignal::ActiveLeaves(update)) => {
				error::log_error(
					handle_active_leaves_update(sender, &mut view, update, metrics).await,
					"Encountered issue during active leaves update",
				)?;
			},
			FromOrchestra::Signal(OverseerSignal::BlockFinalized(..)) => {},
			FromOrchestra::Communication { msg } => handle_message(&mut view, msg, metrics),
		}
	}
}

fn handle_message(view: &mut View, msg: ProspectiveParachainsMessage, metrics: &Metrics) {
	match msg {
		ProspectiveParachainsMessage::IntroduceSecondedCandidate(request, tx) => {
			let _ = tx.send(handle_introduce_seconded_candidate(view, request, metrics));
		},
		ProspectiveParachainsMessage::CandidateBacked(para, candidate_hash) =>
			handle_candidate_backed(view, para, candidate_hash, metrics),
		ProspectiveParachainsMessage::GetBackableCandidates(
			relay_parent,
			para,
			count,
			ancestors,
			tx,
		) => {
			let _ =
				tx.send(answer_get_backable_candidates(view, relay_parent, para, count, ancestors));
		},
		ProspectiveParachainsMessage::GetHypotheticalMembership(request, tx) => {
			let _ = tx.send(answer_hypothetical_membership_request(view, request, metrics));
		},
		ProspectiveParachainsMessage::GetMinimumRelayParents(relay_parent, tx) => {
			let _ = tx.send(answer_minimum_relay_parents_request(view, relay_parent));
		},
		ProspectiveParachainsMessage::GetProspectiveValidationData(request, tx) => {
			let _ = tx.send(answer_prospective_validation_data_request(view, request));
		},
	}
}

// Leaves going away are dropped before the new leaf is looked at, and relay parents which fell
// out of the implicit view are pruned afterwards. Both happen whatever the activation outcome,
// a failed activation only costs the new leaf and is returned for logging.
async fn handle_active_leaves_update<Sender>(
	sender: &Sender,
	view: &mut View,
	update: ActiveLeavesUpdate,
	metrics: &Metrics,
) -> Result<()>
where
	Sender: RuntimeApi + ChainApi,
{
	let _timer = metrics.time_handle_active_leaves_update();

	gum::trace!(
		target: LOG_TARGET,
		activated = ?update.activated,
		deactivated = ?update.deactivated,
		"Handle ActiveLeavesUpdate"
	);

	for deactivated in &update.deactivated {
		view.active_leaves.remove(deactivated);
		view.implicit_view.deactivate_leaf(*deactivated);
	}

	let activation = match update.activated {
		Some(leaf) if !update.deactivated.contains(&leaf.hash) =>
			activate_leaf(sender, view, leaf.hash).await,
		_ => Ok(()),
	};

	let allowed: HashSet<Hash> = view.implicit_view.all_allowed_relay_parents().copied().collect();
	view.per_relay_parent.retain(|relay_parent, _| allowed.contains(relay_parent));

	record_view_metrics(view, metrics);

	activation
}

// Build the fragment chains of a new leaf and register it. Failing requests about the leaf itself
// leave it out of the view. A para whose chain cannot be built is left out of the leaf.
async fn activate_leaf<Sender>(sender: &Sender, view: &mut View, leaf_hash: Hash) -> Result<()>
where
	Sender: RuntimeApi + ChainApi,
{
	let ProspectiveParachainsMode::Enabled { max_candidate_depth, allowed_ancestry_len } =
		prospective_parachains_mode(sender, leaf_hash).await?
	else {
		gum::trace!(
			target: LOG_TARGET,
			leaf_hash = ?leaf_hash,
			"Async backing is disabled at the leaf, it is not tracked"
		);
		return Ok(())
	};

	// Headers are requested at most once per activation.
	let mut headers = HashMap::new();

	let Some(leaf_info) = fetch_block_info(sender, &mut headers, leaf_hash).await? else {
		gum::warn!(
			target: LOG_TARGET,
			leaf_hash = ?leaf_hash,
			"No header for the activated leaf, it is not tracked"
		);
		return Ok(())
	};

	let upcoming_paras = fetch_upcoming_paras(sender, leaf_hash).await?;
	let ancestry =
		fetch_ancestry(sender, &mut headers, leaf_hash, allowed_ancestry_len).await?;

	// Chains of the parent leaf, if it was tracked, hand their candidates down.
	let parent_chains = ancestry.first().and_then(|parent| view.get_fragment_chains(&parent.hash));

	let mut fragment_chains = HashMap::with_capacity(upcoming_paras.len());
	for para in upcoming_paras {
		let parent_chain = parent_chains.and_then(|chains| chains.get(&para));
		let chain = build_fragment_chain(
			sender,
			&mut headers,
			para,
			&leaf_info,
			&ancestry,
			max_candidate_depth,
			parent_chain,
		)
		.await;

		match chain {
			Ok(Some(chain)) => {
				fragment_chains.insert(para, chain);
			},
			Ok(None) => {},
			Err(err) => {
				gum::warn!(
					target: LOG_TARGET,
					para_id = ?para,
					leaf_hash = ?leaf_hash,
					?err,
					"Leaving para out of the leaf, its fragment chain could not be built",
				);
			},
		}
	}

	view.per_relay_parent.insert(leaf_hash, RelayBlockViewData { fragment_chains });
	view.active_leaves.insert(leaf_hash);
	view.implicit_view.activate_leaf_from_prospective_parachains(leaf_info, &ancestry);

	Ok(())
}

// The fragment chain of `para` at a new leaf: candidates pending availability form its base, the
// unconnected and backed candidates of the parent leaf's chain are carried over. `None` if the
// runtime reports no backing state for the para or the ancestry is malformed.
async fn build_fragment_chain<Sender>(
	sender: &Sender,
	headers: &mut HashMap<Hash, Header>,
	para: ParaId,
	leaf_info: &BlockInfo,
	ancestry: &[BlockInfo],
	max_candidate_depth: usize,
	parent_chain: Option<&FragmentChain>,
) -> Result<Option<FragmentChain>>
where
	Sender: RuntimeApi + ChainApi,
{
	let leaf_hash = leaf_info.hash;

	let Some((constraints, pending_availability)) =
		fetch_backing_state(sender, leaf_hash, para).await?
	else {
		gum::debug!(
			target: LOG_TARGET,
			para_id = ?para,
			leaf_hash = ?leaf_hash,
			"No backing state for scheduled para",
		);
		return Ok(None)
	};

	let pending_availability = preprocess_candidates_pending_availability(
		sender,
		headers,
		constraints.required_parent.clone(),
		pending_availability,
	)
	.await?;

	let mut pending_storage = CandidateStorage::default();
	let mut pending_in_scope = Vec::with_capacity(pending_availability.len());
	for pending in pending_availability {
		let candidate_hash = pending.compact.candidate_hash;
		match pending_storage.add_pending_availability_candidate(
			candidate_hash,
			pending.candidate,
			pending.persisted_validation_data,
		) {
			Ok(()) | Err(FragmentChainError::CandidateAlreadyKnown) => {},
			Err(err) => {
				// Later candidates build on this one, none of them can be used either.
				gum::warn!(
					target: LOG_TARGET,
					?candidate_hash,
					para_id = ?para,
					?err,
					"Invalid candidate pending availability",
				);
				break
			},
		}
		pending_in_scope.push(pending.compact);
	}

	// At most `max_candidate_depth` para blocks on top of the first one building on the latest
	// included head.
	let max_backable_len = max_candidate_depth + 1;

	let scope = match FragmentChainScope::with_ancestors(
		leaf_info.clone().into(),
		constraints,
		pending_in_scope,
		max_backable_len,
		ancestry.iter().cloned().map(RelayChainBlockInfo::from),
	) {
		Ok(scope) => scope,
		Err(unexpected_ancestors) => {
			gum::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				leaf_hash = ?leaf_hash,
				?ancestry,
				"Skipping para, relay chain ancestors are out of order: {:?}",
				unexpected_ancestors
			);
			return Ok(None)
		},
	};

	let expected_pending = pending_storage.len();
	let mut chain = FragmentChain::init(scope, pending_storage);
	if chain.best_chain_len() < expected_pending {
		gum::warn!(
			target: LOG_TARGET,
			para_id = ?para,
			leaf_hash = ?leaf_hash,
			introduced = chain.best_chain_len(),
			expected = expected_pending,
			"Some candidates pending availability are not part of the chain",
		);
	}

	if let Some(parent_chain) = parent_chain {
		chain.populate_from_previous(parent_chain);
	}

	gum::trace!(
		target: LOG_TARGET,
		para_id = ?para,
		leaf_hash = ?leaf_hash,
		min_relay_parent = chain.scope().earliest_relay_parent().number,
		best_chain = ?chain.best_chain_vec(),
		unconnected = ?chain.unconnected().map(|c| c.hash()).collect::<Vec<_>>(),
		"Fragment chain built",
	);

	Ok(Some(chain))
}

fn record_view_metrics(view: &View, metrics: &Metrics) {
	if metrics.0.is_some() {
		let (mut connected, mut unconnected, mut in_implicit_view) = (0, 0, 0);
		for (relay_parent, data) in &view.per_relay_parent {
			let is_leaf = view.active_leaves.contains(relay_parent);
			for chain in data.fragment_chains.values() {
				if is_leaf {
					connected += chain.best_chain_len();
					unconnected += chain.unconnected_len();
				} else {
					in_implicit_view += chain.best_chain_len() + chain.unconnected_len();
				}
			}
		}

		metrics.record_candidate_count(connected as u64, unconnected as u64);
		metrics.record_candidate_count_in_implicit_view(in_implicit_view as u64);
	}

	let active = view.active_leaves.len() as u64;
	let inactive = (view.per_relay_parent.len() as u64).saturating_sub(active);
	metrics.record_leaves_count(active, inactive);
}

// A candidate pending availability with everything needed to put it into candidate storage.
struct ImportablePendingAvailability {
	candidate: CommittedCandidateReceipt,
	persisted_validation_data: PersistedValidationData,
	compact: fragment_chain::PendingAvailability,
}

// Candidates pending availability form a chain on top of the latest included head, which lets
// their persisted validation data be rebuilt. The chain is cut at the first candidate whose
// relay parent header is unknown.
async fn preprocess_candidates_pending_availability<Sender>(
	sender: &Sender,
	headers: &mut HashMap<Hash, Header>,
	included_head: HeadData,
	pending_availability: Vec<CandidatePendingAvailability>,
) -> Result<Vec<ImportablePendingAvailability>>
where
	Sender: ChainApi,
{
	let total = pending_availability.len();
	let mut parent_head = included_head;
	let mut importable = Vec::with_capacity(total);

	for (index, pending) in pending_availability.into_iter().enumerate() {
		let relay_parent_hash = pending.descriptor.relay_parent;
		let Some(relay_parent) = fetch_block_info(sender, headers, relay_parent_hash).await? else {
			gum::debug!(
				target: LOG_TARGET,
				candidate_hash = ?pending.candidate_hash,
				para_id = ?pending.descriptor.para_id,
				?relay_parent_hash,
				index,
				total,
				"Unknown relay parent, ignoring the rest of the candidates pending availability",
			);
			break
		};

		let output_head = pending.commitments.head_data.clone();
		let persisted_validation_data = PersistedValidationData {
			parent_head: std::mem::replace(&mut parent_head, output_head),
			relay_parent_number: relay_parent.number,
			relay_parent_storage_root: relay_parent.storage_root,
			max_pov_size: pending.max_pov_size,
		};

		importable.push(ImportablePendingAvailability {
			compact: fragment_chain::PendingAvailability {
				candidate_hash: pending.candidate_hash,
				relay_parent: relay_parent.into(),
			},
			candidate: CommittedCandidateReceipt {
				descriptor: pending.descriptor,
				commitments: pending.commitments,
			},
			persisted_validation_data,
		});
	}

	Ok(importable)
}

// Offer a seconded candidate to every fragment chain of its para, including the chains of relay
// parents which are no longer leaves so that leaves built on them inherit the candidate.
// `true` if at least one chain keeps it.
fn handle_introduce_seconded_candidate(
	view: &mut View,
	request: IntroduceSecondedCandidateRequest,
	metrics: &Metrics,
) -> bool {
	let _timer = metrics.time_introduce_seconded_candidate();

	let IntroduceSecondedCandidateRequest {
		candidate_para: para,
		candidate_receipt,
		persisted_validation_data,
	} = request;

	let candidate_hash = candidate_receipt.hash();
	let entry = match CandidateEntry::new_seconded(
		candidate_hash,
		candidate_receipt,
		persisted_validation_data,
	) {
		Ok(entry) => entry,
		Err(err) => {
			gum::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Rejecting malformed seconded candidate: {}",
				err
			);
			return false
		},
	};

	let mut para_known = false;
	let mut kept = false;
	for (relay_parent, data) in view.per_relay_parent.iter_mut() {
		let Some(chain) = data.fragment_chains.get_mut(&para) else { continue };
		para_known = true;

		match chain.try_adding_seconded_candidate(&entry) {
			Ok(()) => {
				gum::debug!(
					target: LOG_TARGET,
					para_id = ?para,
					?relay_parent,
					?candidate_hash,
					"Seconded candidate kept",
				);
				kept = true;
			},
			Err(FragmentChainError::CandidateAlreadyKnown) => {
				kept = true;
			},
			Err(err) => {
				gum::debug!(
					target: LOG_TARGET,
					para_id = ?para,
					?relay_parent,
					?candidate_hash,
					"Seconded candidate does not fit the chain: {}",
					err
				);
			},
		}
	}

	if !para_known {
		gum::warn!(
			target: LOG_TARGET,
			para_id = ?para,
			?candidate_hash,
			"Seconded candidate for a para which is not scheduled at any relay parent",
		);
	} else if !kept {
		gum::debug!(
			target: LOG_TARGET,
			para_id = ?para,
			?candidate_hash,
			"Seconded candidate was rejected by every fragment chain",
		);
	}

	kept
}

// Mark a candidate as backed in every fragment chain of its para. An unscheduled para is worth a
// warning, it points at the runtime and the backing subsystems disagreeing. An unknown candidate
// of a scheduled para is expected, it may have lost a fork to a better candidate already.
fn handle_candidate_backed(
	view: &mut View,
	para: ParaId,
	candidate_hash: CandidateHash,
	metrics: &Metrics,
) {
	let _timer = metrics.time_candidate_backed();

	let mut para_known = false;
	let mut candidate_known = false;
	for (relay_parent, data) in view.per_relay_parent.iter_mut() {
		let Some(chain) = data.fragment_chains.get_mut(&para) else { continue };
		para_known = true;

		if chain.is_candidate_backed(&candidate_hash) {
			candidate_known = true;
			continue
		}
		if !chain.contains_unconnected_candidate(&candidate_hash) {
			continue
		}

		candidate_known = true;
		chain.candidate_backed(&candidate_hash);

		gum::trace!(
			target: LOG_TARGET,
			para_id = ?para,
			?relay_parent,
			?candidate_hash,
			best_chain = ?chain.best_chain_vec(),
			unconnected = ?chain.unconnected().map(|c| c.hash()).collect::<Vec<_>>(),
			"Candidate backed",
		);
	}

	if !para_known {
		gum::warn!(
			target: LOG_TARGET,
			para_id = ?para,
			?candidate_hash,
			"Backed candidate for a para which is not scheduled at any relay parent",
		);
	} else if !candidate_known {
		gum::debug!(
			target: LOG_TARGET,
			para_id = ?para,
			?candidate_hash,
			"Backed candidate is unknown",
		);
	}
}

fn answer_get_backable_candidates(
	view: &View,
	relay_parent: Hash,
	para: ParaId,
	count: u32,
	ancestors: Ancestors,
) -> Vec<(CandidateHash, Hash)> {
	let chain = view
		.active_leaves
		.contains(&relay_parent)
		.then(|| view.get_fragment_chains(&relay_parent))
		.flatten()
		.and_then(|chains| chains.get(&para));

	let Some(chain) = chain else {
		gum::debug!(
			target: LOG_TARGET,
			?relay_parent,
			para_id = ?para,
			"Backable candidates requested for a para without a chain at an active leaf",
		);
		return Vec::new()
	};

	let backable = chain.find_backable_chain(ancestors, count);

	gum::trace!(
		target: LOG_TARGET,
		?relay_parent,
		para_id = ?para,
		count,
		best_chain = ?chain.best_chain_vec(),
		?backable,
		"Backable candidates",
	);

	backable
}

fn answer_hypothetical_membership_request(
	view: &View,
	request: HypotheticalMembershipRequest,
	metrics: &Metrics,
) -> Vec<(HypotheticalCandidate, HypotheticalMembership)> {
	let _timer = metrics.time_hypothetical_membership_request();

	let HypotheticalMembershipRequest { candidates, fragment_chain_relay_parent } = request;

	let leaves = view
		.active_leaves
		.iter()
		.filter(|leaf| fragment_chain_relay_parent.map_or(true, |required| **leaf == required))
		.filter_map(|leaf| view.get_fragment_chains(leaf).map(|chains| (*leaf, chains)))
		.collect::<Vec<_>>();

	candidates
		.into_iter()
		.map(|candidate| {
			let para = candidate.candidate_para();
			let membership = leaves
				.iter()
				.filter(|(leaf, chains)| {
					let Some(chain) = chains.get(&para) else { return false };
					match chain.can_add_candidate_as_potential(&candidate) {
						Ok(()) | Err(FragmentChainError::CandidateAlreadyKnown) => true,
						Err(err) => {
							gum::debug!(
								target: LOG_TARGET,
								para_id = ?para,
								?leaf,
								candidate = ?candidate.candidate_hash(),
								"Not a hypothetical member: {}",
								err
							);
							false
						},
					}
				})
				.map(|(leaf, _)| *leaf)
				.collect();
			(candidate, membership)
		})
		.collect()
}

fn answer_minimum_relay_parents_request(
	view: &View,
	relay_parent: Hash,
) -> Vec<(ParaId, BlockNumber)> {
	if !view.active_leaves.contains(&relay_parent) {
		return Vec::new()
	}

	view.get_fragment_chains(&relay_parent)
		.into_iter()
		.flatten()
		.map(|(para, chain)| (*para, chain.scope().earliest_relay_parent().number))
		.collect()
}

// The persisted validation data a candidate of `para` would have, pieced together from the chains
// of all active leaves. The relay parent must be in the scope of one of them.
fn answer_prospective_validation_data_request(
	view: &View,
	request: ProspectiveValidationDataRequest,
) -> Option<PersistedValidationData> {
	let ProspectiveValidationDataRequest { para_id, candidate_relay_parent, parent_head_data } =
		request;

	let (mut parent_head, parent_head_hash) = match parent_head_data {
		ParentHeadData::OnlyHash(hash) => (None, hash),
		ParentHeadData::WithData { head_data, hash } => (Some(head_data), hash),
	};
	let mut relay_parent = None;
	let mut max_pov_size = None;

	let chains = view
		.active_leaves
		.iter()
		.filter_map(|leaf| view.get_fragment_chains(leaf).and_then(|chains| chains.get(&para_id)));
	for chain in chains {
		if parent_head.is_none() {
			parent_head = chain.get_head_data_by_hash(&parent_head_hash);
		}
		if relay_parent.is_none() {
			if let Some(info) = chain.scope().ancestor(&candidate_relay_parent) {
				relay_parent = Some(info);
				// Scopes never cross a session boundary and the maximum PoV size only changes
				// with the session.
				max_pov_size = Some(chain.scope().base_constraints().max_pov_size);
			}
		}
		if parent_head.is_some() && relay_parent.is_some() {
			break
		}
	}

	let (parent_head, relay_parent, max_pov_size) = (parent_head?, relay_parent?, max_pov_size?);
	Some(PersistedValidationData {
		parent_head,
		relay_parent_number: relay_parent.number,
		relay_parent_storage_root: relay_parent.storage_root,
		max_pov_size: max_pov_size as _,
	})
}

async fn fetch_backing_state<Sender>(
	sender: &Sender,
	relay_parent: Hash,
	para_id: ParaId,
) -> Result<Option<(Constraints, Vec<CandidatePendingAvailability>)>>
where
	Sender: RuntimeApi,
{
	let backing_state = sender.para_backing_state(relay_parent, para_id).await?;
	Ok(backing_state.map(|state| (state.constraints.into(), state.pending_availability)))
}

// Paras which may get a candidate backed in the near future. The claim queue covers every core's
// upcoming assignments, availability cores only the next one.
async fn fetch_upcoming_paras<Sender>(
	sender: &Sender,
	relay_parent: Hash,
) -> Result<HashSet<ParaId>>
where
	Sender: RuntimeApi,
{
	if let Some(claim_queue) = fetch_claim_queue(sender, relay_parent).await? {
		return Ok(claim_queue.iter_all_claims().flat_map(|(_, paras)| paras).copied().collect())
	}

	let cores = sender.availability_cores(relay_parent).await?;
	let upcoming = cores
		.into_iter()
		.flat_map(|core| match core {
			CoreState::Scheduled(scheduled) => vec![scheduled.para_id],
			CoreState::Occupied(occupied) => occupied
				.next_up_on_available
				.into_iter()
				.chain(occupied.next_up_on_time_out)
				.map(|scheduled| scheduled.para_id)
				.collect(),
			CoreState::Free => Vec::new(),
		})
		.collect();

	Ok(upcoming)
}

// Up to `limit` ancestors of the leaf, closest first. Candidates cannot be backed in a session
// other than the one they were built in, so the ancestry ends at the first block whose children
// belong to a different session than the leaf's children. It also ends at the first unknown
// header.
async fn fetch_ancestry<Sender>(
	sender: &Sender,
	headers: &mut HashMap<Hash, Header>,
	leaf_hash: Hash,
	limit: usize,
) -> Result<Vec<BlockInfo>>
where
	Sender: RuntimeApi + ChainApi,
{
	if limit == 0 {
		return Ok(Vec::new())
	}

	let hashes = sender.ancestors(leaf_hash, limit).await?;
	let leaf_session = request_session_index_for_child(sender, leaf_hash).await?;

	let mut ancestry = Vec::with_capacity(hashes.len());
	for hash in hashes {
		let Some(info) = fetch_block_info(sender, headers, hash).await? else {
			gum::warn!(
				target: LOG_TARGET,
				?leaf_hash,
				ancestor = ?hash,
				"Ancestry cut short, no header for ancestor",
			);
			break
		};

		let session = request_session_index_for_child(sender, hash).await?;
		if session != leaf_session {
			gum::trace!(
				target: LOG_TARGET,
				?leaf_hash,
				ancestor = ?hash,
				session,
				leaf_session,
				"Ancestry ends at a session boundary",
			);
			break
		}

		ancestry.push(info);
	}

	Ok(ancestry)
}

async fn fetch_block_header_with_cache<Sender>(
	sender: &Sender,
	headers: &mut HashMap<Hash, Header>,
	hash: Hash,
) -> Result<Option<Header>>
where
	Sender: ChainApi,
{
	if let Some(header) = headers.get(&hash) {
		return Ok(Some(header.clone()))
	}

	let header = sender.block_header(hash).await?;
	if let Some(header) = &header {
		headers.insert(hash, header.clone());
	}
	Ok(header)
}

async fn fetch_block_info<Sender>(
	sender: &Sender,
	headers: &mut HashMap<Hash, Header>,
	hash: Hash,
) -> Result<Option<BlockInfo>>
where
	Sender: ChainApi,
{
	let header = fetch_block_header_with_cache(sender, headers, hash).await?;
	Ok(header.map(|header| BlockInfo {
		hash,
		number: header.number,
		parent_hash: header.parent_hash,
		storage_root: header.state_root,
	}))
}
