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

use crate::{
	inclusion_emulator::RelayChainBlockInfo,
	primitives::{BlockNumber, Hash},
};

use std::collections::HashMap;

/// The number of blocks below an active leaf that are always retained in the view, even if no
/// para allows them as a relay parent any more.
pub const MINIMUM_RETAIN_LENGTH: BlockNumber = 2;

/// Handles the implicit view of the relay chain derived from the immediate view, which
/// is composed of active leaves, and the minimum relay-parents allowed for
/// candidates of various parachains at those leaves.
#[derive(Default, Clone)]
pub struct View {
	leaves: HashMap<Hash, ActiveLeafPruningInfo>,
	block_info_storage: HashMap<Hash, BlockInfo>,
}

/// Block info used by the prospective-parachains subsystem when it activates a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfoProspectiveParachains {
	/// The hash of the relay-chain block.
	pub hash: Hash,
	/// The hash of the parent relay-chain block.
	pub parent_hash: Hash,
	/// The number of the relay-chain block.
	pub number: BlockNumber,
	/// The storage-root of the relay-chain block.
	pub storage_root: Hash,
}

impl From<BlockInfoProspectiveParachains> for RelayChainBlockInfo {
	fn from(value: BlockInfoProspectiveParachains) -> Self {
		Self { hash: value.hash, number: value.number, storage_root: value.storage_root }
	}
}

// Allowed relay parents implicitly relative to a particular block.
#[derive(Debug, Clone)]
struct AllowedRelayParents {
	// Ancestry, in descending order, starting from the block hash itself down
	// to and including the oldest allowed relay parent.
	allowed_relay_parents_contiguous: Vec<Hash>,
}

#[derive(Debug, Clone)]
struct ActiveLeafPruningInfo {
	// The minimum block in the same branch of the relay-chain that should be
	// preserved.
	retain_minimum: BlockNumber,
}

#[derive(Debug, Clone)]
struct BlockInfo {
	block_number: BlockNumber,
	// If this was previously an active leaf, this will be `Some`
	// and is useful for understanding the views of peers in the network
	// which may not be in perfect synchrony with our own view.
	maybe_allowed_relay_parents: Option<AllowedRelayParents>,
	parent_hash: Hash,
}

impl View {
	/// Get an iterator over active leaves in the view.
	pub fn leaves(&self) -> impl Iterator<Item = &Hash> {
		self.leaves.keys()
	}

	/// Activate a leaf in the view, with the ancestry already resolved by the caller.
	///
	/// `ancestors` must be in descending order, starting with the parent of `leaf`. Activating a
	/// leaf which is already active is a no-op.
	pub fn activate_leaf_from_prospective_parachains(
		&mut self,
		leaf: BlockInfoProspectiveParachains,
		ancestors: &[BlockInfoProspectiveParachains],
	) {
		if self.leaves.contains_key(&leaf.hash) {
			return
		}

		// Retain at least `MINIMUM_RETAIN_LENGTH` blocks in storage.
		// This helps to avoid Chain API calls when activating leaves in the
		// same chain.
		let retain_minimum = std::cmp::min(
			ancestors.last().map(|a| a.number).unwrap_or(0),
			leaf.number.saturating_sub(MINIMUM_RETAIN_LENGTH),
		);

		self.leaves.insert(leaf.hash, ActiveLeafPruningInfo { retain_minimum });

		let mut allowed_relay_parents = AllowedRelayParents {
			allowed_relay_parents_contiguous: Vec::with_capacity(ancestors.len() + 1),
		};

		allowed_relay_parents.allowed_relay_parents_contiguous.push(leaf.hash);

		for ancestor in ancestors {
			self.block_info_storage.insert(
				ancestor.hash,
				BlockInfo {
					block_number: ancestor.number,
					maybe_allowed_relay_parents: None,
					parent_hash: ancestor.parent_hash,
				},
			);
			allowed_relay_parents.allowed_relay_parents_contiguous.push(ancestor.hash);
		}

		self.block_info_storage.insert(
			leaf.hash,
			BlockInfo {
				block_number: leaf.number,
				maybe_allowed_relay_parents: Some(allowed_relay_parents),
				parent_hash: leaf.parent_hash,
			},
		);
	}

	/// Deactivate a leaf in the view. This prunes any outdated implicit ancestors as well.
	///
	/// Returns hashes of blocks pruned from storage.
	pub fn deactivate_leaf(&mut self, leaf_hash: Hash) -> Vec<Hash> {
		let mut removed = Vec::new();

		if self.leaves.remove(&leaf_hash).is_none() {
			return removed
		}

		// Prune everything before the minimum out of all leaves,
		// pruning absolutely everything if there are no leaves (empty view)
		//
		// Pruning by block number does leave behind orphaned forks slightly longer
		// but the memory overhead is negligible.
		{
			let minimum = self.leaves.values().map(|l| l.retain_minimum).min();

			self.block_info_storage.retain(|hash, i| {
				let keep = minimum.map_or(false, |m| i.block_number >= m);
				if !keep {
					removed.push(*hash);
				}
				keep
			});

			removed
		}
	}

	/// Get all allowed relay-parents in the view with no particular order.
	///
	/// **Important**: not all blocks are guaranteed to be allowed for some leaves, it may
	/// happen that a block info is only kept in the view storage because of a retaining rule.
	///
	/// For getting relay-parents that are valid for parachain candidates use
	/// [`View::known_allowed_relay_parents_under`].
	pub fn all_allowed_relay_parents(&self) -> impl Iterator<Item = &Hash> {
		self.block_info_storage.keys()
	}

	/// Get the known, allowed relay-parents that are valid for parachain candidates
	/// which could be backed in a child of a given block.
	///
	/// This is expressed as a contiguous slice of relay-chain block hashes which
	/// includes the provided block hash itself.
	///
	/// `None` indicates that the block hash isn't part of the implicit view or that
	/// it was never an active leaf.
	pub fn known_allowed_relay_parents_under(&self, block_hash: &Hash) -> Option<&[Hash]> {
		let block_info = self.block_info_storage.get(block_hash)?;
		block_info
			.maybe_allowed_relay_parents
			.as_ref()
			.map(|allowed| &allowed.allowed_relay_parents_contiguous[..])
	}

	/// The parent of a block known to the view.
	pub fn parent_hash(&self, block_hash: &Hash) -> Option<Hash> {
		self.block_info_storage.get(block_hash).map(|info| info.parent_hash)
	}
}
