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

//! Primitives shared by the asynchronous backing subsystems of the node.
//!
//! These mirror the relay-chain runtime types the subsystems consume. Everything here is
//! SCALE-encodable; hashing uses BLAKE2-256 throughout.

#![warn(missing_docs)]

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_core::{hashing::blake2_256, RuntimeDebug};
use std::collections::{BTreeMap, VecDeque};

pub use sp_core::H256;

pub mod async_backing;

pub use async_backing::{
	AsyncBackingParams, BackingState, CandidatePendingAvailability, Constraints,
	InboundHrmpLimitations, OutboundHrmpChannelLimitations,
};

/// A hash of a relay-chain block, of head-data or of any other hashed object.
pub type Hash = H256;

/// Relay-chain block number.
pub type BlockNumber = u32;

/// Index of a session.
pub type SessionIndex = u32;

/// Identity of a collator.
pub type CollatorId = sp_core::sr25519::Public;

/// Unique identifier of a parachain.
#[derive(
	Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo, RuntimeDebug,
)]
pub struct Id(u32);

impl From<u32> for Id {
	fn from(x: u32) -> Self {
		Id(x)
	}
}

impl From<Id> for u32 {
	fn from(x: Id) -> Self {
		x.0
	}
}

impl std::fmt::Display for Id {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The index of an availability core.
#[derive(
	Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo, RuntimeDebug,
)]
pub struct CoreIndex(pub u32);

impl From<u32> for CoreIndex {
	fn from(i: u32) -> CoreIndex {
		CoreIndex(i)
	}
}

/// Parachain head data included in the relay chain.
#[derive(Clone, Default, PartialEq, Eq, Hash, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct HeadData(pub Vec<u8>);

impl HeadData {
	/// Returns the hash of this head data.
	pub fn hash(&self) -> Hash {
		blake2_256(&self.0).into()
	}
}

impl From<Vec<u8>> for HeadData {
	fn from(v: Vec<u8>) -> Self {
		HeadData(v)
	}
}

/// Parachain validation code.
#[derive(Clone, Default, PartialEq, Eq, Hash, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct ValidationCode(pub Vec<u8>);

impl ValidationCode {
	/// Get the blake2-256 hash of the validation code bytes.
	pub fn hash(&self) -> ValidationCodeHash {
		ValidationCodeHash(blake2_256(&self.0).into())
	}
}

impl From<Vec<u8>> for ValidationCode {
	fn from(v: Vec<u8>) -> Self {
		ValidationCode(v)
	}
}

/// Unit type wrapper around [`type@Hash`] that represents a validation code hash.
#[derive(
	Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo, RuntimeDebug,
)]
pub struct ValidationCodeHash(Hash);

impl From<Hash> for ValidationCodeHash {
	fn from(hash: Hash) -> ValidationCodeHash {
		ValidationCodeHash(hash)
	}
}

impl From<[u8; 32]> for ValidationCodeHash {
	fn from(hash: [u8; 32]) -> ValidationCodeHash {
		ValidationCodeHash(hash.into())
	}
}

/// Unit type wrapper around [`type@Hash`] that represents a candidate hash.
///
/// This type is produced by [`CandidateReceipt::hash`].
#[derive(
	Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo, RuntimeDebug,
)]
pub struct CandidateHash(pub Hash);

impl std::ops::Deref for CandidateHash {
	type Target = Hash;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl std::fmt::Display for CandidateHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

/// A relay-chain block header, reduced to the fields the node-side logic needs.
#[derive(Clone, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Header {
	/// The parent hash.
	pub parent_hash: Hash,
	/// The block number.
	#[codec(compact)]
	pub number: BlockNumber,
	/// The state trie merkle root.
	pub state_root: Hash,
	/// The merkle root of the extrinsics.
	pub extrinsics_root: Hash,
}

impl Header {
	/// Returns the hash of the header.
	pub fn hash(&self) -> Hash {
		blake2_256(&self.encode()).into()
	}
}

/// Upgrade restriction signalled by the relay chain.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub enum UpgradeRestriction {
	/// There is an upgrade restriction and there are no details about its specifics nor how long
	/// it could last.
	#[codec(index = 0)]
	Present,
}

/// An HRMP message seen from the perspective of a sender.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct OutboundHrmpMessage {
	/// The para that will get this message in its downward message queue.
	pub recipient: Id,
	/// The message payload.
	pub data: Vec<u8>,
}

/// Separator between regular UMP messages and the UMP signals trailing them.
pub const UMP_SEPARATOR: Vec<u8> = Vec::new();

/// Utility function for skipping the UMP signals.
pub fn skip_ump_signals<'a>(
	upward_messages: impl Iterator<Item = &'a Vec<u8>>,
) -> impl Iterator<Item = &'a Vec<u8>> {
	upward_messages.take_while(|message| *message != &UMP_SEPARATOR)
}

/// Commitments made in a `CandidateReceipt`. Many of these are outputs of validation.
#[derive(Clone, Default, PartialEq, Eq, Hash, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CandidateCommitments {
	/// Messages destined to be interpreted by the Relay chain itself.
	pub upward_messages: Vec<Vec<u8>>,
	/// Horizontal messages sent by the parachain.
	pub horizontal_messages: Vec<OutboundHrmpMessage>,
	/// New validation code.
	pub new_validation_code: Option<ValidationCode>,
	/// The head-data produced as a result of execution.
	pub head_data: HeadData,
	/// The number of messages processed from the DMQ.
	pub processed_downward_messages: u32,
	/// The mark which specifies the block number up to which all inbound HRMP messages are
	/// processed.
	pub hrmp_watermark: BlockNumber,
}

impl CandidateCommitments {
	/// Compute the blake2-256 hash of the commitments.
	pub fn hash(&self) -> Hash {
		blake2_256(&self.encode()).into()
	}
}

/// A unique descriptor of the candidate receipt.
#[derive(Clone, PartialEq, Eq, Hash, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CandidateDescriptor {
	/// The ID of the para this is a candidate for.
	pub para_id: Id,
	/// The hash of the relay-chain block this is executed in the context of.
	pub relay_parent: Hash,
	/// The collator's sr25519 public key.
	pub collator: CollatorId,
	/// The blake2-256 hash of the persisted validation data.
	pub persisted_validation_data_hash: Hash,
	/// The blake2-256 hash of the PoV.
	pub pov_hash: Hash,
	/// The root of a block's erasure encoding Merkle tree.
	pub erasure_root: Hash,
	/// Hash of the para header that is being generated by this candidate.
	pub para_head: Hash,
	/// The blake2-256 hash of the validation code bytes.
	pub validation_code_hash: ValidationCodeHash,
}

/// A candidate-receipt.
#[derive(Clone, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CandidateReceipt {
	/// The descriptor of the candidate.
	pub descriptor: CandidateDescriptor,
	/// The hash of the encoded commitments made as a result of candidate execution.
	pub commitments_hash: Hash,
}

impl CandidateReceipt {
	/// Get a reference to the candidate descriptor.
	pub fn descriptor(&self) -> &CandidateDescriptor {
		&self.descriptor
	}

	/// Computes the blake2-256 hash of the receipt.
	pub fn hash(&self) -> CandidateHash {
		CandidateHash(blake2_256(&self.encode()).into())
	}
}

/// A candidate-receipt with commitments directly included.
#[derive(Clone, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CommittedCandidateReceipt {
	/// The descriptor of the candidate.
	pub descriptor: CandidateDescriptor,
	/// The commitments of the candidate receipt.
	pub commitments: CandidateCommitments,
}

impl CommittedCandidateReceipt {
	/// Get a reference to the candidate descriptor.
	pub fn descriptor(&self) -> &CandidateDescriptor {
		&self.descriptor
	}

	/// Transforms this into a plain `CandidateReceipt`.
	pub fn to_plain(&self) -> CandidateReceipt {
		CandidateReceipt {
			descriptor: self.descriptor.clone(),
			commitments_hash: self.commitments.hash(),
		}
	}

	/// Computes the hash of the committed candidate receipt.
	///
	/// This computes the canonical hash, not the hash of the directly encoded data.
	/// Thus this is a shortcut for `candidate.to_plain().hash()`.
	pub fn hash(&self) -> CandidateHash {
		self.to_plain().hash()
	}
}

/// The validation data which is persisted for every candidate of a parachain.
#[derive(Clone, Default, PartialEq, Eq, Hash, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct PersistedValidationData {
	/// The parent head-data.
	pub parent_head: HeadData,
	/// The relay-chain block number this is in the context of.
	pub relay_parent_number: BlockNumber,
	/// The relay-chain block storage root this is in the context of.
	pub relay_parent_storage_root: Hash,
	/// The maximum legal size of a POV block, in bytes.
	pub max_pov_size: u32,
}

impl PersistedValidationData {
	/// Compute the blake2-256 hash of the persisted validation data.
	pub fn hash(&self) -> Hash {
		blake2_256(&self.encode()).into()
	}
}

/// Information about a core which is currently occupied.
#[derive(Clone, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct OccupiedCore {
	/// If this core is freed by availability, this is the assignment that is next up on this
	/// core, if any. None if there is nothing queued for this core.
	pub next_up_on_available: Option<ScheduledCore>,
	/// If this core is freed by being timed-out, this is the assignment that is next up on this
	/// core. None if there is nothing queued for this core or there is no possibility of timing
	/// out.
	pub next_up_on_time_out: Option<ScheduledCore>,
	/// The hash of the candidate occupying the core.
	pub candidate_hash: CandidateHash,
	/// The para occupying the core.
	pub para_id: Id,
}

/// Information about a core which is currently scheduled.
#[derive(Clone, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct ScheduledCore {
	/// The ID of a para scheduled.
	pub para_id: Id,
	/// The collator required to author the block, if any.
	pub collator: Option<CollatorId>,
}

/// The state of a particular availability core.
#[derive(Clone, PartialEq, Eq, Encode, Decode, TypeInfo, RuntimeDebug)]
pub enum CoreState {
	/// The core is currently occupied.
	#[codec(index = 0)]
	Occupied(OccupiedCore),
	/// The core is currently free, with a para scheduled and given the opportunity
	/// to occupy.
	#[codec(index = 1)]
	Scheduled(ScheduledCore),
	/// The core is currently free and there is nothing scheduled.
	#[codec(index = 2)]
	Free,
}

impl CoreState {
	/// Returns the scheduled `ParaId` for the core or `None` if nothing is scheduled.
	pub fn para_id(&self) -> Option<Id> {
		match self {
			Self::Occupied(ref core) => Some(core.para_id),
			Self::Scheduled(ScheduledCore { para_id, .. }) => Some(*para_id),
			Self::Free => None,
		}
	}

	/// Is this core state `Self::Occupied`?
	pub fn is_occupied(&self) -> bool {
		matches!(self, Self::Occupied(_))
	}
}

/// The claim queue as reported by the runtime: the paras assigned to each core, in order.
pub type ClaimQueue = BTreeMap<CoreIndex, VecDeque<Id>>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn committed_receipt_hashes_like_plain_receipt() {
		let committed = CommittedCandidateReceipt {
			descriptor: CandidateDescriptor {
				para_id: 5.into(),
				relay_parent: Hash::repeat_byte(1),
				collator: CollatorId::from_raw([2; 32]),
				persisted_validation_data_hash: Hash::repeat_byte(3),
				pov_hash: Hash::repeat_byte(4),
				erasure_root: Hash::repeat_byte(5),
				para_head: Hash::repeat_byte(6),
				validation_code_hash: Hash::repeat_byte(7).into(),
			},
			commitments: CandidateCommitments {
				head_data: HeadData(vec![1, 2, 3]),
				..Default::default()
			},
		};

		assert_eq!(committed.hash(), committed.to_plain().hash());
		assert_eq!(committed.to_plain().commitments_hash, committed.commitments.hash());
	}

	#[test]
	fn candidate_hash_derefs_to_hash() {
		let candidate_hash = CandidateHash(Hash::repeat_byte(9));
		let hash: &Hash = &candidate_hash;
		assert_eq!(hash, &Hash::repeat_byte(9));
		assert_eq!(candidate_hash.to_low_u64_be(), Hash::repeat_byte(9).to_low_u64_be());
	}

	#[test]
	fn ump_signals_are_skipped() {
		let messages = vec![vec![1], vec![2, 2], UMP_SEPARATOR, vec![9, 9, 9]];
		let regular: Vec<_> = skip_ump_signals(messages.iter()).collect();
		assert_eq!(regular, vec![&vec![1], &vec![2, 2]]);
	}

	#[test]
	fn head_data_hash_is_blake2() {
		let head = HeadData(vec![42; 10]);
		assert_eq!(head.hash(), Hash::from(blake2_256(&[42; 10])));
	}
}
