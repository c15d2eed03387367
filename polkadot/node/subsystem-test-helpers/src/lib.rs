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

//! Utilities for testing the asynchronous backing subsystems.

#![warn(missing_docs)]

use async_backing_primitives::{
	async_backing::{Constraints, InboundHrmpLimitations},
	BlockNumber, CandidateCommitments, CandidateDescriptor, CandidateHash, CollatorId,
	CommittedCandidateReceipt, Hash, HeadData, Id as ParaId, PersistedValidationData,
	ValidationCodeHash,
};
use async_backing_subsystem_util::messages::ActivatedLeaf;

pub mod mock;

pub use mock::MockRuntime;

/// The storage root every mocked relay-chain block reports.
pub const RELAY_STORAGE_ROOT: Hash = Hash::repeat_byte(69);

/// The `max_pov_size` the builders use.
pub const MAX_POV_SIZE: u32 = 1_000_000;

/// The validation code hash the builders use.
pub fn dummy_validation_code_hash() -> ValidationCodeHash {
	Hash::repeat_byte(42).into()
}

/// Create a meaningless collator id.
pub fn dummy_collator() -> CollatorId {
	CollatorId::from_raw([0; 32])
}

/// Create a meaningless hash.
pub fn dummy_hash() -> Hash {
	Hash::zero()
}

/// Create a candidate hash out of a single repeated byte.
pub fn candidate_hash(byte: u8) -> CandidateHash {
	CandidateHash(Hash::repeat_byte(byte))
}

/// Create a new leaf with the given hash and number.
pub fn new_leaf(hash: Hash, number: BlockNumber) -> ActivatedLeaf {
	ActivatedLeaf { hash, number }
}

/// Create runtime constraints with generous limits.
pub fn make_constraints(
	min_relay_parent_number: BlockNumber,
	valid_watermarks: Vec<BlockNumber>,
	required_parent: HeadData,
) -> Constraints {
	Constraints {
		min_relay_parent_number,
		max_pov_size: MAX_POV_SIZE,
		max_code_size: 1_000_000,
		ump_remaining: 10,
		ump_remaining_bytes: 1_000,
		max_ump_num_per_candidate: 10,
		dmp_remaining_messages: vec![],
		hrmp_inbound: InboundHrmpLimitations { valid_watermarks },
		hrmp_channels_out: vec![],
		max_hrmp_num_per_candidate: 0,
		required_parent,
		validation_code_hash: dummy_validation_code_hash(),
		upgrade_restriction: None,
		future_validation_code: None,
	}
}

/// Create a committed candidate receipt along with the persisted validation data it was built
/// with. The HRMP watermark is set to the relay parent number.
pub fn make_candidate(
	relay_parent_hash: Hash,
	relay_parent_number: BlockNumber,
	para_id: ParaId,
	parent_head: HeadData,
	head_data: HeadData,
	validation_code_hash: ValidationCodeHash,
) -> (CommittedCandidateReceipt, PersistedValidationData) {
	let pvd = PersistedValidationData {
		parent_head,
		relay_parent_number,
		relay_parent_storage_root: RELAY_STORAGE_ROOT,
		max_pov_size: MAX_POV_SIZE,
	};

	let candidate = CommittedCandidateReceipt {
		descriptor: CandidateDescriptor {
			para_id,
			relay_parent: relay_parent_hash,
			collator: dummy_collator(),
			persisted_validation_data_hash: pvd.hash(),
			pov_hash: Hash::repeat_byte(1),
			erasure_root: Hash::repeat_byte(1),
			para_head: head_data.hash(),
			validation_code_hash,
		},
		commitments: CandidateCommitments {
			upward_messages: Default::default(),
			horizontal_messages: Default::default(),
			new_validation_code: None,
			head_data,
			processed_downward_messages: 0,
			hrmp_watermark: relay_parent_number,
		},
	};

	(candidate, pvd)
}
