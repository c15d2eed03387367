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

use super::*;
use crate::primitives::{OutboundHrmpMessage, ValidationCode};
use assert_matches::assert_matches;
use rstest::rstest;

fn make_constraints() -> Constraints {
	let para_a = ParaId::from(1);
	Constraints {
		min_relay_parent_number: 5,
		max_pov_size: 1000,
		max_code_size: 1000,
		ump_remaining: 10,
		ump_remaining_bytes: 1024,
		max_ump_num_per_candidate: 5,
		dmp_remaining_messages: Vec::new(),
		hrmp_inbound: InboundHrmpLimitations { valid_watermarks: vec![6, 8] },
		hrmp_channels_out: {
			let mut map = HashMap::new();
			map.insert(
				para_a,
				OutboundHrmpChannelLimitations { messages_remaining: 5, bytes_remaining: 512 },
			);
			map
		},
		max_hrmp_num_per_candidate: 5,
		required_parent: HeadData::from(vec![1, 2, 3]),
		validation_code_hash: ValidationCode(vec![4, 5, 6]).hash(),
		upgrade_restriction: None,
		future_validation_code: None,
	}
}

fn make_relay_parent(number: BlockNumber) -> RelayChainBlockInfo {
	RelayChainBlockInfo {
		number,
		hash: Hash::repeat_byte(number as u8),
		storage_root: Hash::repeat_byte(0xff),
	}
}

fn make_candidate(constraints: &Constraints, relay_parent: &RelayChainBlockInfo) -> ProspectiveCandidate {
	ProspectiveCandidate {
		commitments: CandidateCommitments {
			upward_messages: Vec::new(),
			horizontal_messages: Vec::new(),
			new_validation_code: None,
			head_data: HeadData::from(vec![1, 2, 3, 4, 5]),
			processed_downward_messages: 0,
			hrmp_watermark: relay_parent.number,
		},
		persisted_validation_data: PersistedValidationData {
			parent_head: constraints.required_parent.clone(),
			relay_parent_number: relay_parent.number,
			relay_parent_storage_root: relay_parent.storage_root,
			max_pov_size: constraints.max_pov_size as u32,
		},
		pov_hash: Hash::repeat_byte(1),
		validation_code_hash: constraints.validation_code_hash,
	}
}

#[test]
fn stack_modifications() {
	let para_a = ParaId::from(1u32);
	let para_b = ParaId::from(2u32);
	let para_c = ParaId::from(3u32);

	let a = ConstraintModifications {
		required_parent: None,
		hrmp_watermark: None,
		outbound_hrmp: {
			let mut map = HashMap::new();
			map.insert(
				para_a,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			);
			map.insert(
				para_b,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			);
			map
		},
		ump_messages_sent: 6,
		ump_bytes_sent: 1000,
		dmp_messages_processed: 5,
		code_upgrade_applied: true,
	};

	let b = ConstraintModifications {
		required_parent: None,
		hrmp_watermark: None,
		outbound_hrmp: {
			let mut map = HashMap::new();
			map.insert(
				para_b,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			);
			map.insert(
				para_c,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			);
			map
		},
		ump_messages_sent: 6,
		ump_bytes_sent: 1000,
		dmp_messages_processed: 5,
		code_upgrade_applied: true,
	};

	let mut c = a.clone();
	c.stack(&b);

	assert_eq!(
		c,
		ConstraintModifications {
			required_parent: None,
			hrmp_watermark: None,
			outbound_hrmp: {
				let mut map = HashMap::new();
				map.insert(
					para_a,
					OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
				);
				map.insert(
					para_b,
					OutboundHrmpChannelModification {
						bytes_submitted: 200,
						messages_submitted: 10,
					},
				);
				map.insert(
					para_c,
					OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
				);
				map
			},
			ump_messages_sent: 12,
			ump_bytes_sent: 2000,
			dmp_messages_processed: 10,
			code_upgrade_applied: true,
		},
	);

	let mut d = ConstraintModifications::identity();
	d.stack(&a);
	d.stack(&b);

	assert_eq!(c, d);
}

#[test]
fn identity_modifications_leave_constraints_untouched() {
	let constraints = make_constraints();
	let identity = ConstraintModifications::identity();

	assert_eq!(constraints.check_modifications(&identity), Ok(()));
	assert_eq!(constraints.apply_modifications(&identity), Ok(constraints));
}

#[test]
fn apply_modifications_does_not_mutate_original() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.required_parent = Some(HeadData::from(vec![9, 9]));
	modifications.ump_messages_sent = 3;
	modifications.ump_bytes_sent = 100;

	let new_constraints = constraints.apply_modifications(&modifications).unwrap();

	assert_eq!(new_constraints.required_parent, HeadData::from(vec![9, 9]));
	assert_eq!(new_constraints.ump_remaining, 7);
	assert_eq!(new_constraints.ump_remaining_bytes, 924);

	assert_eq!(constraints, make_constraints());
}

#[test]
fn constraints_disallowed_trunk_watermark() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Trunk(7));

	assert_matches!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::DisallowedHrmpWatermark(7))
	);

	assert_matches!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::DisallowedHrmpWatermark(7))
	);
}

#[rstest]
#[case(HrmpWatermarkUpdate::Head(7), vec![8])]
#[case(HrmpWatermarkUpdate::Head(6), vec![8])]
#[case(HrmpWatermarkUpdate::Head(9), vec![])]
#[case(HrmpWatermarkUpdate::Trunk(6), vec![8])]
#[case(HrmpWatermarkUpdate::Trunk(8), vec![])]
fn constraints_watermark_prunes_valid_watermarks(
	#[case] update: HrmpWatermarkUpdate,
	#[case] expected: Vec<BlockNumber>,
) {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.hrmp_watermark = Some(update);

	assert_eq!(constraints.check_modifications(&modifications), Ok(()));
	let new_constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(new_constraints.hrmp_inbound.valid_watermarks, expected);
}

#[test]
fn trunk_watermark_cannot_move_backwards() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Trunk(8));
	let new_constraints = constraints.apply_modifications(&modifications).unwrap();

	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Trunk(6));
	assert_matches!(
		new_constraints.apply_modifications(&modifications),
		Err(ModificationError::DisallowedHrmpWatermark(6))
	);
}

#[test]
fn constraints_no_such_hrmp_channel() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let bad_para = ParaId::from(100);
	modifications.outbound_hrmp.insert(
		bad_para,
		OutboundHrmpChannelModification { bytes_submitted: 0, messages_submitted: 0 },
	);

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::NoSuchHrmpChannel(bad_para)),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::NoSuchHrmpChannel(bad_para)),
	);
}

#[test]
fn constraints_hrmp_messages_overflow() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let para_a = ParaId::from(1);
	modifications.outbound_hrmp.insert(
		para_a,
		OutboundHrmpChannelModification { bytes_submitted: 0, messages_submitted: 6 },
	);

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::HrmpMessagesOverflow {
			para_id: para_a,
			messages_remaining: 5,
			messages_submitted: 6,
		}),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::HrmpMessagesOverflow {
			para_id: para_a,
			messages_remaining: 5,
			messages_submitted: 6,
		}),
	);
}

#[test]
fn constraints_hrmp_bytes_overflow() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let para_a = ParaId::from(1);
	modifications.outbound_hrmp.insert(
		para_a,
		OutboundHrmpChannelModification { bytes_submitted: 513, messages_submitted: 1 },
	);

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::HrmpBytesOverflow {
			para_id: para_a,
			bytes_remaining: 512,
			bytes_submitted: 513,
		}),
	);
}

#[test]
fn constraints_ump_overflow() {
	let constraints = make_constraints();

	let mut modifications = ConstraintModifications::identity();
	modifications.ump_messages_sent = 11;
	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::UmpMessagesOverflow {
			messages_remaining: 10,
			messages_submitted: 11,
		}),
	);

	let mut modifications = ConstraintModifications::identity();
	modifications.ump_bytes_sent = 1025;
	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::UmpBytesOverflow { bytes_remaining: 1024, bytes_submitted: 1025 }),
	);
}

#[test]
fn constraints_dmp_messages() {
	let mut constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	assert_eq!(constraints.check_modifications(&modifications), Ok(()));

	modifications.dmp_messages_processed = 6;
	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::DmpMessagesUnderflow {
			messages_remaining: 0,
			messages_processed: 6,
		}),
	);

	constraints.dmp_remaining_messages = vec![1, 4, 8, 10];
	modifications.dmp_messages_processed = 2;
	assert_eq!(constraints.check_modifications(&modifications), Ok(()));
	let constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(constraints.dmp_remaining_messages, vec![8, 10]);
}

#[test]
fn constraints_nonexistent_code_upgrade() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.code_upgrade_applied = true;

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::AppliedNonexistentCodeUpgrade),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::AppliedNonexistentCodeUpgrade),
	);
}

#[test]
fn code_upgrade_is_consumed() {
	let mut constraints = make_constraints();
	let new_code_hash = ValidationCode(vec![7, 7, 7]).hash();
	constraints.future_validation_code = Some((10, new_code_hash));

	let mut modifications = ConstraintModifications::identity();
	modifications.code_upgrade_applied = true;

	let new_constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(new_constraints.validation_code_hash, new_code_hash);
	assert_eq!(new_constraints.future_validation_code, None);
}

#[test]
fn fragment_validity_happy_path() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let candidate = make_candidate(&constraints, &relay_parent);

	let fragment =
		Fragment::new(relay_parent.clone(), constraints.clone(), Arc::new(candidate)).unwrap();

	assert_eq!(fragment.relay_parent(), &relay_parent);
	assert_eq!(
		fragment.constraint_modifications().required_parent,
		Some(HeadData::from(vec![1, 2, 3, 4, 5]))
	);
	assert_eq!(
		fragment.constraint_modifications().hrmp_watermark,
		Some(HrmpWatermarkUpdate::Head(6))
	);
}

#[test]
fn fragment_trunk_watermark_when_behind_relay_parent() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(9);
	let mut candidate = make_candidate(&constraints, &relay_parent);
	candidate.commitments.hrmp_watermark = 8;

	let fragment = Fragment::new(relay_parent, constraints, Arc::new(candidate)).unwrap();
	assert_eq!(
		fragment.constraint_modifications().hrmp_watermark,
		Some(HrmpWatermarkUpdate::Trunk(8))
	);
}

#[test]
fn fragment_validation_code_mismatch() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let expected_code = constraints.validation_code_hash;
	let got_code = ValidationCode(vec![9, 9, 9]).hash();
	candidate.validation_code_hash = got_code;

	assert_eq!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::ValidationCodeMismatch(expected_code, got_code)),
	)
}

#[test]
fn fragment_pvd_mismatch() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let relay_parent_b = make_relay_parent(7);
	let candidate = make_candidate(&constraints, &relay_parent);

	let expected_pvd = PersistedValidationData {
		parent_head: constraints.required_parent.clone(),
		relay_parent_number: relay_parent_b.number,
		relay_parent_storage_root: relay_parent_b.storage_root,
		max_pov_size: constraints.max_pov_size as u32,
	};
	let got_pvd = candidate.persisted_validation_data.clone();

	assert_eq!(
		Fragment::new(relay_parent_b, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::PersistedValidationDataMismatch(expected_pvd, got_pvd)),
	);
}

#[test]
fn fragment_code_size_too_large() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let max_code_size = constraints.max_code_size;
	candidate.commitments.new_validation_code = Some(vec![0; max_code_size + 1].into());

	assert_eq!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::CodeSizeTooLarge(max_code_size, max_code_size + 1)),
	);
}

#[test]
fn fragment_relay_parent_too_old() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(3);
	let candidate = make_candidate(&constraints, &relay_parent);

	assert_eq!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::RelayParentTooOld(5, 3)),
	);
}

#[test]
fn fragment_hrmp_messages_overflow() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let max_hrmp = constraints.max_hrmp_num_per_candidate;

	candidate.commitments.horizontal_messages.extend((0..max_hrmp + 1).map(|i| {
		OutboundHrmpMessage { recipient: ParaId::from(i as u32), data: vec![1, 2, 3] }
	}));

	assert_eq!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::HrmpMessagesPerCandidateOverflow {
			messages_allowed: max_hrmp,
			messages_submitted: max_hrmp + 1,
		}),
	);
}

#[test]
fn fragment_dmp_advancement_rule() {
	let mut constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	// Empty dmp queue is ok.
	assert!(Fragment::new(relay_parent.clone(), constraints.clone(), Arc::new(candidate.clone()))
		.is_ok());
	// Unprocessed message that was sent later is ok.
	constraints.dmp_remaining_messages = vec![relay_parent.number + 1];
	assert!(Fragment::new(relay_parent.clone(), constraints.clone(), Arc::new(candidate.clone()))
		.is_ok());

	for block_number in 0..=relay_parent.number {
		constraints.dmp_remaining_messages = vec![block_number];

		assert_eq!(
			Fragment::new(relay_parent.clone(), constraints.clone(), Arc::new(candidate.clone())),
			Err(FragmentValidityError::DmpAdvancementRule),
		);
	}

	candidate.commitments.processed_downward_messages = 1;
	assert!(Fragment::new(relay_parent, constraints, Arc::new(candidate)).is_ok());
}

#[test]
fn fragment_ump_messages_overflow() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let max_ump = constraints.max_ump_num_per_candidate;

	candidate
		.commitments
		.upward_messages
		.extend((0..max_ump + 1).map(|i| vec![i as u8]));

	assert_eq!(
		Fragment::new(relay_parent.clone(), constraints.clone(), Arc::new(candidate.clone())),
		Err(FragmentValidityError::UmpMessagesPerCandidateOverflow {
			messages_allowed: max_ump,
			messages_submitted: max_ump + 1,
		}),
	);

	// Signals after the separator are not counted.
	candidate.commitments.upward_messages.truncate(max_ump);
	candidate.commitments.upward_messages.push(crate::primitives::UMP_SEPARATOR);
	candidate.commitments.upward_messages.push(vec![0xff; 4]);
	candidate.commitments.upward_messages.push(vec![0xfe; 4]);

	let fragment = Fragment::new(relay_parent, constraints, Arc::new(candidate)).unwrap();
	assert_eq!(fragment.constraint_modifications().ump_messages_sent, max_ump);
}

#[test]
fn fragment_code_upgrade_restricted() {
	let mut constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	constraints.upgrade_restriction = Some(UpgradeRestriction::Present);
	candidate.commitments.new_validation_code = Some(ValidationCode(vec![1, 2, 3]));

	assert_eq!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::CodeUpgradeRestricted),
	);
}

#[test]
fn fragment_hrmp_messages_descending_or_duplicate() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);

	candidate.commitments.horizontal_messages = vec![
		OutboundHrmpMessage { recipient: ParaId::from(0 as u32), data: vec![1, 2, 3] },
		OutboundHrmpMessage { recipient: ParaId::from(0 as u32), data: vec![4, 5, 6] },
	];

	assert_eq!(
		Fragment::new(relay_parent.clone(), constraints.clone(), Arc::new(candidate.clone())),
		Err(FragmentValidityError::HrmpMessagesDescendingOrDuplicate(1)),
	);

	candidate.commitments.horizontal_messages = vec![
		OutboundHrmpMessage { recipient: ParaId::from(1 as u32), data: vec![1, 2, 3] },
		OutboundHrmpMessage { recipient: ParaId::from(0 as u32), data: vec![4, 5, 6] },
	];

	assert_eq!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::HrmpMessagesDescendingOrDuplicate(1)),
	);
}

#[test]
fn validate_commitments_ignores_parent() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent(6);
	let mut candidate = make_candidate(&constraints, &relay_parent);
	candidate.persisted_validation_data.parent_head = HeadData::from(vec![0xaa]);

	// The parent mismatch is only caught by the full check.
	assert_eq!(
		validate_commitments(
			&constraints,
			&relay_parent,
			&candidate.commitments,
			&candidate.validation_code_hash,
		),
		Ok(())
	);
	assert_matches!(
		Fragment::new(relay_parent, constraints, Arc::new(candidate)),
		Err(FragmentValidityError::PersistedValidationDataMismatch(_, _))
	);
}

#[test]
fn apply_modifications_spends_every_budget() {
	let mut constraints = make_constraints();
	constraints.dmp_remaining_messages = vec![5, 7];
	let para_a = ParaId::from(1);

	let mut modifications = ConstraintModifications::identity();
	modifications.required_parent = Some(HeadData::from(vec![9]));
	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Head(7));
	modifications.outbound_hrmp.insert(
		para_a,
		OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 2 },
	);
	modifications.ump_messages_sent = 3;
	modifications.ump_bytes_sent = 200;
	modifications.dmp_messages_processed = 1;

	assert_eq!(constraints.check_modifications(&modifications), Ok(()));
	let new_constraints = constraints.apply_modifications(&modifications).unwrap();

	assert_eq!(new_constraints.required_parent, HeadData::from(vec![9]));
	assert_eq!(new_constraints.hrmp_inbound.valid_watermarks, vec![8]);
	assert_eq!(
		new_constraints.hrmp_channels_out.get(&para_a),
		Some(&OutboundHrmpChannelLimitations { messages_remaining: 3, bytes_remaining: 412 }),
	);
	assert_eq!(new_constraints.ump_remaining, 7);
	assert_eq!(new_constraints.ump_remaining_bytes, 824);
	assert_eq!(new_constraints.dmp_remaining_messages, vec![7]);
	assert_eq!(new_constraints.validation_code_hash, constraints.validation_code_hash);
}
