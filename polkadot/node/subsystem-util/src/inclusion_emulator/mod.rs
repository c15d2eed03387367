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

//! Node-side model of the checks the relay chain runtime runs when it includes a parachain
//! candidate.
//!
//! Prospective chains are grown ahead of the relay chain, so the node has to predict whether a
//! candidate will be accepted once it is backed. Two types carry that prediction.
//! [`Constraints`] hold every budget and expectation a para block has to meet at a given relay
//! parent. A [`Fragment`] is one candidate together with the relay parent it is anchored to and
//! the effect its outputs have on those budgets.
//!
//! ## Fragment Validity
//!
//! The constraints of a relay parent describe what a direct child of that relay block may
//! include when nothing is pending availability for the para.
//!
//! Inclusion is decided against the constraints in force when the candidate is included, not
//! when it was built. A fragment built early can therefore fail every check at first and turn
//! valid after a few relay blocks.
//!
//! ## Applying modifications
//!
//! [`Constraints::apply_modifications`] never mutates the constraints it is called on. It
//! returns a new value with every remaining budget decreased, the HRMP watermark moved forward
//! and any pending code upgrade consumed. Older snapshots stay valid, which the fragment chain
//! relies on when it computes the constraints of many hypothetical children at once.

use std::{collections::HashMap, sync::Arc};

use crate::{
	messages::HypotheticalCandidate,
	primitives::{
		async_backing::Constraints as PrimitiveConstraints, skip_ump_signals, BlockNumber,
		CandidateCommitments, CandidateHash, Hash, HeadData, Id as ParaId,
		OutboundHrmpMessage, PersistedValidationData, UpgradeRestriction, ValidationCodeHash,
	},
};

/// Limits on the HRMP messages a para may still receive.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundHrmpLimitations {
	/// Relay block numbers a trunk watermark may land on, in ascending order.
	pub valid_watermarks: Vec<BlockNumber>,
}

/// Space left in one outbound HRMP channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundHrmpChannelLimitations {
	/// Bytes the channel can still take.
	pub bytes_remaining: usize,
	/// Messages the channel can still take.
	pub messages_remaining: usize,
}

impl OutboundHrmpChannelLimitations {
	/// The space left once `sent` has been written to the channel towards `recipient`.
	fn spend(
		&self,
		recipient: ParaId,
		sent: &OutboundHrmpChannelModification,
	) -> Result<Self, ModificationError> {
		let bytes_remaining = self.bytes_remaining.checked_sub(sent.bytes_submitted).ok_or_else(
			|| ModificationError::HrmpBytesOverflow {
				para_id: recipient,
				bytes_remaining: self.bytes_remaining,
				bytes_submitted: sent.bytes_submitted,
			},
		)?;
		let messages_remaining =
			self.messages_remaining.checked_sub(sent.messages_submitted).ok_or_else(|| {
				ModificationError::HrmpMessagesOverflow {
					para_id: recipient,
					messages_remaining: self.messages_remaining,
					messages_submitted: sent.messages_submitted,
				}
			})?;

		Ok(Self { bytes_remaining, messages_remaining })
	}
}

/// What a para block built on a given relay parent has to satisfy.
///
/// A value always belongs to one para; the para is known from where it is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
	/// Oldest relay block number a candidate may use as relay parent.
	pub min_relay_parent_number: BlockNumber,
	/// PoV size limit in bytes.
	pub max_pov_size: usize,
	/// Size limit in bytes for announced validation code.
	pub max_code_size: usize,
	/// Upward messages the para may still queue.
	pub ump_remaining: usize,
	/// Upward message bytes the para may still queue.
	pub ump_remaining_bytes: usize,
	/// Upward messages a single candidate may send.
	pub max_ump_num_per_candidate: usize,
	/// Downward messages waiting for the para, by the relay block they were sent at.
	pub dmp_remaining_messages: Vec<BlockNumber>,
	/// Watermarks the para may move its inbound HRMP watermark to.
	pub hrmp_inbound: InboundHrmpLimitations,
	/// Outbound HRMP channels, by recipient.
	pub hrmp_channels_out: HashMap<ParaId, OutboundHrmpChannelLimitations>,
	/// HRMP messages a single candidate may send.
	pub max_hrmp_num_per_candidate: usize,
	/// Head data the next candidate has to build on.
	pub required_parent: HeadData,
	/// Code hash the next candidate has to be validated with.
	pub validation_code_hash: ValidationCodeHash,
	/// Set while the relay chain refuses a new code upgrade.
	pub upgrade_restriction: Option<UpgradeRestriction>,
	/// Scheduled code upgrade: the relay block number from which it takes effect and the new
	/// code hash.
	pub future_validation_code: Option<(BlockNumber, ValidationCodeHash)>,
}

impl From<PrimitiveConstraints> for Constraints {
	fn from(c: PrimitiveConstraints) -> Self {
		Constraints {
			min_relay_parent_number: c.min_relay_parent_number,
			max_pov_size: c.max_pov_size as _,
			max_code_size: c.max_code_size as _,
			ump_remaining: c.ump_remaining as _,
			ump_remaining_bytes: c.ump_remaining_bytes as _,
			max_ump_num_per_candidate: c.max_ump_num_per_candidate as _,
			dmp_remaining_messages: c.dmp_remaining_messages,
			hrmp_inbound: InboundHrmpLimitations {
				valid_watermarks: c.hrmp_inbound.valid_watermarks,
			},
			hrmp_channels_out: c
				.hrmp_channels_out
				.into_iter()
				.map(|(para_id, limits)| {
					(
						para_id,
						OutboundHrmpChannelLimitations {
							bytes_remaining: limits.bytes_remaining as _,
							messages_remaining: limits.messages_remaining as _,
						},
					)
				})
				.collect(),
			max_hrmp_num_per_candidate: c.max_hrmp_num_per_candidate as _,
			required_parent: c.required_parent,
			validation_code_hash: c.validation_code_hash,
			upgrade_restriction: c.upgrade_restriction,
			future_validation_code: c.future_validation_code,
		}
	}
}

/// Ways in which a set of modifications can overrun some constraints.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModificationError {
	/// A trunk watermark that is not in the list of valid watermarks.
	#[error("DisallowedHrmpWatermark({0})")]
	DisallowedHrmpWatermark(BlockNumber),
	/// Messages were sent to a para with no open outbound channel.
	#[error("NoSuchHrmpChannel({0})")]
	NoSuchHrmpChannel(ParaId),
	/// More messages than an outbound channel can take.
	#[error("HrmpMessagesOverflow(para_id: {para_id}, messages_remaining: {messages_remaining}, messages_submitted: {messages_submitted})")]
	HrmpMessagesOverflow {
		/// Recipient of the channel.
		para_id: ParaId,
		/// Messages the channel could still take.
		messages_remaining: usize,
		/// Messages written to it.
		messages_submitted: usize,
	},
	/// More bytes than an outbound channel can take.
	#[error("HrmpBytesOverflow(para_id: {para_id}, bytes_remaining: {bytes_remaining}, bytes_submitted: {bytes_submitted})")]
	HrmpBytesOverflow {
		/// Recipient of the channel.
		para_id: ParaId,
		/// Bytes the channel could still take.
		bytes_remaining: usize,
		/// Bytes written to it.
		bytes_submitted: usize,
	},
	/// More upward messages than the queue can take.
	#[error("UmpMessagesOverflow(messages_remaining: {messages_remaining}, messages_submitted: {messages_submitted})")]
	UmpMessagesOverflow {
		/// Upward messages that could still be queued.
		messages_remaining: usize,
		/// Upward messages sent.
		messages_submitted: usize,
	},
	/// More upward bytes than the queue can take.
	#[error("UmpBytesOverflow(bytes_remaining: {bytes_remaining}, bytes_submitted: {bytes_submitted})")]
	UmpBytesOverflow {
		/// Upward bytes that could still be queued.
		bytes_remaining: usize,
		/// Upward bytes sent.
		bytes_submitted: usize,
	},
	/// More downward messages were processed than were queued.
	#[error("DmpMessagesUnderflow(messages_remaining: {messages_remaining}, messages_processed: {messages_processed})")]
	DmpMessagesUnderflow {
		/// Length of the downward queue.
		messages_remaining: usize,
		/// Downward messages processed.
		messages_processed: usize,
	},
	/// A code upgrade was applied while none was scheduled.
	#[error("AppliedNonexistentCodeUpgrade()")]
	AppliedNonexistentCodeUpgrade,
}

/// The budgets of some constraints after a set of modifications has been spent.
struct Spent {
	/// Leading valid watermarks that the new watermark passes.
	watermarks_passed: usize,
	/// Updated limits of every channel that was written to.
	hrmp_channels_out: Vec<(ParaId, OutboundHrmpChannelLimitations)>,
	ump_remaining: usize,
	ump_remaining_bytes: usize,
	/// Code hash that becomes current, if a scheduled upgrade is applied.
	upgraded_code: Option<ValidationCodeHash>,
}

impl Constraints {
	/// Check that `modifications` fit into these constraints.
	pub fn check_modifications(
		&self,
		modifications: &ConstraintModifications,
	) -> Result<(), ModificationError> {
		self.spend(modifications).map(|_| ())
	}

	/// The constraints left once `modifications` have been applied. Fails exactly when
	/// [`Self::check_modifications`] fails.
	pub fn apply_modifications(
		&self,
		modifications: &ConstraintModifications,
	) -> Result<Self, ModificationError> {
		let spent = self.spend(modifications)?;
		let mut new = self.clone();

		if let Some(parent) = &modifications.required_parent {
			new.required_parent = parent.clone();
		}
		new.hrmp_inbound.valid_watermarks =
			self.hrmp_inbound.valid_watermarks[spent.watermarks_passed..].to_vec();
		new.hrmp_channels_out.extend(spent.hrmp_channels_out);
		new.ump_remaining = spent.ump_remaining;
		new.ump_remaining_bytes = spent.ump_remaining_bytes;
		new.dmp_remaining_messages =
			self.dmp_remaining_messages[modifications.dmp_messages_processed..].to_vec();
		if let Some(code_hash) = spent.upgraded_code {
			new.validation_code_hash = code_hash;
			new.future_validation_code = None;
		}

		Ok(new)
	}

	fn spend(&self, modifications: &ConstraintModifications) -> Result<Spent, ModificationError> {
		let watermarks = &self.hrmp_inbound.valid_watermarks;
		let watermarks_passed = match modifications.hrmp_watermark {
			None => 0,
			Some(update) => match (watermarks.binary_search(&update.watermark()), update) {
				(Ok(pos), _) => pos + 1,
				(Err(pos), HrmpWatermarkUpdate::Head(_)) => pos,
				(Err(_), HrmpWatermarkUpdate::Trunk(n)) =>
					return Err(ModificationError::DisallowedHrmpWatermark(n)),
			},
		};

		let hrmp_channels_out = modifications
			.outbound_hrmp
			.iter()
			.map(|(recipient, sent)| {
				let channel = self
					.hrmp_channels_out
					.get(recipient)
					.ok_or(ModificationError::NoSuchHrmpChannel(*recipient))?;
				Ok((*recipient, channel.spend(*recipient, sent)?))
			})
			.collect::<Result<Vec<_>, _>>()?;

		let ump_remaining =
			self.ump_remaining.checked_sub(modifications.ump_messages_sent).ok_or_else(|| {
				ModificationError::UmpMessagesOverflow {
					messages_remaining: self.ump_remaining,
					messages_submitted: modifications.ump_messages_sent,
				}
			})?;
		let ump_remaining_bytes =
			self.ump_remaining_bytes.checked_sub(modifications.ump_bytes_sent).ok_or_else(|| {
				ModificationError::UmpBytesOverflow {
					bytes_remaining: self.ump_remaining_bytes,
					bytes_submitted: modifications.ump_bytes_sent,
				}
			})?;

		if modifications.dmp_messages_processed > self.dmp_remaining_messages.len() {
			return Err(ModificationError::DmpMessagesUnderflow {
				messages_remaining: self.dmp_remaining_messages.len(),
				messages_processed: modifications.dmp_messages_processed,
			})
		}

		let upgraded_code = match (modifications.code_upgrade_applied, self.future_validation_code)
		{
			(false, _) => None,
			(true, Some((_, code_hash))) => Some(code_hash),
			(true, None) => return Err(ModificationError::AppliedNonexistentCodeUpgrade),
		};

		Ok(Spent {
			watermarks_passed,
			hrmp_channels_out,
			ump_remaining,
			ump_remaining_bytes,
			upgraded_code,
		})
	}
}

/// A relay chain block as seen by the inclusion emulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayChainBlockInfo {
	/// Block hash.
	pub hash: Hash,
	/// Block number.
	pub number: BlockNumber,
	/// State root of the block, checked against the candidate's validation data.
	pub storage_root: Hash,
}

/// Usage of one outbound HRMP channel by a candidate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundHrmpChannelModification {
	/// Bytes written.
	pub bytes_submitted: usize,
	/// Messages written.
	pub messages_submitted: usize,
}

/// Where a candidate moves the para's HRMP watermark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HrmpWatermarkUpdate {
	/// The watermark is the relay parent number. Always accepted.
	Head(BlockNumber),
	/// The watermark is older than the relay parent. Accepted only on a block where an
	/// inbound message was sent.
	Trunk(BlockNumber),
}

impl HrmpWatermarkUpdate {
	fn watermark(&self) -> BlockNumber {
		match *self {
			HrmpWatermarkUpdate::Head(n) | HrmpWatermarkUpdate::Trunk(n) => n,
		}
	}
}

/// The effect that one or more candidates have on the constraints of their para.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintModifications {
	/// Head data the following candidate has to build on.
	pub required_parent: Option<HeadData>,
	/// Latest watermark update, if any.
	pub hrmp_watermark: Option<HrmpWatermarkUpdate>,
	/// Outbound HRMP usage, by recipient.
	pub outbound_hrmp: HashMap<ParaId, OutboundHrmpChannelModification>,
	/// Upward messages sent, signals excluded.
	pub ump_messages_sent: usize,
	/// Upward bytes sent, signals excluded.
	pub ump_bytes_sent: usize,
	/// Downward messages taken off the queue.
	pub dmp_messages_processed: usize,
	/// Set when the scheduled code upgrade takes effect.
	pub code_upgrade_applied: bool,
}

impl ConstraintModifications {
	/// Modifications that change nothing.
	pub fn identity() -> Self {
		Self {
			required_parent: None,
			hrmp_watermark: None,
			outbound_hrmp: HashMap::new(),
			ump_messages_sent: 0,
			ump_bytes_sent: 0,
			dmp_messages_processed: 0,
			code_upgrade_applied: false,
		}
	}

	/// The modifications of a candidate built on the given relay parent under `constraints`.
	///
	/// Only fails when the horizontal messages are not sorted by strictly increasing recipient.
	fn of_candidate(
		relay_parent: &RelayChainBlockInfo,
		constraints: &Constraints,
		commitments: &CandidateCommitments,
	) -> Result<Self, FragmentValidityError> {
		let hrmp_watermark = if commitments.hrmp_watermark == relay_parent.number {
			HrmpWatermarkUpdate::Head(commitments.hrmp_watermark)
		} else {
			HrmpWatermarkUpdate::Trunk(commitments.hrmp_watermark)
		};
		let code_upgrade_applied = constraints
			.future_validation_code
			.map_or(false, |(at, _)| relay_parent.number >= at);

		Ok(Self {
			required_parent: Some(commitments.head_data.clone()),
			hrmp_watermark: Some(hrmp_watermark),
			outbound_hrmp: outbound_hrmp_usage(&commitments.horizontal_messages)?,
			ump_messages_sent: skip_ump_signals(commitments.upward_messages.iter()).count(),
			ump_bytes_sent: skip_ump_signals(commitments.upward_messages.iter())
				.map(|msg| msg.len())
				.sum(),
			dmp_messages_processed: commitments.processed_downward_messages as _,
			code_upgrade_applied,
		})
	}

	/// Fold `other`, which happens after `self`, into these modifications.
	///
	/// Nothing is validated. Order matters: parent and watermark are taken from `other`.
	pub fn stack(&mut self, other: &Self) {
		if other.required_parent.is_some() {
			self.required_parent = other.required_parent.clone();
		}
		if other.hrmp_watermark.is_some() {
			self.hrmp_watermark = other.hrmp_watermark;
		}

		for (recipient, usage) in &other.outbound_hrmp {
			let total = self.outbound_hrmp.entry(*recipient).or_default();
			total.bytes_submitted += usage.bytes_submitted;
			total.messages_submitted += usage.messages_submitted;
		}

		self.ump_messages_sent += other.ump_messages_sent;
		self.ump_bytes_sent += other.ump_bytes_sent;
		self.dmp_messages_processed += other.dmp_messages_processed;
		self.code_upgrade_applied = self.code_upgrade_applied || other.code_upgrade_applied;
	}
}

/// Per recipient usage of the outbound channels. Recipients must be strictly increasing.
fn outbound_hrmp_usage(
	messages: &[OutboundHrmpMessage],
) -> Result<HashMap<ParaId, OutboundHrmpChannelModification>, FragmentValidityError> {
	if let Some(i) = messages.windows(2).position(|pair| pair[0].recipient >= pair[1].recipient) {
		return Err(FragmentValidityError::HrmpMessagesDescendingOrDuplicate(i + 1))
	}

	let mut usage = HashMap::<ParaId, OutboundHrmpChannelModification>::new();
	for message in messages {
		let channel = usage.entry(message.recipient).or_default();
		channel.messages_submitted += 1;
		channel.bytes_submitted += message.data.len();
	}
	Ok(usage)
}

/// A candidate reduced to what the inclusion checks look at.
///
/// Nothing here ties the candidate to a session, so the same value can be checked against
/// the constraints of any relay parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectiveCandidate {
	/// Outputs of the candidate.
	pub commitments: CandidateCommitments,
	/// Validation data the candidate was built with.
	pub persisted_validation_data: PersistedValidationData,
	/// Hash of the PoV.
	pub pov_hash: Hash,
	/// Code hash the candidate claims to be validated with.
	pub validation_code_hash: ValidationCodeHash,
}

/// Reasons a candidate is not valid under some constraints.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FragmentValidityError {
	/// The candidate's code hash is not the current one.
	///
	/// Expected, Got
	#[error("ValidationCodeMismatch(Expected: {0:?}, Got: {1:?})")]
	ValidationCodeMismatch(ValidationCodeHash, ValidationCodeHash),
	/// The validation data does not match the relay parent and required parent.
	///
	/// Expected, Got
	#[error("PersistedValidationDataMismatch(Expected: {0:?}, Got: {1:?})")]
	PersistedValidationDataMismatch(PersistedValidationData, PersistedValidationData),
	/// The outputs overrun a budget of the constraints.
	#[error("OutputsInvalid({0})")]
	OutputsInvalid(ModificationError),
	/// Announced code exceeds the size limit.
	///
	/// Max allowed, new.
	#[error("CodeSizeTooLarge(Max allowed: {0}, New: {1})")]
	CodeSizeTooLarge(usize, usize),
	/// The relay parent is older than allowed.
	///
	/// Min allowed, current.
	#[error("RelayParentTooOld(Min allowed: {0}, Current: {1})")]
	RelayParentTooOld(BlockNumber, BlockNumber),
	/// A downward message old enough to be processed was left in the queue.
	#[error("DMP advancement rule")]
	DmpAdvancementRule,
	/// More upward messages than one candidate may send.
	#[error("UmpMessagesPerCandidateOverflow(Allowed: {messages_allowed}, Submitted: {messages_submitted})")]
	UmpMessagesPerCandidateOverflow {
		/// Per candidate limit.
		messages_allowed: usize,
		/// Upward messages in the candidate.
		messages_submitted: usize,
	},
	/// More horizontal messages than one candidate may send.
	#[error("HrmpMessagesPerCandidateOverflow(Allowed: {messages_allowed}, Submitted: {messages_submitted})")]
	HrmpMessagesPerCandidateOverflow {
		/// Per candidate limit.
		messages_allowed: usize,
		/// Horizontal messages in the candidate.
		messages_submitted: usize,
	},
	/// New code was announced while upgrades are restricted.
	#[error("CodeUpgradeRestricted()")]
	CodeUpgradeRestricted,
	/// Index of the first horizontal message whose recipient is not greater than the one
	/// before it.
	#[error("HrmpMessagesDescendingOrDuplicate({0})")]
	HrmpMessagesDescendingOrDuplicate(usize),
}

/// A candidate that passed every check against the constraints of its relay parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
	relay_parent: RelayChainBlockInfo,
	operating_constraints: Constraints,
	candidate: Arc<ProspectiveCandidate>,
	modifications: ConstraintModifications,
}

impl Fragment {
	/// Check `candidate` against `operating_constraints` at `relay_parent`.
	///
	/// Neither the collator signature nor the PoV size are looked at.
	pub fn new(
		relay_parent: RelayChainBlockInfo,
		operating_constraints: Constraints,
		candidate: Arc<ProspectiveCandidate>,
	) -> Result<Self, FragmentValidityError> {
		let modifications = Self::check_against_constraints(
			&relay_parent,
			&operating_constraints,
			&candidate.commitments,
			&candidate.validation_code_hash,
			&candidate.persisted_validation_data,
		)?;

		Ok(Self { relay_parent, operating_constraints, candidate, modifications })
	}

	/// Run every check of [`Fragment::new`] on the parts of a candidate and return the
	/// modifications it makes.
	pub fn check_against_constraints(
		relay_parent: &RelayChainBlockInfo,
		operating_constraints: &Constraints,
		commitments: &CandidateCommitments,
		validation_code_hash: &ValidationCodeHash,
		persisted_validation_data: &PersistedValidationData,
	) -> Result<ConstraintModifications, FragmentValidityError> {
		let modifications =
			ConstraintModifications::of_candidate(relay_parent, operating_constraints, commitments)?;

		validate_against_constraints(
			operating_constraints,
			relay_parent,
			commitments,
			persisted_validation_data,
			validation_code_hash,
			&modifications,
		)?;

		Ok(modifications)
	}

	/// The relay parent the candidate is anchored to.
	pub fn relay_parent(&self) -> &RelayChainBlockInfo {
		&self.relay_parent
	}

	/// Constraints the candidate was checked against.
	pub fn operating_constraints(&self) -> &Constraints {
		&self.operating_constraints
	}

	/// The checked candidate.
	pub fn candidate(&self) -> &ProspectiveCandidate {
		&self.candidate
	}

	/// Shared handle on the candidate.
	pub fn candidate_clone(&self) -> Arc<ProspectiveCandidate> {
		self.candidate.clone()
	}

	/// What the candidate changes in the constraints of the next one.
	pub fn constraint_modifications(&self) -> &ConstraintModifications {
		&self.modifications
	}
}

/// Validates if the candidate commitments are obeying the constraints.
///
/// Only the checks which do not depend on the candidate's parent are performed here, so this
/// is usable on candidates which are not yet connected to any chain.
pub fn validate_commitments(
	constraints: &Constraints,
	relay_parent: &RelayChainBlockInfo,
	commitments: &CandidateCommitments,
	validation_code_hash: &ValidationCodeHash,
) -> Result<(), FragmentValidityError> {
	if constraints.validation_code_hash != *validation_code_hash {
		return Err(FragmentValidityError::ValidationCodeMismatch(
			constraints.validation_code_hash,
			*validation_code_hash,
		))
	}

	if relay_parent.number < constraints.min_relay_parent_number {
		return Err(FragmentValidityError::RelayParentTooOld(
			constraints.min_relay_parent_number,
			relay_parent.number,
		))
	}

	if commitments.new_validation_code.is_some() {
		match constraints.upgrade_restriction {
			None => {},
			Some(UpgradeRestriction::Present) =>
				return Err(FragmentValidityError::CodeUpgradeRestricted),
		}
	}

	let announced_code_size =
		commitments.new_validation_code.as_ref().map_or(0, |code| code.0.len());

	if announced_code_size > constraints.max_code_size {
		return Err(FragmentValidityError::CodeSizeTooLarge(
			constraints.max_code_size,
			announced_code_size,
		))
	}

	if commitments.horizontal_messages.len() > constraints.max_hrmp_num_per_candidate {
		return Err(FragmentValidityError::HrmpMessagesPerCandidateOverflow {
			messages_allowed: constraints.max_hrmp_num_per_candidate,
			messages_submitted: commitments.horizontal_messages.len(),
		})
	}

	let ump_messages = skip_ump_signals(commitments.upward_messages.iter()).count();
	if ump_messages > constraints.max_ump_num_per_candidate {
		return Err(FragmentValidityError::UmpMessagesPerCandidateOverflow {
			messages_allowed: constraints.max_ump_num_per_candidate,
			messages_submitted: ump_messages,
		})
	}

	Ok(())
}

fn validate_against_constraints(
	constraints: &Constraints,
	relay_parent: &RelayChainBlockInfo,
	commitments: &CandidateCommitments,
	persisted_validation_data: &PersistedValidationData,
	validation_code_hash: &ValidationCodeHash,
	modifications: &ConstraintModifications,
) -> Result<(), FragmentValidityError> {
	let expected_pvd = PersistedValidationData {
		parent_head: constraints.required_parent.clone(),
		relay_parent_number: relay_parent.number,
		relay_parent_storage_root: relay_parent.storage_root,
		max_pov_size: constraints.max_pov_size as u32,
	};

	if expected_pvd != *persisted_validation_data {
		return Err(FragmentValidityError::PersistedValidationDataMismatch(
			expected_pvd,
			persisted_validation_data.clone(),
		))
	}

	if modifications.dmp_messages_processed == 0 {
		if constraints
			.dmp_remaining_messages
			.get(0)
			.map_or(false, |&msg_sent_at| msg_sent_at <= relay_parent.number)
		{
			return Err(FragmentValidityError::DmpAdvancementRule)
		}
	}

	validate_commitments(constraints, relay_parent, commitments, validation_code_hash)?;

	constraints
		.check_modifications(modifications)
		.map_err(FragmentValidityError::OutputsInvalid)
}

/// Trait for a hypothetical or concrete candidate, as needed when assessing the validity of a
/// potential candidate.
pub trait HypotheticalOrConcreteCandidate {
	/// Return a reference to the candidate commitments, if present.
	fn commitments(&self) -> Option<&CandidateCommitments>;
	/// Return a reference to the persisted validation data, if present.
	fn persisted_validation_data(&self) -> Option<&PersistedValidationData>;
	/// Return a reference to the validation code hash, if present.
	fn validation_code_hash(&self) -> Option<ValidationCodeHash>;
	/// Return the parent head hash.
	fn parent_head_data_hash(&self) -> Hash;
	/// Return the output head hash, if present.
	fn output_head_data_hash(&self) -> Option<Hash>;
	/// Return the relay parent hash.
	fn relay_parent(&self) -> Hash;
	/// Return the candidate hash.
	fn candidate_hash(&self) -> CandidateHash;
}

impl HypotheticalOrConcreteCandidate for HypotheticalCandidate {
	fn commitments(&self) -> Option<&CandidateCommitments> {
		self.commitments()
	}

	fn persisted_validation_data(&self) -> Option<&PersistedValidationData> {
		self.persisted_validation_data()
	}

	fn validation_code_hash(&self) -> Option<ValidationCodeHash> {
		self.validation_code_hash()
	}

	fn parent_head_data_hash(&self) -> Hash {
		self.parent_head_data_hash()
	}

	fn output_head_data_hash(&self) -> Option<Hash> {
		self.output_head_data_hash()
	}

	fn relay_parent(&self) -> Hash {
		self.relay_parent()
	}

	fn candidate_hash(&self) -> CandidateHash {
		self.candidate_hash()
	}
}

#[cfg(test)]
mod tests;
