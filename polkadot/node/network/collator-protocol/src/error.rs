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

//! Error handling related code and Error/Result definitions.

/// A fetched collation does not match what was advertised or what the runtime expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecondingError {
	#[error("Persisted validation data hash doesn't match one in the candidate receipt.")]
	PersistedValidationDataMismatch,

	#[error("Candidate hash doesn't match the advertisement")]
	CandidateHashMismatch,

	#[error("Relay parent hash doesn't match the advertisement")]
	RelayParentMismatch,

	#[error("Received parent head data doesn't match the hash it was advertised with")]
	ParentHeadDataMismatch,
}
