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

//! Utility module for the asynchronous backing subsystems.
//!
//! Contains the inclusion emulator used to predict which candidates the relay chain will accept,
//! the implicit view over allowed relay parents, the messages exchanged with the prospective
//! parachains subsystem and the interfaces of the runtime and chain collaborators.

#![warn(missing_docs)]

pub use async_backing_primitives as primitives;

/// Inclusion emulator: predicting relay-chain acceptance of prospective candidates.
pub mod inclusion_emulator;

/// The implicit view of allowed relay parents, derived from the active leaves.
pub mod backing_implicit_view;

/// Messages and signals consumed by the prospective parachains subsystem.
pub mod messages;

/// Metrics helpers.
pub mod metrics;

/// Interfaces and helpers for requesting data from the runtime and the chain.
pub mod runtime;

#[cfg(test)]
mod tests;

pub use runtime::{
	fetch_claim_queue, prospective_parachains_mode, request_session_index_for_child,
	ChainApi, ChainApiError, ClaimQueueSnapshot, ProspectiveParachainsMode, RuntimeApi,
	RuntimeApiError,
};

const LOG_TARGET: &'static str = "parachain::subsystem-util";
