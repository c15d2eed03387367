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

//! Error types.

use fatality::Nested;

use async_backing_subsystem_util::runtime::{self, ChainApiError, RuntimeApiError};

use crate::LOG_TARGET;

#[allow(missing_docs)]
#[fatality::fatality(splitable)]
pub enum Error {
	#[fatal]
	#[error("Message channel to the subsystem was closed")]
	ReceiverExhausted,

	#[error("Error while accessing runtime information: {0}")]
	Runtime(#[from] runtime::Error),

	#[error("Runtime API request failed: {0}")]
	RuntimeApi(#[from] RuntimeApiError),

	#[error("Chain API request failed: {0}")]
	ChainApi(#[from] ChainApiError),
}

/// General `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
/// Result for fatal only failures.
pub type FatalResult<T> = std::result::Result<T, FatalError>;

/// Utility for eating top level errors and log them.
///
/// We basically always want to try and continue on error. This utility function is meant to
/// consume top-level errors by simply logging them
pub fn log_error(result: Result<()>, ctx: &'static str) -> FatalResult<()> {
	match result.into_nested()? {
		Ok(()) => Ok(()),
		Err(jfyi) => {
			gum::debug!(target: LOG_TARGET, error = ?jfyi, ctx);
			Ok(())
		},
	}
}
