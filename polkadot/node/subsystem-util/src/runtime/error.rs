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

use std::sync::Arc;

/// Errors reported by the runtime API collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeApiError {
	/// The runtime API cannot be executed due to a runtime error.
	#[error("The runtime API '{runtime_api_name}' cannot be executed: {source}")]
	Execution {
		/// The runtime API being called
		runtime_api_name: &'static str,
		/// The wrapped error. Marked as source for tracking the error chain.
		#[source]
		source: Arc<dyn 'static + std::error::Error + Send + Sync>,
	},

	/// The runtime API request in question cannot be executed because the runtime at the
	/// requested relay-parent is an old version.
	#[error("The API is not supported by the runtime at the relay-parent")]
	NotSupported {
		/// The runtime API being called
		runtime_api_name: &'static str,
	},
}

/// Errors reported by the chain API collaborator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{msg}")]
pub struct ChainApiError {
	msg: String,
}

impl From<&str> for ChainApiError {
	fn from(s: &str) -> Self {
		s.to_owned().into()
	}
}

impl From<String> for ChainApiError {
	fn from(msg: String) -> Self {
		Self { msg }
	}
}

/// Errors while accessing runtime or chain information.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	/// Some request to the runtime failed.
	/// For example if we prune a block we're requesting info about.
	#[error("Runtime API error {0}")]
	RuntimeRequest(#[from] RuntimeApiError),

	/// Some request to the chain failed.
	#[error("Chain API error {0}")]
	ChainRequest(#[from] ChainApiError),
}

/// General `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
