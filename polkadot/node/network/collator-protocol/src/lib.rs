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

//! The Collator Protocol allows collators and validators talk to each other.
//!
//! This crate holds the validator side bookkeeping: which paras are still owed a collation fetch
//! according to the claim queue, which collations were fetched and from whom, and which ones wait
//! for their parent head data before they can be seconded.

#![deny(unused_crate_dependencies)]

mod error;
pub mod validator_side;

pub use error::SecondingError;

const LOG_TARGET: &str = "parachain::collator-protocol";
