// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

//! Hash function abstraction. The engine is generic over this trait and is
//! monomorphized on the hot fetch/insert path rather than paying for dynamic
//! dispatch per lookup.

use std::convert::TryInto;

/// A 64-bit hash of a key, salted per-database to defeat cross-database
/// fingerprinting and adversarial key choice.
pub trait StoreHasher: Clone + Send + Sync + 'static {
	fn new(salt: u64) -> Self;
	fn hash(&self, key: &[u8]) -> u64;
}

/// Default hasher, built on the blake2b implementation already used
/// elsewhere in this crate's dependency tree for key hashing in tests.
#[derive(Clone)]
pub struct Blake2Hasher {
	salt: u64,
}

impl StoreHasher for Blake2Hasher {
	fn new(salt: u64) -> Self {
		Blake2Hasher { salt }
	}

	fn hash(&self, key: &[u8]) -> u64 {
		let salted = self.salt.to_le_bytes();
		let result = blake2_rfc::blake2b::blake2b(8, &salted, key);
		u64::from_le_bytes(result.as_bytes().try_into().unwrap())
	}
}
