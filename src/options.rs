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

use crate::error::{Error, Result};

pub const MIN_BLOCK_SIZE: u16 = 64;
pub const MAX_BLOCK_SIZE: u16 = 1 << 15;

/// Parameters supplied to `create`. Immutable for the lifetime of the database.
#[derive(Debug, Clone)]
pub struct CreateOptions {
	pub appnum: u64,
	pub salt: u64,
	pub key_size: u16,
	pub block_size: u16,
	pub load_factor: f32,
}

impl CreateOptions {
	pub fn validate(&self) -> Result<()> {
		if self.key_size == 0 {
			return Err(Error::invalid_argument("key_size must be >= 1"));
		}
		if !self.block_size.is_power_of_two() {
			return Err(Error::invalid_argument("block_size must be a power of two"));
		}
		if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
			return Err(Error::invalid_argument(format!(
				"block_size must be between {} and {}",
				MIN_BLOCK_SIZE, MAX_BLOCK_SIZE,
			)));
		}
		if !(self.load_factor > 0.0 && self.load_factor < 1.0) {
			return Err(Error::invalid_argument("load_factor must be in (0, 1)"));
		}
		Ok(())
	}
}

/// Parameters supplied to `open`. `cache_size` bounds the bucket cache (§9
/// "Cache / arena"). `expected_key_size`/`expected_block_size` let a caller
/// that knows what it created assert on-disk headers still agree, instead
/// of silently trusting whatever is found there (§7 `invalid_key_size` /
/// `invalid_block_size`). Left `None`, the header is trusted as-is.
#[derive(Debug, Clone)]
pub struct OpenOptions {
	pub cache_size: usize,
	pub expected_key_size: Option<u16>,
	pub expected_block_size: Option<u16>,
}

impl Default for OpenOptions {
	fn default() -> Self {
		OpenOptions { cache_size: 16 * 1024 * 1024, expected_key_size: None, expected_block_size: None }
	}
}
