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

//! Linear hashing addressing (§4.3). The key file holds `bucket_count`
//! buckets; `n0`/`p` (the current modulus and split pointer) are derived
//! arithmetically from `bucket_count` rather than stored, see codec.rs.

use crate::bucket::page_capacity;
use crate::options::CreateOptions;

/// `header_size + i * block_size`, the byte offset of bucket `i`.
pub fn bucket_offset(header_size: u64, block_size: u16, index: u64) -> u64 {
	header_size + index * block_size as u64
}

/// `n0 = floor(log2(bucket_count))`, i.e. `2^n0 <= bucket_count < 2^(n0+1)`.
pub fn n0(bucket_count: u64) -> u32 {
	debug_assert!(bucket_count >= 1);
	63 - bucket_count.leading_zeros()
}

/// Split pointer `p = bucket_count - 2^n0`.
pub fn split_pointer(bucket_count: u64) -> u64 {
	bucket_count - (1u64 << n0(bucket_count))
}

/// The bucket index that currently owns `hash`, per the linear-hashing
/// scheme of §4.3.
pub fn bucket_for_hash(hash: u64, bucket_count: u64) -> u64 {
	let n0 = n0(bucket_count);
	let i = hash & ((1u64 << n0) - 1);
	let p = split_pointer(bucket_count);
	if i < p {
		hash & ((1u64 << (n0 + 1)) - 1)
	} else {
		i
	}
}

/// The high bit distinguishing a bucket about to be split (at index `p`,
/// `2^n0` apart from its sibling) from the new bucket created alongside it.
pub fn split_bit(bucket_count: u64) -> u64 {
	1u64 << n0(bucket_count)
}

/// Initial bucket count at creation. The format leaves no prior key count
/// to size against, so the minimal valid table (one bucket) is used; linear
/// hashing grows it one split at a time as load demands (§4.3, §9.6).
pub fn initial_bucket_count(_options: &CreateOptions) -> u64 {
	1
}

/// Whether the store should schedule another split given `key_count` total
/// entries spread over `bucket_count` buckets at `load_factor`.
pub fn should_split(key_count: u64, bucket_count: u64, block_size: u16, load_factor: f32) -> bool {
	let capacity = (bucket_count * page_capacity(block_size) as u64) as f64 * load_factor as f64;
	(key_count as f64) > capacity
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn n0_and_split_pointer_examples() {
		assert_eq!(n0(1), 0);
		assert_eq!(split_pointer(1), 0);
		assert_eq!(n0(2), 1);
		assert_eq!(split_pointer(2), 0);
		assert_eq!(n0(3), 1);
		assert_eq!(split_pointer(3), 1);
		assert_eq!(n0(4), 2);
		assert_eq!(split_pointer(4), 0);
	}

	#[test]
	fn bucket_for_hash_stays_within_range() {
		for bucket_count in 1..200u64 {
			for hash in [0u64, 1, 2, 5, 12345, u64::MAX] {
				let b = bucket_for_hash(hash, bucket_count);
				assert!(b < bucket_count, "bucket {} out of range for count {}", b, bucket_count);
			}
		}
	}

	#[test]
	fn split_preserves_reachability() {
		// Every hash previously mapped to `p` must map to either `p` or the
		// newly created bucket (`bucket_count`) after growing by one.
		for bucket_count in 1..50u64 {
			let p = split_pointer(bucket_count);
			let bit = split_bit(bucket_count);
			let new_count = bucket_count + 1;
			for hash in 0..2000u64 {
				if bucket_for_hash(hash, bucket_count) == p {
					let after = bucket_for_hash(hash, new_count);
					assert!(after == p || after == bucket_count, "hash {} misrouted after split", hash);
					assert_eq!(after == bucket_count, hash & bit != 0);
				}
			}
		}
	}
}
