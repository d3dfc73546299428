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

//! Read-only consistency checker (§4.7). Walks every bucket (root plus
//! spill chain), re-hashes each referenced key, and reports aggregate
//! statistics. Does not mutate any file.

use log::warn;
use crate::codec::{KeyHeader, KEY_HEADER_SIZE};
use crate::data::DataFile;
use crate::display::hex;
use crate::error::Result;
use crate::file::FileProvider;
use crate::hash::StoreHasher;
use crate::index::bucket_offset;
use crate::bucket::Page;

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
	pub version: u16,
	pub uid: u64,
	pub appnum: u64,
	pub salt: u64,
	pub key_size: u16,
	pub block_size: u16,
	pub load_factor: f32,
	pub bucket_count: u64,
	pub key_count: u64,
	pub spill_count: u64,
	pub data_bytes: u64,
	/// `histogram[n]` is the number of buckets (root page plus its full
	/// spill chain) holding exactly `n` entries; the last bucket holds the
	/// count for `n >= histogram.len() - 1`.
	pub histogram: Vec<u64>,
	pub hash_mismatches: u64,
}

const HISTOGRAM_BUCKETS: usize = 17;

/// Verifies a store from already-open file handles. `header` is the
/// already-validated key file header.
pub fn verify<F: FileProvider, H: StoreHasher>(
	data_file: &DataFile<F>,
	key_file: &F,
	header: &KeyHeader,
	hasher: &H,
) -> Result<VerifyReport> {
	let mut report = VerifyReport {
		version: crate::codec::VERSION,
		uid: header.uid,
		appnum: header.appnum,
		salt: header.salt,
		key_size: header.key_size,
		block_size: header.block_size,
		load_factor: header.load_factor,
		bucket_count: header.bucket_count,
		data_bytes: data_file.size()?,
		histogram: vec![0u64; HISTOGRAM_BUCKETS],
		..VerifyReport::default()
	};

	for index in 0..header.bucket_count {
		let offset = bucket_offset(KEY_HEADER_SIZE as u64, header.block_size, index);
		let mut raw = vec![0u8; header.block_size as usize];
		key_file.read_at(offset, &mut raw)?;
		let root = Page::decode(&raw, header.block_size)?;

		let bucket_len = root.entries.len() as u64
			+ {
				let mut next = root.spill;
				let mut spilled = 0u64;
				while next != 0 {
					let page = data_file.read_spill_page(next, header.block_size)?;
					spilled += page.entries.len() as u64;
					report.spill_count += 1;
					for entry in &page.entries {
						check_entry(data_file, hasher, entry, &mut report)?;
					}
					next = page.spill;
				}
				spilled
			};
		let bucket_index = (bucket_len as usize).min(HISTOGRAM_BUCKETS - 1);
		report.histogram[bucket_index] += 1;

		for entry in &root.entries {
			check_entry(data_file, hasher, entry, &mut report)?;
		}
		report.key_count += bucket_len;
	}

	if report.key_count != header.key_count {
		warn!(
			target: "seekbase",
			"verify: header key_count {} does not match {} entries found on disk",
			header.key_count, report.key_count,
		);
	}

	Ok(report)
}

fn check_entry<F: FileProvider, H: StoreHasher>(
	data_file: &DataFile<F>,
	hasher: &H,
	entry: &crate::bucket::Entry,
	report: &mut VerifyReport,
) -> Result<()> {
	let key = data_file.read_key(entry.offset)?;
	let recomputed = hasher.hash(&key);
	if recomputed != entry.hash {
		report.hash_mismatches += 1;
		warn!(
			target: "seekbase",
			"verify: key {} at offset {} hashes to {} but index says {}",
			hex(&key), entry.offset, recomputed, entry.hash,
		);
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::Arc;
	use tempfile::TempDir;
	use crate::codec::DataHeader;
	use crate::commit::run_commit;
	use crate::data::encode_value_record;
	use crate::file::{FileSystem, NativeFs};
	use crate::hash::Blake2Hasher;
	use crate::pending::Pending;
	use crate::cache::BucketCache;

	#[test]
	fn verify_reports_zero_entries_on_fresh_store() {
		let dir = TempDir::new().unwrap();
		let data_raw = NativeFs::create(&dir.path().join("t.dat")).unwrap();
		let key = NativeFs::create(&dir.path().join("t.key")).unwrap();

		let salt = 42u64;
		let key_size = 8u16;
		let block_size = 256u16;
		data_raw.append(&DataHeader { uid: 1, appnum: 1, salt, key_size }.encode()).unwrap();
		let header = KeyHeader {
			uid: 1, appnum: 1, salt, key_size, block_size, load_factor: 0.5, bucket_count: 1, key_count: 0,
		};
		key.append(&header.encode()).unwrap();
		key.append(&Page::empty().encode(block_size)).unwrap();

		let data = DataFile::new(Arc::new(data_raw), key_size);
		let hasher = Blake2Hasher::new(salt);
		let report = verify(&data, &key, &header, &hasher).unwrap();
		assert_eq!(report.key_count, 0);
		assert_eq!(report.spill_count, 0);
		assert_eq!(report.hash_mismatches, 0);
	}

	#[test]
	fn verify_counts_committed_entries_and_confirms_hashes() {
		let dir = TempDir::new().unwrap();
		let data_raw = NativeFs::create(&dir.path().join("t.dat")).unwrap();
		let key = NativeFs::create(&dir.path().join("t.key")).unwrap();
		let log = NativeFs::create(&dir.path().join("t.log")).unwrap();

		let salt = 7u64;
		let key_size = 8u16;
		let block_size = 256u16;
		data_raw.append(&DataHeader { uid: 2, appnum: 1, salt, key_size }.encode()).unwrap();
		let mut header = KeyHeader {
			uid: 2, appnum: 1, salt, key_size, block_size, load_factor: 0.5, bucket_count: 1, key_count: 0,
		};
		key.append(&header.encode()).unwrap();
		key.append(&Page::empty().encode(block_size)).unwrap();

		let data = DataFile::new(Arc::new(data_raw), key_size);
		let hasher = Blake2Hasher::new(salt);
		let cache = BucketCache::new(1 << 20);
		let pending = Pending::new(data.size().unwrap());

		for i in 0u64..5 {
			let key_bytes = i.to_le_bytes().to_vec();
			let hash = hasher.hash(&key_bytes);
			let value = vec![i as u8; 10];
			let record = encode_value_record(&key_bytes, &value);
			pending.stage(hash, &key_bytes, &record);
		}
		let outcome = run_commit(&data, &key, &log, &pending, &header, &cache).unwrap();
		header.bucket_count = outcome.bucket_count;
		header.key_count = outcome.key_count;

		let report = verify(&data, &key, &header, &hasher).unwrap();
		assert_eq!(report.key_count, 5);
		assert_eq!(report.hash_mismatches, 0);
	}
}
