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

//! Commit orchestration (§4.5). Only a bucket's *root* page, in the key
//! file, is ever overwritten in place; spill pages in the data file are
//! append-only, so only root pages need a pre-image in the log. A bucket
//! newly created by a split lives past the pre-commit key file length and
//! needs no pre-image either — recovery simply truncates it away.

use std::collections::{BTreeMap, HashMap, HashSet};
use log::debug;
use crate::bucket::{page_capacity, Bucket, Page};
use crate::cache::BucketCache;
use crate::codec::{KeyHeader, LogHeader, KEY_HEADER_SIZE};
use crate::data::{encode_spill_record, spill_record_len, DataFile};
use crate::error::Result;
use crate::file::FileProvider;
use crate::index::{bucket_for_hash, bucket_offset, should_split, split_bit, split_pointer};
use crate::log::{LogWriter, PreImage};
use crate::pending::Pending;

pub struct CommitOutcome {
	pub bucket_count: u64,
	pub key_count: u64,
}

fn read_root(key_file: &impl FileProvider, block_size: u16, index: u64) -> Result<(Vec<u8>, Page)> {
	let offset = bucket_offset(KEY_HEADER_SIZE as u64, block_size, index);
	let mut raw = vec![0u8; block_size as usize];
	key_file.read_at(offset, &mut raw)?;
	let page = Page::decode(&raw, block_size)?;
	Ok((raw, page))
}

/// Runs one full commit cycle against everything currently staged in
/// `pending`. Does nothing (and touches no files) if nothing is staged.
pub fn run_commit<F: FileProvider>(
	data_file: &DataFile<F>,
	key_file: &F,
	log_file: &F,
	pending: &Pending,
	header: &KeyHeader,
	cache: &BucketCache,
) -> Result<CommitOutcome> {
	if pending.is_empty() {
		return Ok(CommitOutcome { bucket_count: header.bucket_count, key_count: header.key_count });
	}

	let pre_commit_bucket_count = header.bucket_count;
	let pre_commit_key_length = key_file.size()?;
	let pre_commit_data_length = data_file.size()?;
	let block_size = header.block_size;

	let staged = pending.drain_entries();
	let mut bucket_count = header.bucket_count;
	let mut key_count = header.key_count;

	// Group staged entries by the bucket they currently route to.
	let mut by_bucket: BTreeMap<u64, Vec<(u64, u64, u32)>> = BTreeMap::new();
	for (hash, group) in &staged {
		let index = bucket_for_hash(*hash, bucket_count);
		let slot = by_bucket.entry(index).or_insert_with(Vec::new);
		for e in group {
			slot.push((e.hash, e.offset, e.size));
		}
	}

	let mut loaded: HashMap<u64, Bucket> = HashMap::new();
	let mut pre_images: Vec<PreImage> = Vec::new();
	let mut pre_imaged: HashSet<u64> = HashSet::new();

	let mut load_existing = |index: u64,
	                          loaded: &mut HashMap<u64, Bucket>,
	                          pre_images: &mut Vec<PreImage>,
	                          pre_imaged: &mut HashSet<u64>|
	 -> Result<()> {
		if loaded.contains_key(&index) {
			return Ok(());
		}
		let (raw, root) = read_root(key_file, block_size, index)?;
		if pre_imaged.insert(index) {
			pre_images.push(PreImage { offset: bucket_offset(KEY_HEADER_SIZE as u64, block_size, index), bytes: raw });
		}
		let bucket = Bucket::load(root, block_size, data_file)?;
		loaded.insert(index, bucket);
		Ok(())
	};

	for (&index, entries) in &by_bucket {
		load_existing(index, &mut loaded, &mut pre_images, &mut pre_imaged)?;
		let bucket = loaded.get_mut(&index).unwrap();
		for &(hash, offset, size) in entries {
			bucket.insert(hash, offset, size);
		}
	}
	key_count += staged.values().map(|v| v.len() as u64).sum::<u64>();

	// Plan splits: while the table is over-loaded, split the bucket at the
	// current split pointer and grow the table by one bucket (§4.3, §4.5.2).
	let max_splits = (key_count / page_capacity(block_size).max(1) as u64) + bucket_count + 16;
	let mut splits_done = 0u64;
	while should_split(key_count, bucket_count, block_size, header.load_factor) {
		splits_done += 1;
		if splits_done > max_splits {
			debug!(target: "seekbase", "commit: aborting split planning after {} splits as a safety bound", splits_done);
			break;
		}
		let p = split_pointer(bucket_count);
		load_existing(p, &mut loaded, &mut pre_images, &mut pre_imaged)?;
		let bit = split_bit(bucket_count);
		let bucket = loaded.remove(&p).unwrap();
		let (stay, moved) = bucket.split(bit);
		let new_index = bucket_count;
		loaded.insert(p, stay);
		loaded.insert(new_index, moved);
		bucket_count += 1;
	}

	// Step 3-4: write the log header and every root-page pre-image, then fsync.
	let log_header = LogHeader {
		uid: header.uid,
		pre_commit_bucket_count,
		pre_commit_key_length,
		pre_commit_data_length,
	};
	let log_writer = LogWriter::new(log_file, block_size);
	log_writer.write_header(&log_header)?;
	for image in &pre_images {
		log_writer.append_pre_image(image)?;
	}
	log_writer.sync()?;

	// Step 5: append new value records, then new spill records, to the data file.
	let value_bytes = pending.buffer();
	if !value_bytes.is_empty() {
		data_file.append(&value_bytes)?;
	}
	// Spill offsets are allocated in the same order the spill records are
	// appended below, so a bucket's embedded `spill` pointer always matches
	// where its page actually lands. `loaded` is a HashMap with no fixed
	// iteration order, so it must be sorted by index *before* `pages()` runs,
	// not after — allocating offsets in HashMap order and appending in
	// sorted order would cross-wire spill chains between buckets.
	let mut loaded: Vec<(u64, Bucket)> = loaded.into_iter().collect();
	loaded.sort_by_key(|(index, _)| *index);

	let mut next_spill_offset = data_file.size()?;
	let mut touched: Vec<(u64, Vec<Page>)> = Vec::with_capacity(loaded.len());
	for (index, bucket) in loaded {
		let pages = bucket.pages(|| {
			let offset = next_spill_offset;
			next_spill_offset += spill_record_len(block_size);
			offset
		});
		touched.push((index, pages));
	}
	for (_, pages) in &touched {
		for page in &pages[1..] {
			data_file.append(&encode_spill_record(page, block_size))?;
		}
	}
	data_file.sync()?;

	// Step 6: write root pages into the key file, possibly extending it.
	for (index, pages) in &touched {
		let offset = bucket_offset(KEY_HEADER_SIZE as u64, block_size, *index);
		key_file.write_at(offset, &pages[0].encode(block_size))?;
		cache.invalidate(*index);
	}

	let new_header = KeyHeader { bucket_count, key_count, ..*header };
	key_file.write_at(0, &new_header.encode())?;
	key_file.sync()?;

	// Step 7: the commit reached the end, the log can be dropped.
	log_file.truncate(0)?;
	log_file.sync()?;

	pending.reset(data_file.size()?);

	debug!(
		target: "seekbase",
		"commit: {} new entries, {} splits, bucket_count {} -> {}",
		value_bytes.len(), splits_done, pre_commit_bucket_count, bucket_count,
	);

	Ok(CommitOutcome { bucket_count, key_count })
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::Arc;
	use tempfile::TempDir;
	use crate::codec::DataHeader;
	use crate::data::encode_value_record;
	use crate::file::{FileSystem, NativeFs};

	struct Fixture {
		_dir: TempDir,
		data: DataFile<<NativeFs as FileSystem>::File>,
		key: <NativeFs as FileSystem>::File,
		log: <NativeFs as FileSystem>::File,
		header: KeyHeader,
		cache: BucketCache,
	}

	fn setup(block_size: u16, key_size: u16) -> Fixture {
		let dir = TempDir::new().unwrap();
		let data_raw = NativeFs::create(&dir.path().join("t.dat")).unwrap();
		let key = NativeFs::create(&dir.path().join("t.key")).unwrap();
		let log = NativeFs::create(&dir.path().join("t.log")).unwrap();

		let data_header = DataHeader { uid: 1, appnum: 1, salt: 42, key_size };
		data_raw.append(&data_header.encode()).unwrap();

		let header = KeyHeader {
			uid: 1, appnum: 1, salt: 42, key_size, block_size,
			load_factor: 0.5, bucket_count: 1, key_count: 0,
		};
		key.append(&header.encode()).unwrap();
		key.append(&Page::empty().encode(block_size)).unwrap();

		let data = DataFile::new(Arc::new(data_raw), key_size);
		Fixture { _dir: dir, data, key, log, header, cache: BucketCache::new(1 << 20) }
	}

	fn setup_with_buckets(block_size: u16, key_size: u16, bucket_count: u64, load_factor: f32) -> Fixture {
		let dir = TempDir::new().unwrap();
		let data_raw = NativeFs::create(&dir.path().join("t.dat")).unwrap();
		let key = NativeFs::create(&dir.path().join("t.key")).unwrap();
		let log = NativeFs::create(&dir.path().join("t.log")).unwrap();

		let data_header = DataHeader { uid: 1, appnum: 1, salt: 42, key_size };
		data_raw.append(&data_header.encode()).unwrap();

		let header = KeyHeader {
			uid: 1, appnum: 1, salt: 42, key_size, block_size, load_factor, bucket_count, key_count: 0,
		};
		key.append(&header.encode()).unwrap();
		for _ in 0..bucket_count {
			key.append(&Page::empty().encode(block_size)).unwrap();
		}

		let data = DataFile::new(Arc::new(data_raw), key_size);
		Fixture { _dir: dir, data, key, log, header, cache: BucketCache::new(1 << 20) }
	}

	#[test]
	fn commit_with_no_pending_is_a_no_op() {
		let f = setup(256, 8);
		let pending = Pending::new(f.data.size().unwrap());
		let before = f.key.size().unwrap();
		let outcome = run_commit(&f.data, &f.key, &f.log, &pending, &f.header, &f.cache).unwrap();
		assert_eq!(outcome.bucket_count, 1);
		assert_eq!(f.key.size().unwrap(), before);
		assert_eq!(f.log.size().unwrap(), 0);
	}

	#[test]
	fn commit_appends_values_and_updates_index() {
		let f = setup(256, 8);
		let pending = Pending::new(f.data.size().unwrap());
		let key = vec![1u8; 8];
		let value = b"hello world".to_vec();
		let record = encode_value_record(&key, &value);
		pending.stage(123, &key, &record);

		let outcome = run_commit(&f.data, &f.key, &f.log, &pending, &f.header, &f.cache).unwrap();
		assert_eq!(outcome.key_count, 1);
		assert_eq!(f.log.size().unwrap(), 0);

		let mut header_buf = vec![0u8; KEY_HEADER_SIZE];
		f.key.read_at(0, &mut header_buf).unwrap();
		let new_header = KeyHeader::decode(&header_buf).unwrap();
		assert_eq!(new_header.key_count, 1);

		let (_, root) = read_root(&f.key, 256, 0).unwrap();
		assert_eq!(root.entries.len(), 1);
		assert_eq!(root.entries[0].hash, 123);

		let (read_key, read_value) = f.data.read_value(root.entries[0].offset).unwrap();
		assert_eq!(read_key, key);
		assert_eq!(read_value, value);
	}

	#[test]
	fn commit_splits_when_load_factor_exceeded() {
		let f = setup(64, 8); // small page, forces splits quickly
		let pending = Pending::new(f.data.size().unwrap());
		let cap = page_capacity(64) as u64;
		for i in 0..(cap * 4) {
			let key = (i as u64).to_le_bytes().to_vec();
			let value = vec![0u8; 4];
			let record = encode_value_record(&key, &value);
			pending.stage(i, &key, &record);
		}
		let outcome = run_commit(&f.data, &f.key, &f.log, &pending, &f.header, &f.cache).unwrap();
		assert!(outcome.bucket_count > 1, "expected at least one split, got bucket_count={}", outcome.bucket_count);
		assert_eq!(outcome.key_count, cap * 4);
	}

	#[test]
	fn two_buckets_spilling_in_the_same_commit_do_not_cross_wire_chains() {
		// bucket_count=4, block_size=64, key_size=8 => page_capacity=2 and
		// total capacity at load_factor=0.99 is 4*2*0.99 ~= 7.92, so staging
		// 6 entries (3 into bucket 0, 3 into bucket 1) overflows both of
		// those buckets into a spill without crossing the split threshold.
		let f = setup_with_buckets(64, 8, 4, 0.99);
		let pending = Pending::new(f.data.size().unwrap());
		for &hash in &[0u64, 4, 8, 1, 5, 9] {
			let key = hash.to_le_bytes().to_vec();
			let value = vec![0u8; 4];
			let record = encode_value_record(&key, &value);
			pending.stage(hash, &key, &record);
		}

		let outcome = run_commit(&f.data, &f.key, &f.log, &pending, &f.header, &f.cache).unwrap();
		assert_eq!(outcome.bucket_count, 4, "load stayed under threshold, no split expected");
		assert_eq!(outcome.key_count, 6);

		let buckets: [(u64, [u64; 3]); 2] = [(0, [0u64, 4, 8]), (1, [1, 5, 9])];
		for (index, own_hashes) in buckets.iter() {
			let (_, root) = read_root(&f.key, 64, *index).unwrap();
			assert_ne!(root.spill, 0, "bucket {} should have spilled", index);
			let bucket = Bucket::load(root, 64, &f.data).unwrap();
			assert_eq!(bucket.len(), 3, "bucket {} should hold exactly its own 3 entries", index);
			for &hash in own_hashes {
				assert_eq!(bucket.find(hash).count(), 1, "bucket {} missing its own hash {}", index, hash);
			}
			for (other_index, other_hashes) in buckets.iter() {
				if other_index == index {
					continue;
				}
				for &hash in other_hashes {
					assert_eq!(
						bucket.find(hash).count(),
						0,
						"bucket {} cross-wired with bucket {}'s hash {}",
						index,
						other_index,
						hash
					);
				}
			}
		}
	}
}
