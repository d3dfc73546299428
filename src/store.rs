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

//! The public `Store` API (§4.8, §5, §6). Ties together the file provider,
//! codec, bucket/index engine, pending-insert pipeline, commit protocol
//! and recovery into `create`/`open`/`insert`/`fetch`/`close`.
//!
//! Space is not reclaimed: dead spill records left behind by a split are
//! never freed. This is an accepted trade-off of the append-only design,
//! not an oversight (§9.6).

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use log::{debug, info};
use parking_lot::RwLock;
use rand::RngCore;

use crate::bucket::Page;
use crate::cache::BucketCache;
use crate::codec::{DataHeader, KeyHeader, KEY_HEADER_SIZE};
use crate::commit::run_commit;
use crate::data::{decode_value_record, encode_value_record, DataFile};
use crate::error::{Error, Result};
use crate::file::{FileProvider, FileSystem};
use crate::hash::StoreHasher;
use crate::index::{bucket_for_hash, bucket_offset, initial_bucket_count};
use crate::options::{CreateOptions, OpenOptions};
use crate::pending::Pending;
use crate::recovery::recover;
use crate::verify::{verify, VerifyReport};

/// The three file paths a store is made of, derived from one base path by
/// suffix, matching the reference engine's `.dat`/`.key`/`.log` convention.
pub struct Paths {
	pub data: PathBuf,
	pub key: PathBuf,
	pub log: PathBuf,
}

impl Paths {
	pub fn from_base(base: impl AsRef<Path>) -> Paths {
		let base = base.as_ref();
		Paths {
			data: base.with_extension("dat"),
			key: base.with_extension("key"),
			log: base.with_extension("log"),
		}
	}
}

/// Commit is triggered once the pending append buffer reaches this many
/// staged bytes, in addition to explicit `flush()`/`close()` calls.
pub const DEFAULT_COMMIT_THRESHOLD_BYTES: usize = 4 * 1024 * 1024;

/// An open append-only key/value store.
pub struct Store<FS: FileSystem, H: StoreHasher> {
	data_file: DataFile<FS::File>,
	key_file: Arc<FS::File>,
	log_file: Arc<FS::File>,
	header: RwLock<KeyHeader>,
	pending: Pending,
	cache: BucketCache,
	hasher: H,
	commit_threshold: usize,
	closed: AtomicBool,
	_fs: PhantomData<FS>,
}

impl<FS: FileSystem, H: StoreHasher> Store<FS, H> {
	/// Creates a new, empty store at `paths`. Fails if any of the three
	/// files already exists (§4.1).
	pub fn create(paths: &Paths, options: &CreateOptions) -> Result<()> {
		options.validate()?;
		let uid = rand::thread_rng().next_u64();

		let data_file = FS::create(&paths.data)?;
		let key_file = FS::create(&paths.key)?;
		let log_file = FS::create(&paths.log)?;

		let data_header = DataHeader { uid, appnum: options.appnum, salt: options.salt, key_size: options.key_size };
		data_file.append(&data_header.encode())?;
		data_file.sync()?;

		let bucket_count = initial_bucket_count(options);
		let key_header = KeyHeader {
			uid,
			appnum: options.appnum,
			salt: options.salt,
			key_size: options.key_size,
			block_size: options.block_size,
			load_factor: options.load_factor,
			bucket_count,
			key_count: 0,
		};
		key_file.append(&key_header.encode())?;
		let empty_page = Page::empty().encode(options.block_size);
		for _ in 0..bucket_count {
			key_file.append(&empty_page)?;
		}
		key_file.sync()?;
		log_file.sync()?;

		info!(target: "seekbase", "created store uid={} key_size={} block_size={}", uid, options.key_size, options.block_size);
		Ok(())
	}

	/// Opens an existing store, running recovery first if needed (§4.6).
	pub fn open(paths: &Paths, options: &OpenOptions) -> Result<Store<FS, H>> {
		let data_file = FS::open(&paths.data)?;
		let key_file = FS::open(&paths.key)?;
		let log_file = FS::open(&paths.log)?;

		data_file.try_lock_exclusive()?;

		let mut data_header_buf = vec![0u8; crate::codec::DATA_HEADER_SIZE];
		data_file.read_at(0, &mut data_header_buf)?;
		let data_header = DataHeader::decode(&data_header_buf)?;

		let mut key_header_buf = vec![0u8; KEY_HEADER_SIZE];
		key_file.read_at(0, &mut key_header_buf)?;
		let key_header = KeyHeader::decode(&key_header_buf)?;

		if data_header.uid != key_header.uid {
			return Err(Error::UidMismatch);
		}
		if data_header.key_size != key_header.key_size {
			return Err(Error::InvalidKeySize { expected: data_header.key_size, actual: key_header.key_size });
		}
		if let Some(expected) = options.expected_key_size {
			if expected != key_header.key_size {
				return Err(Error::InvalidKeySize { expected, actual: key_header.key_size });
			}
		}
		if let Some(expected) = options.expected_block_size {
			if expected != key_header.block_size {
				return Err(Error::InvalidBlockSize { expected, actual: key_header.block_size });
			}
		}

		let recovered = recover(&data_file, &key_file, &log_file, key_header.uid, key_header.block_size)?;
		if recovered {
			info!(target: "seekbase", "recovered store uid={} after an incomplete commit", key_header.uid);
		}

		// Re-read the key header: recovery may have truncated the key file
		// back to a smaller bucket_count/key_count than what was on disk
		// when we first read it, but the header page itself (offset 0) sits
		// before any bucket and is never part of a pre-image/truncation, so
		// the copy already in hand remains authoritative unless recovery ran.
		let key_header = if recovered {
			let mut buf = vec![0u8; KEY_HEADER_SIZE];
			key_file.read_at(0, &mut buf)?;
			KeyHeader::decode(&buf)?
		} else {
			key_header
		};

		let key_file = Arc::new(key_file);
		let log_file = Arc::new(log_file);
		let data_file_size = data_file.size()?;
		let data_file = DataFile::new(Arc::new(data_file), key_header.key_size);

		let hasher = H::new(key_header.salt);

		Ok(Store {
			data_file,
			key_file,
			log_file,
			header: RwLock::new(key_header),
			pending: Pending::new(data_file_size),
			cache: BucketCache::new(options.cache_size),
			hasher,
			commit_threshold: DEFAULT_COMMIT_THRESHOLD_BYTES,
			closed: AtomicBool::new(false),
			_fs: PhantomData,
		})
	}

	/// Inserts `(key, value)`. Never probes for an existing key; duplicates
	/// are accepted silently (§4.4). Returns once the record is staged in
	/// the pending buffer, not necessarily durable — call `flush()` or rely
	/// on the automatic byte-threshold commit for durability.
	pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
		self.insert_inner(key, value)
	}

	/// Like `insert`, but first probes the pending map and on-disk index
	/// and returns `Error::KeyExists` if the key is already present,
	/// without writing anything (§9.6).
	pub fn insert_checked(&self, key: &[u8], value: &[u8]) -> Result<()> {
		if self.fetch(key)?.is_some() {
			return Err(Error::KeyExists);
		}
		self.insert_inner(key, value)
	}

	fn insert_inner(&self, key: &[u8], value: &[u8]) -> Result<()> {
		let header = self.header.read();
		if key.len() != header.key_size as usize {
			return Err(Error::InvalidKeySize { expected: header.key_size, actual: key.len() as u16 });
		}
		drop(header);

		let hash = self.hasher.hash(key);
		let record = encode_value_record(key, value);
		self.pending.stage(hash, key, &record);

		if self.pending.byte_len() >= self.commit_threshold {
			self.flush()?;
		}
		Ok(())
	}

	/// Looks up `key`, consulting the pending map first, then the on-disk
	/// index (§4.8).
	pub fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		let hash = self.hasher.hash(key);

		for candidate in self.pending.find(hash) {
			if candidate.key == key {
				// Not yet appended to the data file (§4.4): decode straight out
				// of the pending buffer rather than reading `candidate.offset`,
				// which is only the *prospective* file offset until commit.
				let record = self.pending.record(candidate.buf_start, candidate.buf_end);
				let decoded = decode_value_record(&record, candidate.key.len() as u16)?;
				return Ok(Some(decoded.value));
			}
		}

		let header = self.header.read();
		let bucket_count = header.bucket_count;
		let block_size = header.block_size;
		drop(header);

		let index = bucket_for_hash(hash, bucket_count);
		let offset = bucket_offset(KEY_HEADER_SIZE as u64, block_size, index);

		let raw = match self.cache.get(index) {
			Some(cached) => cached,
			None => {
				let mut buf = vec![0u8; block_size as usize];
				self.key_file.read_at(offset, &mut buf)?;
				self.cache.insert(index, buf.clone());
				buf
			}
		};
		let root = Page::decode(&raw, block_size)?;

		if let Some(entry) = Self::search_chain(&self.data_file, &root, block_size, hash)? {
			let (file_key, value) = self.data_file.read_value(entry.offset)?;
			if file_key == key {
				return Ok(Some(value));
			}
		}
		Ok(None)
	}

	fn search_chain(
		data_file: &DataFile<FS::File>,
		root: &Page,
		block_size: u16,
		hash: u64,
	) -> Result<Option<crate::bucket::Entry>> {
		if let Some(e) = root.entries.iter().find(|e| e.hash == hash) {
			return Ok(Some(*e));
		}
		let mut next = root.spill;
		while next != 0 {
			let page = data_file.read_spill_page(next, block_size)?;
			if let Some(e) = page.entries.iter().find(|e| e.hash == hash) {
				return Ok(Some(*e));
			}
			next = page.spill;
		}
		Ok(None)
	}

	/// Forces a commit of whatever is currently staged, even if under the
	/// byte threshold (§4.5).
	pub fn flush(&self) -> Result<()> {
		let mut header = self.header.write();
		let outcome = run_commit(&self.data_file, &self.key_file, &self.log_file, &self.pending, &header, &self.cache)?;
		header.bucket_count = outcome.bucket_count;
		header.key_count = outcome.key_count;
		debug!(target: "seekbase", "flush complete, bucket_count={} key_count={}", header.bucket_count, header.key_count);
		Ok(())
	}

	/// Runs the read-only consistency checker over the current on-disk
	/// state (§4.7). Any records still only in the pending buffer are not
	/// included; call `flush()` first to verify everything inserted so far.
	pub fn verify(&self) -> Result<VerifyReport> {
		let header = self.header.read();
		verify(&self.data_file, &self.key_file, &header, &self.hasher)
	}

	/// Flushes, syncs, and truncates the log, per the RAII close contract
	/// of §5. The OS file lock is released when the underlying file handle
	/// is dropped.
	pub fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		self.flush()?;
		self.data_file.sync()?;
		self.key_file.sync()?;
		self.log_file.truncate(0)?;
		self.log_file.sync()?;
		Ok(())
	}
}

impl<FS: FileSystem, H: StoreHasher> Drop for Store<FS, H> {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			log::error!(target: "seekbase", "error while closing store on drop: {}", e);
		}
	}
}
