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

//! The insert pipeline (§5 "Insert"): values accepted by `insert` are
//! staged here, visible to concurrent `fetch` calls, before `commit` moves
//! them into the key file's bucket index in one O(1) pointer swap.
//!
//! A single writer appends to `buffer` and records each key's prospective
//! data-file offset in `by_hash`. Readers take a shared lock to scan the
//! pending map before falling through to the committed index; the writer
//! takes the exclusive lock only for the instant it swaps in a fresh,
//! empty buffer at commit.

use std::collections::HashMap;
use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct PendingEntry {
	pub hash: u64,
	pub key: Vec<u8>,
	/// Offset this record will have in the data file once flushed.
	pub offset: u64,
	pub size: u32,
	/// Byte range of this record within `PendingInner::buffer`.
	pub buf_start: usize,
	pub buf_end: usize,
}

struct PendingInner {
	/// Data-file offset `buffer[0]` will land at once appended.
	base_offset: u64,
	buffer: Vec<u8>,
	by_hash: HashMap<u64, Vec<PendingEntry>>,
}

/// Staging area for not-yet-committed inserts.
pub struct Pending {
	inner: RwLock<PendingInner>,
}

impl Pending {
	pub fn new(base_offset: u64) -> Pending {
		Pending {
			inner: RwLock::new(PendingInner { base_offset, buffer: Vec::new(), by_hash: HashMap::new() }),
		}
	}

	/// Stages one value record, returning the offset it will be written at.
	pub fn stage(&self, hash: u64, key: &[u8], record: &[u8]) -> u64 {
		let mut inner = self.inner.write();
		let buf_start = inner.buffer.len();
		let offset = inner.base_offset + buf_start as u64;
		inner.buffer.extend_from_slice(record);
		let buf_end = inner.buffer.len();
		inner.by_hash.entry(hash).or_insert_with(Vec::new).push(PendingEntry {
			hash,
			key: key.to_vec(),
			offset,
			size: record.len() as u32,
			buf_start,
			buf_end,
		});
		offset
	}

	/// Looks up staged entries under `hash`, most recent last (insert order).
	pub fn find(&self, hash: u64) -> Vec<PendingEntry> {
		self.inner.read().by_hash.get(&hash).cloned().unwrap_or_default()
	}

	/// Returns the raw bytes of one staged record, addressed by the byte
	/// range recorded in its `PendingEntry`. Used by `fetch` to read an
	/// un-flushed value straight out of the staging buffer instead of the
	/// data file, which does not hold it yet (§4.4, §4.8).
	pub fn record(&self, buf_start: usize, buf_end: usize) -> Vec<u8> {
		self.inner.read().buffer[buf_start..buf_end].to_vec()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.read().buffer.is_empty()
	}

	pub fn byte_len(&self) -> usize {
		self.inner.read().buffer.len()
	}

	pub fn entry_count(&self) -> usize {
		self.inner.read().by_hash.values().map(|v| v.len()).sum()
	}

	/// Returns every staged entry across all hashes, grouped by hash, for
	/// the commit path to fold into the bucket index.
	pub fn drain_entries(&self) -> HashMap<u64, Vec<PendingEntry>> {
		self.inner.read().by_hash.clone()
	}

	/// The staged byte buffer, ready to append to the data file verbatim.
	pub fn buffer(&self) -> Vec<u8> {
		self.inner.read().buffer.clone()
	}

	/// Clears all staged state and re-bases for the next batch of inserts,
	/// to be called once the staged buffer has been durably appended and
	/// folded into the committed index.
	pub fn reset(&self, new_base_offset: u64) {
		let mut inner = self.inner.write();
		inner.base_offset = new_base_offset;
		inner.buffer.clear();
		inner.by_hash.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn stage_tracks_offsets_and_lookup() {
		let pending = Pending::new(1000);
		let off1 = pending.stage(5, b"key1", &[1, 2, 3]);
		let off2 = pending.stage(5, b"key2", &[4, 5]);
		assert_eq!(off1, 1000);
		assert_eq!(off2, 1003);
		let found = pending.find(5);
		assert_eq!(found.len(), 2);
		assert_eq!(found[0].key, b"key1");
		assert_eq!(found[1].key, b"key2");
		assert_eq!(pending.byte_len(), 5);
	}

	#[test]
	fn record_returns_the_staged_byte_range() {
		let pending = Pending::new(0);
		pending.stage(1, b"a", &[9, 9, 9]);
		pending.stage(1, b"b", &[7, 7]);
		let found = pending.find(1);
		assert_eq!(pending.record(found[0].buf_start, found[0].buf_end), vec![9, 9, 9]);
		assert_eq!(pending.record(found[1].buf_start, found[1].buf_end), vec![7, 7]);
	}

	#[test]
	fn find_misses_return_empty() {
		let pending = Pending::new(0);
		pending.stage(1, b"k", &[9]);
		assert!(pending.find(2).is_empty());
	}

	#[test]
	fn reset_clears_state_and_rebases() {
		let pending = Pending::new(0);
		pending.stage(1, b"k", &[1, 2, 3, 4]);
		assert!(!pending.is_empty());
		pending.reset(4);
		assert!(pending.is_empty());
		assert!(pending.find(1).is_empty());
		let off = pending.stage(2, b"k2", &[9]);
		assert_eq!(off, 4);
	}
}
