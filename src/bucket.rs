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

//! The bucket engine (§4.2): a fixed-size page of index entries, plus the
//! logical bucket (page + spill chain) operations built on top of it.

use std::convert::TryInto;
use crate::error::{Error, Result};

/// One index entry: `(hash, data_offset, value_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
	pub hash: u64,
	pub offset: u64,
	pub size: u32,
}

pub const ENTRY_SIZE: usize = 8 + 8 + 4;
pub const PAGE_HEADER_SIZE: usize = 2 + 8; // count:u16, spill:u64

/// Capacity (entry count) of a single page for a given `block_size`.
pub fn page_capacity(block_size: u16) -> usize {
	(block_size as usize - PAGE_HEADER_SIZE) / ENTRY_SIZE
}

/// A single on-disk page: either the bucket slot in the key file, or a
/// spill record's payload in the data file. Both share this exact layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
	/// File offset of the next spill record in the chain, or 0 if none.
	pub spill: u64,
	pub entries: Vec<Entry>,
}

impl Page {
	pub fn empty() -> Page {
		Page { spill: 0, entries: Vec::new() }
	}

	/// Encodes this page into exactly `block_size` bytes, zero-padded.
	pub fn encode(&self, block_size: u16) -> Vec<u8> {
		let cap = page_capacity(block_size);
		assert!(self.entries.len() <= cap, "page entry count exceeds capacity");
		let mut out = vec![0u8; block_size as usize];
		out[0..2].copy_from_slice(&(self.entries.len() as u16).to_le_bytes());
		out[2..10].copy_from_slice(&self.spill.to_le_bytes());
		let mut pos = PAGE_HEADER_SIZE;
		for e in &self.entries {
			out[pos..pos + 8].copy_from_slice(&e.hash.to_le_bytes());
			out[pos + 8..pos + 16].copy_from_slice(&e.offset.to_le_bytes());
			out[pos + 16..pos + 20].copy_from_slice(&e.size.to_le_bytes());
			pos += ENTRY_SIZE;
		}
		out
	}

	pub fn decode(buf: &[u8], block_size: u16) -> Result<Page> {
		if buf.len() < block_size as usize {
			return Err(Error::ShortRead);
		}
		let count = u16::from_le_bytes(buf[0..2].try_into().unwrap()) as usize;
		let cap = page_capacity(block_size);
		if count > cap {
			return Err(Error::Corruption(format!("bucket page count {} exceeds capacity {}", count, cap)));
		}
		let spill = u64::from_le_bytes(buf[2..10].try_into().unwrap());
		let mut entries = Vec::with_capacity(count);
		let mut pos = PAGE_HEADER_SIZE;
		for _ in 0..count {
			let hash = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
			let offset = u64::from_le_bytes(buf[pos + 8..pos + 16].try_into().unwrap());
			let size = u32::from_le_bytes(buf[pos + 16..pos + 20].try_into().unwrap());
			entries.push(Entry { hash, offset, size });
			pos += ENTRY_SIZE;
		}
		Ok(Page { spill, entries })
	}
}

/// Reads a spill page from the data file at a known offset. Implemented by
/// the data-file layer; kept as a trait so the bucket engine has no direct
/// file-provider dependency.
pub trait SpillSource {
	fn read_spill(&self, offset: u64, block_size: u16) -> Result<Page>;
}

/// A logical bucket: the root page plus its full spill chain, flattened
/// into one hash-sorted sequence of entries (§3 invariant 3). Operating on
/// the flattened sequence keeps insert/split simple to reason about; the
/// chain is only ever re-paginated as a whole during commit, which already
/// batches writes, so the extra copying is not on the fetch path.
#[derive(Debug, Clone)]
pub struct Bucket {
	entries: Vec<Entry>,
	block_size: u16,
}

impl Bucket {
	pub fn load(root: Page, block_size: u16, source: &impl SpillSource) -> Result<Bucket> {
		let mut entries = root.entries;
		let mut next = root.spill;
		while next != 0 {
			let page = source.read_spill(next, block_size)?;
			next = page.spill;
			entries.extend(page.entries);
		}
		Ok(Bucket { entries, block_size })
	}

	pub fn empty(block_size: u16) -> Bucket {
		Bucket { entries: Vec::new(), block_size }
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn block_size(&self) -> u16 {
		self.block_size
	}

	/// All entries whose hash matches, in arrival order. The caller confirms
	/// a true match by re-reading the key from the data record (§4.2).
	pub fn find(&self, hash: u64) -> impl Iterator<Item = &Entry> + '_ {
		let start = self.entries.partition_point(|e| e.hash < hash);
		self.entries[start..].iter().take_while(move |e| e.hash == hash)
	}

	/// Inserts a new entry keeping the sequence sorted by hash; ties are
	/// broken by arrival order (new entry goes after existing equal hashes).
	pub fn insert(&mut self, hash: u64, offset: u64, size: u32) {
		let pos = self.entries.partition_point(|e| e.hash <= hash);
		self.entries.insert(pos, Entry { hash, offset, size });
	}

	/// Splits by the new high bit of linear hashing: entries with that bit
	/// clear stay, entries with it set move to the returned sibling bucket.
	pub fn split(self, new_bit: u64) -> (Bucket, Bucket) {
		let block_size = self.block_size;
		let (stay, moved): (Vec<Entry>, Vec<Entry>) =
			self.entries.into_iter().partition(|e| e.hash & new_bit == 0);
		(Bucket { entries: stay, block_size }, Bucket { entries: moved, block_size })
	}

	/// Re-paginates the flattened entry sequence into a chain of fixed-size
	/// pages. `allocate_spill` is invoked once per extra page beyond the
	/// first and must return the file offset the caller will place that
	/// page's spill record at.
	pub fn pages(&self, mut allocate_spill: impl FnMut() -> u64) -> Vec<Page> {
		let cap = page_capacity(self.block_size).max(1);
		if self.entries.is_empty() {
			return vec![Page::empty()];
		}
		let chunks: Vec<&[Entry]> = self.entries.chunks(cap).collect();
		let mut pages = Vec::with_capacity(chunks.len());
		for (i, chunk) in chunks.iter().enumerate() {
			let spill = if i + 1 < chunks.len() { allocate_spill() } else { 0 };
			pages.push(Page { spill, entries: chunk.to_vec() });
		}
		pages
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct NoSpills;
	impl SpillSource for NoSpills {
		fn read_spill(&self, _offset: u64, _block_size: u16) -> Result<Page> {
			panic!("no spills expected")
		}
	}

	#[test]
	fn page_round_trips() {
		let page = Page {
			spill: 4096,
			entries: vec![
				Entry { hash: 1, offset: 10, size: 20 },
				Entry { hash: 5, offset: 30, size: 40 },
			],
		};
		let bytes = page.encode(256);
		let decoded = Page::decode(&bytes, 256).unwrap();
		assert_eq!(page, decoded);
	}

	#[test]
	fn insert_keeps_sorted_order() {
		let mut b = Bucket::empty(256);
		b.insert(5, 0, 1);
		b.insert(1, 0, 1);
		b.insert(3, 0, 1);
		let hashes: Vec<u64> = b.pages(|| panic!("no spill"))[0].entries.iter().map(|e| e.hash).collect();
		assert_eq!(hashes, vec![1, 3, 5]);
	}

	#[test]
	fn find_returns_only_matching_hash() {
		let mut b = Bucket::empty(256);
		b.insert(1, 100, 1);
		b.insert(1, 200, 2);
		b.insert(2, 300, 3);
		let found: Vec<u64> = b.find(1).map(|e| e.offset).collect();
		assert_eq!(found, vec![100, 200]);
		assert_eq!(b.find(9).count(), 0);
	}

	#[test]
	fn split_partitions_by_new_bit() {
		let mut b = Bucket::empty(256);
		b.insert(0b00, 0, 1);
		b.insert(0b01, 0, 1);
		b.insert(0b10, 0, 1);
		b.insert(0b11, 0, 1);
		let (stay, moved) = b.split(0b10);
		assert_eq!(stay.len(), 2);
		assert_eq!(moved.len(), 2);
	}

	#[test]
	fn overflow_allocates_spill_pages() {
		let block_size = 64u16;
		let cap = page_capacity(block_size);
		let mut b = Bucket::empty(block_size);
		for i in 0..(cap * 2 + 1) as u64 {
			b.insert(i, i, 1);
		}
		let mut next_offset = 1000u64;
		let pages = b.pages(|| {
			let o = next_offset;
			next_offset += 1;
			o
		});
		assert_eq!(pages.len(), 3);
		assert_ne!(pages[0].spill, 0);
		assert_ne!(pages[1].spill, 0);
		assert_eq!(pages[2].spill, 0);
	}

	#[test]
	fn load_follows_spill_chain() {
		struct OneSpill(Page);
		impl SpillSource for OneSpill {
			fn read_spill(&self, offset: u64, _block_size: u16) -> Result<Page> {
				assert_eq!(offset, 777);
				Ok(self.0.clone())
			}
		}
		let root = Page { spill: 777, entries: vec![Entry { hash: 1, offset: 1, size: 1 }] };
		let spill = Page { spill: 0, entries: vec![Entry { hash: 2, offset: 2, size: 2 }] };
		let bucket = Bucket::load(root, 256, &OneSpill(spill)).unwrap();
		assert_eq!(bucket.len(), 2);
	}
}
