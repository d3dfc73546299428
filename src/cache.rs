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

//! Bounded in-memory bucket cache (§9 "Cache"): a simple map from bucket
//! index to its raw page bytes, with LRU eviction bounded by byte budget.
//! Concurrent readers take shared references; the writer replaces entries
//! under the exclusive lock at commit time.

use std::collections::{HashMap, VecDeque};
use parking_lot::RwLock;

struct Inner {
	pages: HashMap<u64, Vec<u8>>,
	order: VecDeque<u64>,
	bytes: usize,
	capacity: usize,
}

pub struct BucketCache {
	inner: RwLock<Inner>,
}

impl BucketCache {
	pub fn new(capacity_bytes: usize) -> BucketCache {
		BucketCache {
			inner: RwLock::new(Inner {
				pages: HashMap::new(),
				order: VecDeque::new(),
				bytes: 0,
				capacity: capacity_bytes,
			}),
		}
	}

	pub fn get(&self, index: u64) -> Option<Vec<u8>> {
		self.inner.read().pages.get(&index).cloned()
	}

	pub fn insert(&self, index: u64, page: Vec<u8>) {
		let mut inner = self.inner.write();
		if let Some(old) = inner.pages.insert(index, page.clone()) {
			inner.bytes -= old.len();
		} else {
			inner.order.push_back(index);
		}
		inner.bytes += page.len();
		while inner.bytes > inner.capacity {
			match inner.order.pop_front() {
				Some(evict) if evict != index => {
					if let Some(p) = inner.pages.remove(&evict) {
						inner.bytes -= p.len();
					}
				}
				Some(_) => break,
				None => break,
			}
		}
	}

	pub fn invalidate(&self, index: u64) {
		let mut inner = self.inner.write();
		if let Some(p) = inner.pages.remove(&index) {
			inner.bytes -= p.len();
		}
		inner.order.retain(|&i| i != index);
	}

	pub fn clear(&self) {
		let mut inner = self.inner.write();
		inner.pages.clear();
		inner.order.clear();
		inner.bytes = 0;
	}
}
