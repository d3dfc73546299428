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

//! Data file record codec and access (§3 "Data record", §6 "Data file
//! layout"). Value records carry one `(key, value)` pair; spill records
//! carry one page's worth of overflow bucket entries (§4.2).

use std::convert::TryInto;
use std::sync::Arc;
use crate::bucket::{Page, SpillSource};
use crate::codec::{RECORD_SPILL, RECORD_VALUE};
use crate::error::{Error, Result};
use crate::file::FileProvider;

/// `[tag:1][key_size bytes][value_len:4][value bytes]`
pub fn encode_value_record(key: &[u8], value: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(1 + key.len() + 4 + value.len());
	out.push(RECORD_VALUE);
	out.extend_from_slice(key);
	out.extend_from_slice(&(value.len() as u32).to_le_bytes());
	out.extend_from_slice(value);
	out
}

pub fn value_record_len(key_size: u16, value_len: u32) -> u64 {
	1 + key_size as u64 + 4 + value_len as u64
}

/// `[tag:1][block_size bytes: encoded bucket page]`
pub fn encode_spill_record(page: &Page, block_size: u16) -> Vec<u8> {
	let mut out = Vec::with_capacity(1 + block_size as usize);
	out.push(RECORD_SPILL);
	out.extend_from_slice(&page.encode(block_size));
	out
}

pub fn spill_record_len(block_size: u16) -> u64 {
	1 + block_size as u64
}

/// Thin wrapper around an open data file giving record-level access.
pub struct DataFile<F: FileProvider> {
	file: Arc<F>,
	key_size: u16,
}

impl<F: FileProvider> DataFile<F> {
	pub fn new(file: Arc<F>, key_size: u16) -> DataFile<F> {
		DataFile { file, key_size }
	}

	pub fn size(&self) -> Result<u64> {
		self.file.size()
	}

	pub fn truncate(&self, len: u64) -> Result<()> {
		self.file.truncate(len)
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}

	pub fn append(&self, buf: &[u8]) -> Result<u64> {
		self.file.append(buf)
	}

	/// Reads the key and value of the value record at `offset`.
	pub fn read_value(&self, offset: u64) -> Result<(Vec<u8>, Vec<u8>)> {
		let mut tag = [0u8; 1];
		self.file.read_at(offset, &mut tag)?;
		if tag[0] != RECORD_VALUE {
			return Err(Error::Corruption(format!("expected value record at offset {}", offset)));
		}
		let mut key = vec![0u8; self.key_size as usize];
		self.file.read_at(offset + 1, &mut key)?;
		let mut len_buf = [0u8; 4];
		self.file.read_at(offset + 1 + self.key_size as u64, &mut len_buf)?;
		let value_len = u32::from_le_bytes(len_buf);
		let mut value = vec![0u8; value_len as usize];
		self.file.read_at(offset + 1 + self.key_size as u64 + 4, &mut value)?;
		Ok((key, value))
	}

	/// Reads only the key of the value record at `offset`, to confirm a
	/// hash match without paying for the (possibly large) value payload.
	pub fn read_key(&self, offset: u64) -> Result<Vec<u8>> {
		let mut tag = [0u8; 1];
		self.file.read_at(offset, &mut tag)?;
		if tag[0] != RECORD_VALUE {
			return Err(Error::Corruption(format!("expected value record at offset {}", offset)));
		}
		let mut key = vec![0u8; self.key_size as usize];
		self.file.read_at(offset + 1, &mut key)?;
		Ok(key)
	}

	pub fn read_spill_page(&self, offset: u64, block_size: u16) -> Result<Page> {
		let mut tag = [0u8; 1];
		self.file.read_at(offset, &mut tag)?;
		if tag[0] != RECORD_SPILL {
			return Err(Error::Corruption(format!("expected spill record at offset {}", offset)));
		}
		let mut buf = vec![0u8; block_size as usize];
		self.file.read_at(offset + 1, &mut buf)?;
		Page::decode(&buf, block_size)
	}
}

impl<F: FileProvider> SpillSource for DataFile<F> {
	fn read_spill(&self, offset: u64, block_size: u16) -> Result<Page> {
		self.read_spill_page(offset, block_size)
	}
}

#[derive(Debug, Clone)]
pub struct DecodedValueRecord {
	pub key: Vec<u8>,
	pub value: Vec<u8>,
}

/// Decodes a complete value record already held in memory: a bucket's
/// spill-less fetch candidate read from the data file, or (§4.4) a record
/// still sitting in the pending append buffer, not yet flushed to disk.
pub fn decode_value_record(buf: &[u8], key_size: u16) -> Result<DecodedValueRecord> {
	if buf.is_empty() || buf[0] != RECORD_VALUE {
		return Err(Error::Corruption("not a value record".into()));
	}
	let header_len = 1 + key_size as usize + 4;
	if buf.len() < header_len {
		return Err(Error::ShortRead);
	}
	let key = buf[1..1 + key_size as usize].to_vec();
	let value_len = u32::from_le_bytes(buf[1 + key_size as usize..header_len].try_into().unwrap()) as usize;
	if buf.len() < header_len + value_len {
		return Err(Error::ShortRead);
	}
	let value = buf[header_len..header_len + value_len].to_vec();
	Ok(DecodedValueRecord { key, value })
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn value_record_round_trips_length() {
		let key = vec![1u8; 8];
		let value = vec![2u8; 37];
		let rec = encode_value_record(&key, &value);
		assert_eq!(rec.len() as u64, value_record_len(8, 37));
		let decoded = decode_value_record(&rec, 8).unwrap();
		assert_eq!(decoded.key, key);
		assert_eq!(decoded.value, value);
	}

	#[test]
	fn spill_record_round_trips() {
		let page = Page { spill: 42, entries: vec![] };
		let rec = encode_spill_record(&page, 256);
		assert_eq!(rec.len() as u64, spill_record_len(256));
		assert_eq!(rec[0], RECORD_SPILL);
	}
}
