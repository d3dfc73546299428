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

//! Byte-exact headers for the three files (§3 "Header records", §6 layouts).
//! Fixed little-endian byte order, independent of host platform.

use std::convert::TryInto;
use crate::error::{Error, Result};

pub const VERSION: u16 = 1;

pub const DATA_MAGIC: [u8; 8] = *b"SKBDATA1";
pub const KEY_MAGIC: [u8; 8] = *b"SKBKEYF1";
pub const LOG_MAGIC: [u8; 8] = *b"SKBLOGF1";

pub const DATA_HEADER_SIZE: usize = 64;
pub const KEY_HEADER_SIZE: usize = 128;
pub const LOG_HEADER_SIZE: usize = 64;

/// Tag byte prefixing every record in the data file.
pub const RECORD_VALUE: u8 = 1;
pub const RECORD_SPILL: u8 = 2;

struct Writer<'a> {
	buf: &'a mut [u8],
	pos: usize,
}

impl<'a> Writer<'a> {
	fn new(buf: &'a mut [u8]) -> Self {
		Writer { buf, pos: 0 }
	}
	fn bytes(&mut self, v: &[u8]) {
		self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
		self.pos += v.len();
	}
	fn u16(&mut self, v: u16) {
		self.bytes(&v.to_le_bytes());
	}
	fn u32(&mut self, v: u32) {
		self.bytes(&v.to_le_bytes());
	}
	fn u64(&mut self, v: u64) {
		self.bytes(&v.to_le_bytes());
	}
	fn f32(&mut self, v: f32) {
		self.bytes(&v.to_bits().to_le_bytes());
	}
}

struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Reader { buf, pos: 0 }
	}
	fn bytes(&mut self, n: usize) -> &'a [u8] {
		let slice = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		slice
	}
	fn u16(&mut self) -> u16 {
		u16::from_le_bytes(self.bytes(2).try_into().unwrap())
	}
	fn u32(&mut self) -> u32 {
		u32::from_le_bytes(self.bytes(4).try_into().unwrap())
	}
	fn u64(&mut self) -> u64 {
		u64::from_le_bytes(self.bytes(8).try_into().unwrap())
	}
	fn f32(&mut self) -> f32 {
		f32::from_bits(self.u32())
	}
}

fn checksum(buf: &[u8]) -> u32 {
	crc32fast::hash(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
	pub uid: u64,
	pub appnum: u64,
	pub salt: u64,
	pub key_size: u16,
}

impl DataHeader {
	pub fn encode(&self) -> [u8; DATA_HEADER_SIZE] {
		let mut out = [0u8; DATA_HEADER_SIZE];
		{
			let mut w = Writer::new(&mut out);
			w.bytes(&DATA_MAGIC);
			w.u16(VERSION);
			w.u16(self.key_size);
			w.u64(self.appnum);
			w.u64(self.salt);
			w.u64(self.uid);
		}
		let crc = checksum(&out[0..36]);
		out[36..40].copy_from_slice(&crc.to_le_bytes());
		out
	}

	pub fn decode(buf: &[u8]) -> Result<DataHeader> {
		if buf.len() < DATA_HEADER_SIZE {
			return Err(Error::ShortRead);
		}
		if buf[0..8] != DATA_MAGIC {
			return Err(Error::Corruption("data file magic mismatch".into()));
		}
		let crc = checksum(&buf[0..36]);
		let stored_crc = u32::from_le_bytes(buf[36..40].try_into().unwrap());
		if crc != stored_crc {
			return Err(Error::Corruption("data file header checksum mismatch".into()));
		}
		let mut r = Reader::new(buf);
		r.bytes(8); // magic
		let _version = r.u16();
		let key_size = r.u16();
		let appnum = r.u64();
		let salt = r.u64();
		let uid = r.u64();
		Ok(DataHeader { uid, appnum, salt, key_size })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHeader {
	pub uid: u64,
	pub appnum: u64,
	pub salt: u64,
	pub key_size: u16,
	pub block_size: u16,
	pub load_factor: f32,
	pub bucket_count: u64,
	/// Total live index entries across every bucket. Not named explicitly
	/// among the header fields in the format description, but persisted so
	/// commit can decide whether the load factor is exceeded without a full
	/// key-file scan; see DESIGN.md.
	pub key_count: u64,
}

impl KeyHeader {
	pub fn encode(&self) -> [u8; KEY_HEADER_SIZE] {
		let mut out = [0u8; KEY_HEADER_SIZE];
		{
			let mut w = Writer::new(&mut out);
			w.bytes(&KEY_MAGIC);
			w.u16(VERSION);
			w.u64(self.uid);
			w.u64(self.appnum);
			w.u64(self.salt);
			w.u16(self.key_size);
			w.u16(self.block_size);
			w.f32(self.load_factor);
			w.u64(self.bucket_count);
			w.u64(self.key_count);
		}
		let crc = checksum(&out[0..58]);
		out[58..62].copy_from_slice(&crc.to_le_bytes());
		out
	}

	pub fn decode(buf: &[u8]) -> Result<KeyHeader> {
		if buf.len() < KEY_HEADER_SIZE {
			return Err(Error::ShortRead);
		}
		if buf[0..8] != KEY_MAGIC {
			return Err(Error::Corruption("key file magic mismatch".into()));
		}
		let crc = checksum(&buf[0..58]);
		let stored_crc = u32::from_le_bytes(buf[58..62].try_into().unwrap());
		if crc != stored_crc {
			return Err(Error::Corruption("key file header checksum mismatch".into()));
		}
		let mut r = Reader::new(buf);
		r.bytes(8);
		let _version = r.u16();
		let uid = r.u64();
		let appnum = r.u64();
		let salt = r.u64();
		let key_size = r.u16();
		let block_size = r.u16();
		let load_factor = r.f32();
		let bucket_count = r.u64();
		let key_count = r.u64();
		Ok(KeyHeader { uid, appnum, salt, key_size, block_size, load_factor, bucket_count, key_count })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
	pub uid: u64,
	pub pre_commit_bucket_count: u64,
	pub pre_commit_key_length: u64,
	pub pre_commit_data_length: u64,
}

impl LogHeader {
	pub fn encode(&self) -> [u8; LOG_HEADER_SIZE] {
		let mut out = [0u8; LOG_HEADER_SIZE];
		{
			let mut w = Writer::new(&mut out);
			w.bytes(&LOG_MAGIC);
			w.u16(VERSION);
			w.u64(self.uid);
			w.u64(self.pre_commit_bucket_count);
			w.u64(self.pre_commit_key_length);
			w.u64(self.pre_commit_data_length);
		}
		let crc = checksum(&out[0..42]);
		out[42..46].copy_from_slice(&crc.to_le_bytes());
		out
	}

	pub fn decode(buf: &[u8]) -> Result<LogHeader> {
		if buf.len() < LOG_HEADER_SIZE {
			return Err(Error::ShortRead);
		}
		if buf[0..8] != LOG_MAGIC {
			return Err(Error::Corruption("log file magic mismatch".into()));
		}
		let crc = checksum(&buf[0..42]);
		let stored_crc = u32::from_le_bytes(buf[42..46].try_into().unwrap());
		if crc != stored_crc {
			return Err(Error::Corruption("log file header checksum mismatch".into()));
		}
		let mut r = Reader::new(buf);
		r.bytes(8);
		let _version = r.u16();
		let uid = r.u64();
		let pre_commit_bucket_count = r.u64();
		let pre_commit_key_length = r.u64();
		let pre_commit_data_length = r.u64();
		Ok(LogHeader { uid, pre_commit_bucket_count, pre_commit_key_length, pre_commit_data_length })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn data_header_round_trips() {
		let h = DataHeader { uid: 0xdead_beef, appnum: 7, salt: 42, key_size: 8 };
		let bytes = h.encode();
		assert_eq!(DataHeader::decode(&bytes).unwrap(), h);
	}

	#[test]
	fn key_header_round_trips() {
		let h = KeyHeader {
			uid: 99, appnum: 1, salt: 42, key_size: 8, block_size: 256,
			load_factor: 0.5, bucket_count: 16, key_count: 123,
		};
		let bytes = h.encode();
		assert_eq!(KeyHeader::decode(&bytes).unwrap(), h);
	}

	#[test]
	fn log_header_round_trips() {
		let h = LogHeader {
			uid: 5, pre_commit_bucket_count: 16, pre_commit_key_length: 4096, pre_commit_data_length: 64,
		};
		let bytes = h.encode();
		assert_eq!(LogHeader::decode(&bytes).unwrap(), h);
	}

	#[test]
	fn corrupted_checksum_is_rejected() {
		let h = DataHeader { uid: 1, appnum: 1, salt: 1, key_size: 8 };
		let mut bytes = h.encode();
		bytes[10] ^= 0xff;
		assert!(matches!(DataHeader::decode(&bytes), Err(Error::Corruption(_))));
	}
}
