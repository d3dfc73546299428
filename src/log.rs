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

//! The write-ahead log (§4.5 steps 3-4, §4.6). The log holds a header
//! followed by zero or more bucket pre-images: `[offset:8][block_size
//! bytes of the bucket's on-disk contents before this commit touches it]`.
//! A non-empty log on open means the prior commit did not reach step 7
//! and must be rolled back (recovery.rs).

use std::convert::TryInto;
use crate::codec::{LogHeader, LOG_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::file::FileProvider;

/// One bucket's pre-commit contents, recorded before the commit overwrites
/// it, so recovery can restore it verbatim.
pub struct PreImage {
	pub offset: u64,
	pub bytes: Vec<u8>,
}

pub struct LogWriter<'a, F: FileProvider> {
	file: &'a F,
	block_size: u16,
}

impl<'a, F: FileProvider> LogWriter<'a, F> {
	pub fn new(file: &'a F, block_size: u16) -> LogWriter<'a, F> {
		LogWriter { file, block_size }
	}

	/// Writes the log header, establishing the pre-commit file lengths and
	/// bucket count that recovery will roll back to.
	pub fn write_header(&self, header: &LogHeader) -> Result<()> {
		self.file.write_at(0, &header.encode())
	}

	/// Appends one bucket pre-image at the log's current logical end.
	pub fn append_pre_image(&self, image: &PreImage) -> Result<()> {
		if image.bytes.len() != self.block_size as usize {
			return Err(Error::InvalidArgument(format!(
				"pre-image length {} does not match block_size {}",
				image.bytes.len(),
				self.block_size
			)));
		}
		let mut record = Vec::with_capacity(8 + image.bytes.len());
		record.extend_from_slice(&image.offset.to_le_bytes());
		record.extend_from_slice(&image.bytes);
		self.file.append(&record)?;
		Ok(())
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}
}

pub struct LogReader {
	pub header: LogHeader,
	pub pre_images: Vec<PreImage>,
}

/// Reads a complete log file (header plus every pre-image record) into
/// memory. Logs are small relative to the data/key files, so recovery
/// reads the whole thing at once rather than streaming.
pub fn read_log<F: FileProvider>(file: &F, block_size: u16) -> Result<Option<LogReader>> {
	let len = file.size()?;
	if len == 0 {
		return Ok(None);
	}
	if len < LOG_HEADER_SIZE as u64 {
		return Err(Error::ShortRead);
	}
	let mut header_buf = vec![0u8; LOG_HEADER_SIZE];
	file.read_at(0, &mut header_buf)?;
	let header = LogHeader::decode(&header_buf)?;

	let record_size = 8 + block_size as u64;
	let body_len = len - LOG_HEADER_SIZE as u64;
	if body_len % record_size != 0 {
		return Err(Error::Corruption("log file truncated mid pre-image record".into()));
	}
	let count = body_len / record_size;
	let mut pre_images = Vec::with_capacity(count as usize);
	let mut pos = LOG_HEADER_SIZE as u64;
	for _ in 0..count {
		let mut rec = vec![0u8; record_size as usize];
		file.read_at(pos, &mut rec)?;
		let offset = u64::from_le_bytes(rec[0..8].try_into().unwrap());
		let bytes = rec[8..].to_vec();
		pre_images.push(PreImage { offset, bytes });
		pos += record_size;
	}
	Ok(Some(LogReader { header, pre_images }))
}
