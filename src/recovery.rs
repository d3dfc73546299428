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

//! Crash recovery (§4.6). Run once on open, before any other access, if
//! the log file is non-empty. Idempotent: re-running after a crash during
//! recovery itself produces the same end state, since every step
//! overwrites to a target recorded in the log header rather than applying
//! a relative delta.

use log::info;
use crate::error::{Error, Result};
use crate::file::FileProvider;
use crate::log::read_log;

/// Runs recovery against an already-open log/key/data file triple. Returns
/// `Ok(true)` if recovery actually rolled back a commit, `Ok(false)` if the
/// log was empty and there was nothing to do.
pub fn recover<F: FileProvider>(data_file: &F, key_file: &F, log_file: &F, uid: u64, block_size: u16) -> Result<bool> {
	let log = match read_log(log_file, block_size)? {
		Some(log) => log,
		None => return Ok(false),
	};

	if log.header.uid != uid {
		return Err(Error::UidMismatch);
	}

	info!(
		target: "seekbase",
		"recovering {} bucket pre-image(s), truncating key file to {} bytes and data file to {} bytes",
		log.pre_images.len(), log.header.pre_commit_key_length, log.header.pre_commit_data_length,
	);

	for image in &log.pre_images {
		key_file.write_at(image.offset, &image.bytes)?;
	}
	data_file.truncate(log.header.pre_commit_data_length)?;
	key_file.truncate(log.header.pre_commit_key_length)?;
	data_file.sync()?;
	key_file.sync()?;

	log_file.truncate(0)?;
	log_file.sync()?;

	Ok(true)
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::TempDir;
	use crate::codec::LogHeader;
	use crate::file::{FileSystem, NativeFs};
	use crate::log::{LogWriter, PreImage};

	fn open_tmp(name: &str) -> (TempDir, <NativeFs as FileSystem>::File) {
		let dir = TempDir::new().unwrap();
		let file = NativeFs::create(&dir.path().join(name)).unwrap();
		(dir, file)
	}

	#[test]
	fn no_log_is_a_no_op() {
		let (_d1, data) = open_tmp("t.dat");
		let (_d2, key) = open_tmp("t.key");
		let (_d3, log) = open_tmp("t.log");
		assert_eq!(recover(&data, &key, &log, 1, 64).unwrap(), false);
	}

	#[test]
	fn restores_pre_images_and_truncates() {
		let (_d1, data) = open_tmp("t.dat");
		let (_d2, key) = open_tmp("t.key");
		let (_d3, log) = open_tmp("t.log");

		data.append(&[0u8; 100]).unwrap();
		key.append(&[0u8; 200]).unwrap();
		key.write_at(64, &[0xAAu8; 64]).unwrap(); // simulate a half-finished commit

		let header = LogHeader { uid: 9, pre_commit_bucket_count: 2, pre_commit_key_length: 150, pre_commit_data_length: 80 };
		let writer = LogWriter::new(&log, 64);
		writer.write_header(&header).unwrap();
		writer.append_pre_image(&PreImage { offset: 64, bytes: vec![0u8; 64] }).unwrap();
		writer.sync().unwrap();

		assert_eq!(recover(&data, &key, &log, 9, 64).unwrap(), true);

		assert_eq!(data.size().unwrap(), 80);
		assert_eq!(key.size().unwrap(), 150);
		let mut restored = [0u8; 64];
		key.read_at(64, &mut restored).unwrap();
		assert_eq!(restored, [0u8; 64]);
		assert_eq!(log.size().unwrap(), 0);
	}

	#[test]
	fn uid_mismatch_is_rejected() {
		let (_d1, data) = open_tmp("t.dat");
		let (_d2, key) = open_tmp("t.key");
		let (_d3, log) = open_tmp("t.log");
		let header = LogHeader { uid: 1, pre_commit_bucket_count: 1, pre_commit_key_length: 1, pre_commit_data_length: 1 };
		LogWriter::new(&log, 64).write_header(&header).unwrap();
		assert!(matches!(recover(&data, &key, &log, 2, 64), Err(Error::UidMismatch)));
	}

	#[test]
	fn recovery_is_idempotent() {
		let (_d1, data) = open_tmp("t.dat");
		let (_d2, key) = open_tmp("t.key");
		let (_d3, log) = open_tmp("t.log");
		data.append(&[0u8; 100]).unwrap();
		key.append(&[0u8; 150]).unwrap();

		let header = LogHeader { uid: 3, pre_commit_bucket_count: 1, pre_commit_key_length: 128, pre_commit_data_length: 64 };
		let writer = LogWriter::new(&log, 64);
		writer.write_header(&header).unwrap();
		writer.append_pre_image(&PreImage { offset: 64, bytes: vec![1u8; 64] }).unwrap();
		writer.sync().unwrap();

		assert_eq!(recover(&data, &key, &log, 3, 64).unwrap(), true);
		// Log is now empty; running again must be a no-op that leaves state untouched.
		assert_eq!(recover(&data, &key, &log, 3, 64).unwrap(), false);
		assert_eq!(data.size().unwrap(), 64);
		assert_eq!(key.size().unwrap(), 128);
	}
}
