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

//! File provider abstraction (§6). The engine never assumes a particular
//! filesystem API; it is generic over `FileSystem`/`FileProvider` and a
//! native `std::fs`-backed implementation is supplied here, along with a
//! fault-injecting wrapper used only by the crash-recovery tests.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::{Error, Result};

/// Random-access operations the engine requires on a single open file.
pub trait FileProvider: Send + Sync {
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
	fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;
	fn append(&self, buf: &[u8]) -> Result<u64>;
	fn truncate(&self, len: u64) -> Result<()>;
	fn sync(&self) -> Result<()>;
	fn size(&self) -> Result<u64>;
	fn try_lock_exclusive(&self) -> Result<()>;
}

/// Creates, opens, and erases files of a particular `FileProvider` kind.
/// Kept separate from `FileProvider` itself because create/open/erase act
/// on a path, not an already-open file.
pub trait FileSystem: Send + Sync + 'static {
	type File: FileProvider;

	fn create(path: &Path) -> Result<Self::File>;
	fn open(path: &Path) -> Result<Self::File>;
	fn erase(path: &Path) -> Result<()>;
	fn exists(path: &Path) -> bool {
		path.exists()
	}
}

#[cfg(unix)]
fn disable_read_ahead(_file: &std::fs::File) -> Result<()> {
	Ok(())
}

#[cfg(target_os = "macos")]
fn disable_read_ahead(file: &std::fs::File) -> Result<()> {
	use std::os::unix::io::AsRawFd;
	if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_RDAHEAD, 0) } != 0 {
		Err(std::io::Error::last_os_error())?
	} else {
		Ok(())
	}
}

#[cfg(windows)]
fn disable_read_ahead(_file: &std::fs::File) -> Result<()> {
	Ok(())
}

/// `std::fs`-backed file, the engine's default file provider.
pub struct NativeFile {
	file: std::fs::File,
	len: AtomicU64,
}

impl NativeFile {
	fn from_file(file: std::fs::File) -> Result<NativeFile> {
		disable_read_ahead(&file)?;
		let len = file.metadata()?.len();
		Ok(NativeFile { file, len: AtomicU64::new(len) })
	}
}

impl FileProvider for NativeFile {
	#[cfg(unix)]
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
		use std::os::unix::fs::FileExt;
		self.file.read_exact_at(buf, offset)?;
		Ok(())
	}

	#[cfg(windows)]
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
		use std::os::windows::fs::FileExt;
		let mut total = 0;
		while total < buf.len() {
			let n = self.file.seek_read(&mut buf[total..], offset + total as u64)?;
			if n == 0 {
				return Err(Error::ShortRead);
			}
			total += n;
		}
		Ok(())
	}

	#[cfg(unix)]
	fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
		use std::os::unix::fs::FileExt;
		self.file.write_all_at(buf, offset)?;
		let end = offset + buf.len() as u64;
		self.len.fetch_max(end, Ordering::Relaxed);
		Ok(())
	}

	#[cfg(windows)]
	fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
		use std::os::windows::fs::FileExt;
		let mut total = 0;
		while total < buf.len() {
			let n = self.file.seek_write(&buf[total..], offset + total as u64)?;
			total += n;
		}
		let end = offset + buf.len() as u64;
		self.len.fetch_max(end, Ordering::Relaxed);
		Ok(())
	}

	fn append(&self, buf: &[u8]) -> Result<u64> {
		let offset = self.len.fetch_add(buf.len() as u64, Ordering::Relaxed);
		self.write_at(offset, buf)?;
		Ok(offset)
	}

	fn truncate(&self, len: u64) -> Result<()> {
		self.file.set_len(len)?;
		self.len.store(len, Ordering::Relaxed);
		Ok(())
	}

	fn sync(&self) -> Result<()> {
		self.file.sync_data()?;
		Ok(())
	}

	fn size(&self) -> Result<u64> {
		Ok(self.len.load(Ordering::Relaxed))
	}

	fn try_lock_exclusive(&self) -> Result<()> {
		use fs2::FileExt;
		self.file.try_lock_exclusive().map_err(|_| Error::Locked)
	}
}

/// Zero-sized marker selecting the native `std::fs` file system.
pub struct NativeFs;

impl FileSystem for NativeFs {
	type File = NativeFile;

	fn create(path: &Path) -> Result<NativeFile> {
		if path.exists() {
			return Err(Error::AlreadyExists(path.to_path_buf()));
		}
		let file = std::fs::OpenOptions::new().create_new(true).read(true).write(true).open(path)?;
		NativeFile::from_file(file)
	}

	fn open(path: &Path) -> Result<NativeFile> {
		if !path.exists() {
			return Err(Error::MissingFile(path.to_path_buf()));
		}
		let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
		NativeFile::from_file(file)
	}

	fn erase(path: &Path) -> Result<()> {
		if path.exists() {
			std::fs::remove_file(path)?;
		}
		Ok(())
	}
}
