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

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	InvalidArgument(String),
	AlreadyExists(std::path::PathBuf),
	MissingFile(std::path::PathBuf),
	UidMismatch,
	InvalidKeySize { expected: u16, actual: u16 },
	InvalidBlockSize { expected: u16, actual: u16 },
	KeyExists,
	KeyNotFound,
	ShortRead,
	Corruption(String),
	Locked,
	Io(std::io::Error),
	#[cfg(test)]
	Failure,
}

impl Error {
	pub fn invalid_argument(msg: impl Into<String>) -> Error {
		Error::InvalidArgument(msg.into())
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
			Error::AlreadyExists(path) => write!(f, "file already exists: {}", path.display()),
			Error::MissingFile(path) => write!(f, "file not found: {}", path.display()),
			Error::UidMismatch => write!(f, "database file UIDs do not match"),
			Error::InvalidKeySize { expected, actual } =>
				write!(f, "invalid key size: expected {}, found {} on disk", expected, actual),
			Error::InvalidBlockSize { expected, actual } =>
				write!(f, "invalid block size: expected {}, found {} on disk", expected, actual),
			Error::KeyExists => write!(f, "key already exists"),
			Error::KeyNotFound => write!(f, "key not found"),
			Error::ShortRead => write!(f, "short read: file ended before a record was fully read"),
			Error::Corruption(msg) => write!(f, "corruption detected: {}", msg),
			Error::Locked => write!(f, "database is locked by another instance"),
			Error::Io(e) => write!(f, "i/o error: {}", e),
			#[cfg(test)]
			Error::Failure => write!(f, "synthetic failure injected for testing"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		if e.kind() == std::io::ErrorKind::UnexpectedEof {
			Error::ShortRead
		} else {
			Error::Io(e)
		}
	}
}

impl PartialEq for Error {
	fn eq(&self, other: &Error) -> bool {
		match (self, other) {
			(Error::InvalidArgument(a), Error::InvalidArgument(b)) => a == b,
			(Error::AlreadyExists(a), Error::AlreadyExists(b)) => a == b,
			(Error::MissingFile(a), Error::MissingFile(b)) => a == b,
			(Error::UidMismatch, Error::UidMismatch) => true,
			(Error::InvalidKeySize { expected: e1, actual: a1 }, Error::InvalidKeySize { expected: e2, actual: a2 }) =>
				e1 == e2 && a1 == a2,
			(Error::InvalidBlockSize { expected: e1, actual: a1 }, Error::InvalidBlockSize { expected: e2, actual: a2 }) =>
				e1 == e2 && a1 == a2,
			(Error::KeyExists, Error::KeyExists) => true,
			(Error::KeyNotFound, Error::KeyNotFound) => true,
			(Error::ShortRead, Error::ShortRead) => true,
			(Error::Corruption(a), Error::Corruption(b)) => a == b,
			(Error::Locked, Error::Locked) => true,
			(Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
			#[cfg(test)]
			(Error::Failure, Error::Failure) => true,
			_ => false,
		}
	}
}
