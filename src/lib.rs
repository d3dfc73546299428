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

//! Append-only, insert-only key/value store. Keys are fixed-length;
//! values are variable-length blobs. Once inserted, a key's value is
//! immutable — there is no update, delete, or range scan.
//!
//! A database is three files: a data file of sequentially appended value
//! and spill records, a key file of fixed-size bucket pages addressed by a
//! linear-hashing scheme, and a write-ahead log that makes each commit
//! atomic against crashes. See [`Store`] for the public entry point.

mod bucket;
mod cache;
mod codec;
mod commit;
mod data;
mod display;
mod error;
mod file;
mod hash;
mod index;
mod log;
mod options;
mod pending;
mod recovery;
mod store;
mod verify;

pub use crate::error::{Error, Result};
pub use crate::file::{FileProvider, FileSystem, NativeFile, NativeFs};
pub use crate::hash::{Blake2Hasher, StoreHasher};
pub use crate::options::{CreateOptions, OpenOptions, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use crate::store::{Paths, Store, DEFAULT_COMMIT_THRESHOLD_BYTES};
pub use crate::verify::VerifyReport;

#[cfg(test)]
pub use crate::file::testing::{with_fail_counter, FailCounter, FailingFs};
