// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! The storage core of a LevelDB flavored LSM tree: an arena backed
//! memtable, the sorted table file format, the write ahead log framing and
//! the versioned file set persisted in the MANIFEST.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate num_derive;

#[macro_use]
pub mod util;
pub mod compaction;
pub mod db;
mod error;
pub mod filter;
pub mod iterator;
pub mod logger;
pub mod mem;
pub mod options;
pub mod record;
pub mod sstable;
pub mod storage;
pub mod version;

pub use compaction::{Compaction, CompactionReason};
pub use db::build_table;
pub use db::format::{InternalKey, InternalKeyComparator, LookupKey, ValueType};
pub use error::{Error, Result};
pub use filter::bloom::BloomFilter;
pub use filter::FilterPolicy;
pub use iterator::Iterator;
pub use mem::MemTable;
pub use options::{CompressionType, Options};
pub use sstable::table::{Table, TableBuilder};
pub use storage::file::FileStorage;
pub use storage::mem::MemStorage;
pub use util::comparator::{BytewiseComparator, Comparator};
pub use version::version_edit::{FileMetaData, VersionEdit};
pub use version::version_set::VersionSet;
pub use version::Version;
