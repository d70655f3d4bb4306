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

// Copyright (c) 2011 The LevelDB Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::db::format::InternalKey;
use crate::util::collection::HashSet;
use crate::util::varint::{VarintU32, VarintU64};
use crate::{Error, Result};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

// Tags for the VersionEdit disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Comparator = 1,
    LogNumber = 2,
    PrevLogNumber = 3,
    NextFileNumber = 4,
    LastSequence = 5,
    CompactPointer = 6,
    DeletedFile = 7,
    // 8 was used for large value refs
    NewFile = 9,
}

impl Tag {
    fn from_u32(i: u32) -> Option<Tag> {
        let tag = match i {
            1 => Tag::Comparator,
            2 => Tag::LogNumber,
            3 => Tag::PrevLogNumber,
            4 => Tag::NextFileNumber,
            5 => Tag::LastSequence,
            6 => Tag::CompactPointer,
            7 => Tag::DeletedFile,
            9 => Tag::NewFile,
            _ => return None,
        };
        Some(tag)
    }
}

/// Metadata of a sst file. Never altered once added into a `Version`
/// except `allowed_seeks`.
pub struct FileMetaData {
    // Seeks allowed until compaction
    //
    // A seek in a level n file might miss because the key range overlaps
    // with files in level n + 1, and the IO spent on level n is wasted.
    // When too many seeks miss in one file, the file is worth compacting.
    pub allowed_seeks: AtomicUsize,
    // File size in bytes
    pub file_size: u64,
    // the file number
    pub number: u64,
    // Smallest internal key served by table
    pub smallest: InternalKey,
    // Largest internal key served by table
    pub largest: InternalKey,
}

impl FileMetaData {
    pub fn new(number: u64, file_size: u64, smallest: InternalKey, largest: InternalKey) -> Self {
        Self {
            allowed_seeks: AtomicUsize::new(0),
            file_size,
            number,
            smallest,
            largest,
        }
    }

    /// Sets `allowed_seeks` by the file size.
    ///
    /// We arrange to automatically compact this file after a certain number
    /// of seeks. Assume:
    ///   (1) One seek costs 10ms
    ///   (2) Writing or reading 1MB costs 10ms (100MB/s)
    ///   (3) A compaction of 1MB does 25MB of IO
    ///
    /// So 25 seeks cost as much as compacting 1MB of data, i.e. one seek
    /// costs about the same as the compaction of 40KB. We are a little
    /// conservative and allow approximately one seek for every 16KB of data
    /// before triggering a compaction.
    pub fn init_allowed_seeks(&self) {
        let allowed = ((self.file_size / 16384) as usize).max(100);
        self.allowed_seeks.store(allowed, Ordering::Release);
    }
}

impl Default for FileMetaData {
    fn default() -> Self {
        Self::new(0, 0, InternalKey::default(), InternalKey::default())
    }
}

impl Clone for FileMetaData {
    fn clone(&self) -> Self {
        Self {
            allowed_seeks: AtomicUsize::new(self.allowed_seeks.load(Ordering::Acquire)),
            file_size: self.file_size,
            number: self.number,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
        }
    }
}

impl PartialEq for FileMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.file_size == other.file_size
            && self.smallest == other.smallest
            && self.largest == other.largest
    }
}

impl Debug for FileMetaData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "#{}({} bytes) [{:?} .. {:?}]",
            self.number, self.file_size, self.smallest, self.largest
        )
    }
}

/// The file changes carried by a `VersionEdit`
#[derive(Default, Clone, Debug, PartialEq)]
pub struct FileDelta {
    // (level, InternalKey)
    pub compaction_pointers: Vec<(usize, InternalKey)>,
    // (level, file_number)
    pub deleted_files: HashSet<(usize, u64)>,
    // (level, FileMetaData)
    pub new_files: Vec<(usize, FileMetaData)>,
}

/// A summary for version updating
/// Version(old) + VersionEdit = Version(new)
#[derive(Clone, PartialEq)]
pub struct VersionEdit {
    max_levels: usize,
    // comparator name
    pub comparator_name: Option<String>,
    // file number of .log
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    // the last used sequence number
    pub last_sequence: Option<u64>,

    pub file_delta: FileDelta,
}

impl VersionEdit {
    pub fn new(max_levels: usize) -> Self {
        Self {
            max_levels,
            comparator_name: None,
            log_number: None,
            prev_log_number: None,
            next_file_number: None,
            last_sequence: None,
            file_delta: FileDelta::default(),
        }
    }

    /// Resets every field
    #[inline]
    pub fn clear(&mut self) {
        self.comparator_name = None;
        self.log_number = None;
        self.prev_log_number = None;
        self.next_file_number = None;
        self.last_sequence = None;
        self.file_delta = FileDelta::default();
    }

    /// Add the specified file at the specified level
    pub fn add_file(
        &mut self,
        level: usize,
        file_number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.file_delta.new_files.push((
            level,
            FileMetaData::new(file_number, file_size, smallest, largest),
        ))
    }

    /// Delete the specified file from the specified level
    #[inline]
    pub fn delete_file(&mut self, level: usize, file_number: u64) {
        self.file_delta.deleted_files.insert((level, file_number));
    }

    #[inline]
    pub fn add_compaction_pointer(&mut self, level: usize, key: InternalKey) {
        self.file_delta.compaction_pointers.push((level, key))
    }

    #[inline]
    pub fn set_comparator_name(&mut self, name: &str) {
        self.comparator_name = Some(name.to_owned());
    }

    #[inline]
    pub fn set_log_number(&mut self, log_num: u64) {
        self.log_number = Some(log_num);
    }

    #[inline]
    pub fn set_prev_log_number(&mut self, num: u64) {
        self.prev_log_number = Some(num);
    }

    #[inline]
    pub fn set_next_file(&mut self, file_num: u64) {
        self.next_file_number = Some(file_num);
    }

    #[inline]
    pub fn set_last_sequence(&mut self, seq: u64) {
        self.last_sequence = Some(seq);
    }

    /// Convert into bytes and push into given `dst`
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        if let Some(cmp_name) = &self.comparator_name {
            VarintU32::put_varint(dst, Tag::Comparator as u32);
            VarintU32::put_varint_prefixed_slice(dst, cmp_name.as_bytes());
        }
        let numbers = [
            (Tag::LogNumber, self.log_number),
            (Tag::PrevLogNumber, self.prev_log_number),
            (Tag::NextFileNumber, self.next_file_number),
            (Tag::LastSequence, self.last_sequence),
        ];
        for (tag, n) in numbers.iter() {
            if let Some(n) = n {
                VarintU32::put_varint(dst, *tag as u32);
                VarintU64::put_varint(dst, *n);
            }
        }

        for (level, key) in self.file_delta.compaction_pointers.iter() {
            VarintU32::put_varint(dst, Tag::CompactPointer as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU32::put_varint_prefixed_slice(dst, key.data());
        }

        // sorted for a stable output
        let mut deleted: Vec<&(usize, u64)> = self.file_delta.deleted_files.iter().collect();
        deleted.sort();
        for (level, file_num) in deleted {
            VarintU32::put_varint(dst, Tag::DeletedFile as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU64::put_varint(dst, *file_num);
        }

        for (level, file_meta) in self.file_delta.new_files.iter() {
            VarintU32::put_varint(dst, Tag::NewFile as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU64::put_varint(dst, file_meta.number);
            VarintU64::put_varint(dst, file_meta.file_size);
            VarintU32::put_varint_prefixed_slice(dst, file_meta.smallest.data());
            VarintU32::put_varint_prefixed_slice(dst, file_meta.largest.data());
        }
    }

    /// Decodes the edit from `src`. The previous content is cleared first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` on an unknown tag, a truncated field or a
    /// level out of range
    pub fn decoded_from(&mut self, src: &[u8]) -> Result<()> {
        self.clear();
        let mut s = src;
        while !s.is_empty() {
            let tag = match VarintU32::drain_read(&mut s) {
                Some(t) => t,
                None => return Err(edit_corruption("invalid tag")),
            };
            let tag = Tag::from_u32(tag).ok_or_else(|| edit_corruption("unknown tag"))?;
            match tag {
                Tag::Comparator => {
                    let name = VarintU32::drain_prefixed_slice(&mut s)
                        .ok_or_else(|| edit_corruption("comparator name"))?;
                    let name = String::from_utf8(name.to_vec())
                        .map_err(|_| edit_corruption("comparator name"))?;
                    self.comparator_name = Some(name);
                }
                Tag::LogNumber => {
                    self.log_number = Some(read_u64(&mut s, "log number")?);
                }
                Tag::PrevLogNumber => {
                    self.prev_log_number = Some(read_u64(&mut s, "previous log number")?);
                }
                Tag::NextFileNumber => {
                    self.next_file_number = Some(read_u64(&mut s, "next file number")?);
                }
                Tag::LastSequence => {
                    self.last_sequence = Some(read_u64(&mut s, "last sequence number")?);
                }
                Tag::CompactPointer => {
                    let level = get_level(self.max_levels, &mut s)
                        .ok_or_else(|| edit_corruption("compaction pointer"))?;
                    let key = get_internal_key(&mut s)
                        .ok_or_else(|| edit_corruption("compaction pointer"))?;
                    self.file_delta.compaction_pointers.push((level, key));
                }
                Tag::DeletedFile => {
                    let level = get_level(self.max_levels, &mut s)
                        .ok_or_else(|| edit_corruption("deleted file"))?;
                    let number = read_u64(&mut s, "deleted file")?;
                    self.file_delta.deleted_files.insert((level, number));
                }
                Tag::NewFile => {
                    let file = get_level(self.max_levels, &mut s).and_then(|level| {
                        let number = VarintU64::drain_read(&mut s)?;
                        let file_size = VarintU64::drain_read(&mut s)?;
                        let smallest = get_internal_key(&mut s)?;
                        let largest = get_internal_key(&mut s)?;
                        Some((
                            level,
                            FileMetaData::new(number, file_size, smallest, largest),
                        ))
                    });
                    match file {
                        Some(f) => self.file_delta.new_files.push(f),
                        None => return Err(edit_corruption("new-file entry")),
                    }
                }
            }
        }
        Ok(())
    }
}

impl Debug for VersionEdit {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "VersionEdit {{")?;
        if let Some(comparator) = &self.comparator_name {
            write!(f, "\n  Comparator: {}", comparator)?;
        }
        if let Some(log_number) = &self.log_number {
            write!(f, "\n  LogNumber: {}", log_number)?;
        }
        if let Some(prev_log_num) = &self.prev_log_number {
            write!(f, "\n  PrevLogNumber: {}", prev_log_num)?;
        }
        if let Some(next_file_num) = &self.next_file_number {
            write!(f, "\n  NextFile: {}", next_file_num)?;
        }
        if let Some(last_seq) = &self.last_sequence {
            write!(f, "\n  LastSeq: {}", last_seq)?;
        }
        for (level, key) in self.file_delta.compaction_pointers.iter() {
            write!(f, "\n  CompactPointer: {} {:?}", level, key)?;
        }
        for (level, file_num) in self.file_delta.deleted_files.iter() {
            write!(f, "\n  DeleteFile: {} {}", level, file_num)?;
        }
        for (level, meta) in self.file_delta.new_files.iter() {
            write!(f, "\n  AddFile: {} {:?}", level, meta)?;
        }
        write!(f, "\n}}")
    }
}

#[inline]
fn edit_corruption(field: &str) -> Error {
    Error::Corruption(format!("VersionEdit: {}", field))
}

#[inline]
fn read_u64(src: &mut &[u8], field: &str) -> Result<u64> {
    VarintU64::drain_read(src).ok_or_else(|| edit_corruption(field))
}

fn get_internal_key(src: &mut &[u8]) -> Option<InternalKey> {
    VarintU32::drain_prefixed_slice(src).map(InternalKey::decoded_from)
}

fn get_level(max_levels: usize, src: &mut &[u8]) -> Option<usize> {
    VarintU32::drain_read(src)
        .map(|l| l as usize)
        .filter(|l| *l < max_levels)
}
