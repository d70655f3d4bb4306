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

use crate::record::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::storage::File;
use crate::Result;

const ZEROS: [u8; HEADER_SIZE - 1] = [0; HEADER_SIZE - 1];

/// Writer appends records to an underlying log `File`.
pub struct Writer<F: File> {
    dest: F,
    // Current offset in block
    block_offset: usize,
}

impl<F: File> Writer<F> {
    /// Creates a writer that will append data to an empty `dest`
    pub fn new(dest: F) -> Self {
        Self::new_with_offset(dest, 0)
    }

    /// Creates a writer that will append data to `dest` which already
    /// holds `dest_len` bytes
    pub fn new_with_offset(dest: F, dest_len: u64) -> Self {
        Self {
            dest,
            block_offset: (dest_len % BLOCK_SIZE as u64) as usize,
        }
    }

    /// Appends a logical record, splitting it across blocks when needed.
    /// An empty `s` still produces a zero-length `Full` record.
    pub fn add_record(&mut self, s: &[u8]) -> Result<()> {
        let mut left = s;
        let mut begin = true;
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // the trailer can't hold a header so fill it with zeros
                if leftover > 0 {
                    self.dest.write(&ZEROS[..leftover])?;
                }
                self.block_offset = 0;
            }
            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = left.len().min(avail);
            let end = fragment_len == left.len();
            let t = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };
            self.emit_physical_record(t, &left[..fragment_len])?;
            left = &left[fragment_len..];
            begin = false;
            if end {
                return Ok(());
            }
        }
    }

    /// Makes every appended record durable
    #[inline]
    pub fn sync(&mut self) -> Result<()> {
        self.dest.flush()
    }

    fn emit_physical_record(&mut self, t: RecordType, data: &[u8]) -> Result<()> {
        let size = data.len();
        debug_assert!(size <= 0xffff);
        debug_assert!(self.block_offset + HEADER_SIZE + size <= BLOCK_SIZE);
        let header = [(size & 0xff) as u8, (size >> 8) as u8, t as u8];

        self.dest.write(&header)?;
        self.dest.write(data)?;
        self.block_offset += HEADER_SIZE + size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem::MemStorage;
    use crate::storage::Storage;

    #[test]
    fn test_physical_record_layout() {
        let storage = MemStorage::default();
        let f = storage.create("log").unwrap();
        let mut w = Writer::new(f);
        w.add_record(b"hello").unwrap();
        let mut data = vec![];
        storage.open("log").unwrap().read_all(&mut data).unwrap();
        assert_eq!(data.len(), HEADER_SIZE + 5);
        assert_eq!(&data[..HEADER_SIZE], &[5, 0, RecordType::Full as u8]);
        assert_eq!(&data[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_resume_offset() {
        let storage = MemStorage::default();
        let f = storage.create("log").unwrap();
        let mut w = Writer::new_with_offset(f, (BLOCK_SIZE * 3 - 2) as u64);
        w.add_record(b"x").unwrap();
        let mut data = vec![];
        storage.open("log").unwrap().read_all(&mut data).unwrap();
        // two bytes of padding and then a fresh block
        assert_eq!(data.len(), 2 + HEADER_SIZE + 1);
        assert_eq!(&data[..2], &[0, 0]);
        assert_eq!(data[2 + 2], RecordType::Full as u8);
    }
}
