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
use num_traits::FromPrimitive;
use std::io::SeekFrom;

/// Notified when log reader encounters corruption.
pub trait Reporter {
    /// Some corruption was detected.  "bytes" is the approximate number
    /// of bytes dropped due to the corruption.
    fn corruption(&mut self, bytes: u64, reason: &str);
}

enum Physical {
    // The type and the payload range in the block buffer
    Record(RecordType, usize, usize),
    // End of the file, or a truncated record a crashed writer left behind
    Eof,
    // A record that must be skipped. It has already been reported if it
    // was a real corruption
    Bad,
}

/// `Reader` reads the logical records written by `Writer` back from a log
/// file, starting at the first record at or after `initial_offset`.
pub struct Reader<F: File> {
    file: F,
    reporter: Option<Box<dyn Reporter>>,
    // The current block. `buf[start..end]` is still unread
    buf: Vec<u8>,
    start: usize,
    end: usize,
    // The last read returned less than a full block
    eof: bool,
    // Offset of the last record returned by `read_record`
    last_record_offset: u64,
    // Offset of the first location past the end of `buf`
    end_of_buffer_offset: u64,
    initial_offset: u64,
    // Skipping the tail fragments of a record that began before
    // `initial_offset`
    resyncing: bool,
}

impl<F: File> Reader<F> {
    pub fn new(file: F, reporter: Option<Box<dyn Reporter>>, initial_offset: u64) -> Self {
        Self {
            file,
            reporter,
            buf: vec![0; BLOCK_SIZE],
            start: 0,
            end: 0,
            eof: false,
            last_record_offset: 0,
            end_of_buffer_offset: 0,
            initial_offset,
            resyncing: initial_offset > 0,
        }
    }

    /// Reads the next logical record into `record`. Returns false when the
    /// input is exhausted.
    ///
    /// Damaged records are reported and skipped instead of failing.
    pub fn read_record(&mut self, record: &mut Vec<u8>) -> bool {
        if self.last_record_offset < self.initial_offset && !self.skip_to_initial_block() {
            return false;
        }
        record.clear();
        let mut in_fragmented_record = false;
        // Offset of the logical record being assembled
        let mut prospective_record_offset = 0;
        loop {
            match self.read_physical_record() {
                Physical::Record(t, start, end) => {
                    let fragment_len = (end - start) as u64;
                    let physical_record_offset = self.end_of_buffer_offset
                        - (self.end - self.start) as u64
                        - HEADER_SIZE as u64
                        - fragment_len;
                    if self.resyncing {
                        match t {
                            RecordType::Middle => continue,
                            RecordType::Last => {
                                self.resyncing = false;
                                continue;
                            }
                            _ => self.resyncing = false,
                        }
                    }
                    match t {
                        RecordType::Full => {
                            if in_fragmented_record && !record.is_empty() {
                                self.report_corruption(
                                    record.len() as u64,
                                    "partial record without end(1)",
                                );
                            }
                            record.clear();
                            record.extend_from_slice(&self.buf[start..end]);
                            self.last_record_offset = physical_record_offset;
                            return true;
                        }
                        RecordType::First => {
                            if in_fragmented_record && !record.is_empty() {
                                self.report_corruption(
                                    record.len() as u64,
                                    "partial record without end(2)",
                                );
                            }
                            prospective_record_offset = physical_record_offset;
                            record.clear();
                            record.extend_from_slice(&self.buf[start..end]);
                            in_fragmented_record = true;
                        }
                        RecordType::Middle => {
                            if in_fragmented_record {
                                record.extend_from_slice(&self.buf[start..end]);
                            } else {
                                self.report_corruption(
                                    fragment_len,
                                    "missing start of fragmented record(1)",
                                );
                            }
                        }
                        RecordType::Last => {
                            if in_fragmented_record {
                                record.extend_from_slice(&self.buf[start..end]);
                                self.last_record_offset = prospective_record_offset;
                                return true;
                            }
                            self.report_corruption(
                                fragment_len,
                                "missing start of fragmented record(2)",
                            );
                        }
                        RecordType::Zero => {
                            let dropped = fragment_len + record.len() as u64;
                            self.report_corruption(dropped, "unknown record type 0");
                            in_fragmented_record = false;
                            record.clear();
                        }
                    }
                }
                Physical::Eof => {
                    // A writer dying after the `First` fragment is not a
                    // corruption; the partial record is just dropped
                    record.clear();
                    return false;
                }
                Physical::Bad => {
                    if in_fragmented_record {
                        self.report_corruption(record.len() as u64, "error in middle of record");
                        in_fragmented_record = false;
                        record.clear();
                    }
                }
            }
        }
    }

    /// Returns the physical offset of the last record returned by
    /// `read_record`
    #[inline]
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    fn read_physical_record(&mut self) -> Physical {
        loop {
            if self.end - self.start < HEADER_SIZE {
                // the rest of the block is a zero filled trailer
                self.start = self.end;
                if self.eof {
                    // A truncated header at the end of the file is left by
                    // a writer crashing in the middle of writing it
                    return Physical::Eof;
                }
                match self.read_block() {
                    Ok(n) => {
                        self.end_of_buffer_offset += n as u64;
                        self.start = 0;
                        self.end = n;
                        if n < BLOCK_SIZE {
                            self.eof = true;
                        }
                    }
                    Err(e) => {
                        self.eof = true;
                        self.report_drop(BLOCK_SIZE as u64, &e.to_string());
                        return Physical::Eof;
                    }
                }
                continue;
            }

            let header = &self.buf[self.start..self.start + HEADER_SIZE];
            let length = header[0] as usize | (header[1] as usize) << 8;
            let type_byte = header[2];
            if HEADER_SIZE + length > self.end - self.start {
                let dropped = self.end - self.start;
                self.start = self.end;
                if !self.eof {
                    self.report_corruption(dropped as u64, "bad record length");
                    return Physical::Bad;
                }
                // The payload is cut off by the end of the file, which means
                // the writer died in the middle of the record
                return Physical::Eof;
            }

            if type_byte == RecordType::Zero as u8 && length == 0 {
                // Preallocated space with nothing written yet
                self.start = self.end;
                return Physical::Bad;
            }

            let payload_start = self.start + HEADER_SIZE;
            let payload_end = payload_start + length;
            self.start = payload_end;

            let physical_record_offset = self.end_of_buffer_offset
                - (self.end - self.start) as u64
                - (HEADER_SIZE + length) as u64;
            if physical_record_offset < self.initial_offset {
                return Physical::Bad;
            }

            return match RecordType::from_u8(type_byte) {
                Some(t) => Physical::Record(t, payload_start, payload_end),
                None => {
                    self.report_corruption(
                        length as u64,
                        &format!("unknown record type {}", type_byte),
                    );
                    Physical::Bad
                }
            };
        }
    }

    // Fills `buf` with the next block, stopping early only at the end of
    // the file
    fn read_block(&mut self) -> crate::Result<usize> {
        let mut n = 0;
        while n < BLOCK_SIZE {
            let read = self.file.read(&mut self.buf[n..])?;
            if read == 0 {
                break;
            }
            n += read;
        }
        Ok(n)
    }

    // Skips all blocks that are completely before `initial_offset`
    fn skip_to_initial_block(&mut self) -> bool {
        let offset_in_block = self.initial_offset % BLOCK_SIZE as u64;
        let mut block_start_location = self.initial_offset - offset_in_block;
        // Don't search a block if we'd be in the trailer
        if offset_in_block > (BLOCK_SIZE - HEADER_SIZE + 1) as u64 {
            block_start_location += BLOCK_SIZE as u64;
        }
        self.end_of_buffer_offset = block_start_location;
        if block_start_location > 0 {
            if let Err(e) = self.file.seek(SeekFrom::Start(block_start_location)) {
                self.report_drop(block_start_location, &e.to_string());
                return false;
            }
        }
        true
    }

    fn report_corruption(&mut self, bytes: u64, reason: &str) {
        self.report_drop(bytes, reason);
    }

    fn report_drop(&mut self, bytes: u64, reason: &str) {
        // Drops of bytes before `initial_offset` are expected
        let drop_start = self
            .end_of_buffer_offset
            .saturating_sub((self.end - self.start) as u64)
            .saturating_sub(bytes);
        if drop_start >= self.initial_offset {
            if let Some(reporter) = self.reporter.as_mut() {
                reporter.corruption(bytes, reason);
            }
        }
    }
}
