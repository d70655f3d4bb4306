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
// found in the LICENSE file. See the AUTHORS file for names of contributors.

use crate::db::format::{InternalFilterPolicy, InternalKeyComparator, INTERNAL_KEY_TAIL};
use crate::filter::FilterPolicy;
use crate::iterator::Iterator;
use crate::options::{CompressionType, Options};
use crate::sstable::block::{Block, BlockBuilder, BlockIterator};
use crate::sstable::filter_block::{FilterBlockBuilder, FilterBlockReader};
use crate::sstable::{BlockHandle, Footer, BLOCK_TRAILER_SIZE, FOOTER_ENCODED_LENGTH};
use crate::storage::File;
use crate::util::coding::{decode_fixed_32, put_fixed_32};
use crate::util::comparator::{BytewiseComparator, Comparator};
use crate::util::crc32::{extend, mask, unmask, value};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::sync::Arc;

const FILTER_META_PREFIX: &str = "filter.";

#[inline]
fn filter_meta_key(policy: &dyn FilterPolicy) -> String {
    FILTER_META_PREFIX.to_owned() + policy.name()
}

/// A `Table` is an immutable and persistent sorted map from internal keys to
/// values. A `Table` may be safely accessed from multiple threads without
/// external synchronization.
pub struct Table<C: Comparator, F: File> {
    icmp: InternalKeyComparator<C>,
    file: F,
    file_number: u64,
    file_size: u64,
    filter_reader: Option<FilterBlockReader>,
    meta_index_handle: BlockHandle,
    // the largest key and the handle of every data block
    index: Vec<(Vec<u8>, BlockHandle)>,
}

impl<C: Comparator, F: File> Table<C, F> {
    /// Opens the table stored in bytes `[0..file_size)` of `file` and reads
    /// the footer, the index block and the filter block.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if any of them is damaged
    pub fn open(file: F, file_number: u64, file_size: u64, options: &Options<C>) -> Result<Self> {
        if file_size < FOOTER_ENCODED_LENGTH as u64 {
            return Err(Error::Corruption(format!(
                "file {} is too short to be an sstable",
                file_number
            )));
        }
        let mut footer_space = vec![0; FOOTER_ENCODED_LENGTH];
        file.read_exact_at(&mut footer_space, file_size - FOOTER_ENCODED_LENGTH as u64)?;
        let (footer, _) = Footer::decode_from(&footer_space)?;

        let icmp = InternalKeyComparator::new(options.comparator.clone());
        let index_block = Block::new(read_block(&file, &footer.index_handle, file_size)?)?;
        let mut index = vec![];
        let mut iter = index_block.iter(icmp.clone());
        iter.seek_to_first();
        while iter.valid() {
            let (handle, _) = BlockHandle::decode_from(iter.value())?;
            index.push((iter.key().to_vec(), handle));
            iter.next();
        }
        iter.status()?;

        let mut t = Self {
            icmp,
            file,
            file_number,
            file_size,
            filter_reader: None,
            meta_index_handle: footer.meta_index_handle,
            index,
        };
        if let Some(policy) = &options.filter_policy {
            t.filter_reader = t.read_filter(policy.clone())?;
        }
        debug!(
            "Open table {} with {} data blocks, filter loaded: {}",
            file_number,
            t.index.len(),
            t.filter_reader.is_some()
        );
        Ok(t)
    }

    // Looks up the filter block written by `policy` through the meta index
    fn read_filter(&self, policy: Arc<dyn FilterPolicy>) -> Result<Option<FilterBlockReader>> {
        if self.meta_index_handle.size == 0 {
            return Ok(None);
        }
        let meta_block = Block::new(read_block(&self.file, &self.meta_index_handle, self.file_size)?)?;
        let mut iter = meta_block.iter(BytewiseComparator::default());
        let key = filter_meta_key(policy.as_ref());
        iter.seek(key.as_bytes());
        if iter.valid() && iter.key() == key.as_bytes() {
            let (handle, _) = BlockHandle::decode_from(iter.value())?;
            let filter_block = read_block(&self.file, &handle, self.file_size)?;
            let policy = Arc::new(InternalFilterPolicy::new(policy));
            return Ok(Some(FilterBlockReader::new(policy, filter_block)?));
        }
        iter.status()?;
        Ok(None)
    }

    #[inline]
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Returns the number of data blocks
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    // Returns the index of the first data block whose largest key >= `key`
    fn find_block(&self, key: &[u8]) -> usize {
        let (mut left, mut right) = (0, self.index.len());
        while left < right {
            let mid = (left + right) / 2;
            if self.icmp.compare(&self.index[mid].0, key) == Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        left
    }

    fn block_iter(&self, block_index: usize) -> Result<BlockIterator<InternalKeyComparator<C>>> {
        let (_, handle) = &self.index[block_index];
        let block = Block::new(read_block(&self.file, handle, self.file_size)?)?;
        Ok(block.iter(self.icmp.clone()))
    }

    /// Finds the first entry with a key equal or greater than the internal
    /// key `ikey` and returns the entry. The caller is responsible for
    /// checking whether the user key matches.
    pub fn internal_get(&self, ikey: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let i = self.find_block(ikey);
        if i == self.index.len() {
            return Ok(None);
        }
        if let Some(filter) = &self.filter_reader {
            if !filter.key_may_match(i, ikey) {
                return Ok(None);
            }
        }
        let mut iter = self.block_iter(i)?;
        iter.seek(ikey);
        if iter.valid() {
            return Ok(Some((iter.key().to_vec(), iter.value().to_vec())));
        }
        iter.status()?;
        Ok(None)
    }

    /// Returns an iterator over every entry in the table
    pub fn iter(self: &Arc<Self>) -> TableIterator<C, F> {
        TableIterator::new(self.clone())
    }
}

/// A two level iterator: the decoded index entries select a data block,
/// and a `BlockIterator` walks inside it.
pub struct TableIterator<C: Comparator, F: File> {
    table: Arc<Table<C, F>>,
    // the index of the current data block, `table.index.len()` if invalid
    block_index: usize,
    data_iter: Option<BlockIterator<InternalKeyComparator<C>>>,
    err: Option<Error>,
}

impl<C: Comparator, F: File> TableIterator<C, F> {
    pub fn new(table: Arc<Table<C, F>>) -> Self {
        let block_index = table.index.len();
        Self {
            table,
            block_index,
            data_iter: None,
            err: None,
        }
    }

    fn init_data_block(&mut self, block_index: usize) {
        self.block_index = block_index;
        if block_index >= self.table.index.len() {
            self.data_iter = None;
            return;
        }
        match self.table.block_iter(block_index) {
            Ok(iter) => self.data_iter = Some(iter),
            Err(e) => {
                self.err = Some(e);
                self.data_iter = None;
            }
        }
    }

    #[inline]
    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().map_or(false, |iter| iter.valid())
    }

    // Saves the error of an exhausted data block, returns false if the
    // iteration should stop
    fn save_data_status(&mut self) -> bool {
        if let Some(iter) = self.data_iter.as_mut() {
            if let Err(e) = iter.status() {
                self.err = Some(e);
            }
        }
        if self.err.is_some() {
            self.data_iter = None;
            return false;
        }
        true
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_valid() {
            if !self.save_data_status() || self.block_index + 1 >= self.table.index.len() {
                self.data_iter = None;
                self.block_index = self.table.index.len();
                return;
            }
            self.init_data_block(self.block_index + 1);
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_valid() {
            if !self.save_data_status() || self.block_index == 0 {
                self.data_iter = None;
                self.block_index = self.table.index.len();
                return;
            }
            self.init_data_block(self.block_index - 1);
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_last();
            }
        }
    }

    fn current(&self) -> &BlockIterator<InternalKeyComparator<C>> {
        match self.data_iter.as_ref() {
            Some(iter) if iter.valid() => iter,
            _ => panic!("[table iterator] use of an invalid iterator"),
        }
    }
}

impl<C: Comparator, F: File> Iterator for TableIterator<C, F> {
    fn valid(&self) -> bool {
        self.data_valid()
    }

    fn seek_to_first(&mut self) {
        self.init_data_block(0);
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        let len = self.table.index.len();
        if len == 0 {
            self.init_data_block(0);
            return;
        }
        self.init_data_block(len - 1);
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        let i = self.table.find_block(target);
        self.init_data_block(i);
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        if let Some(iter) = self.data_iter.as_mut() {
            iter.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        if let Some(iter) = self.data_iter.as_mut() {
            iter.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        self.current().key()
    }

    fn value(&self) -> &[u8] {
        self.current().value()
    }

    fn status(&mut self) -> Result<()> {
        if let Some(e) = self.err.take() {
            return Err(e);
        }
        match self.data_iter.as_mut() {
            Some(iter) => iter.status(),
            None => Ok(()),
        }
    }
}

/// `TableBuilder` writes the sorted entries of a table into a file. The file
/// is not closed unless `finish` is called with `sync`.
pub struct TableBuilder<C: Comparator, F: File> {
    icmp: InternalKeyComparator<C>,
    file: F,
    // bytes written so far
    offset: u64,
    data_block: BlockBuilder<InternalKeyComparator<C>>,
    index_block: BlockBuilder<InternalKeyComparator<C>>,
    last_key: Vec<u8>,
    num_entries: usize,
    closed: bool,
    filter_block: Option<FilterBlockBuilder>,
    filter_policy: Option<Arc<dyn FilterPolicy>>,

    block_size: usize,
    compression: CompressionType,
}

impl<C: Comparator, F: File> TableBuilder<C, F> {
    pub fn new(file: F, icmp: InternalKeyComparator<C>, options: &Options<C>) -> Self {
        let filter_block = options.filter_policy.as_ref().map(|p| {
            let policy: Arc<dyn FilterPolicy> = Arc::new(InternalFilterPolicy::new(p.clone()));
            FilterBlockBuilder::new(policy)
        });
        Self {
            data_block: BlockBuilder::new(options.block_restart_interval, icmp.clone()),
            // every index entry is a restart point
            index_block: BlockBuilder::new(1, icmp.clone()),
            icmp,
            file,
            offset: 0,
            last_key: vec![],
            num_entries: 0,
            closed: false,
            filter_block,
            filter_policy: options.filter_policy.clone(),
            block_size: options.block_size,
            compression: options.compression,
        }
    }

    /// Adds an internal key and its value to the table. The current data
    /// block is flushed first if the entry would make it reach `block_size`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invariant` if `key` is not after the previously added key
    ///
    /// # Panics
    ///
    /// Panics if the builder is closed
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.assert_not_closed();
        invariant!(
            key.len() >= INTERNAL_KEY_TAIL,
            "[table builder] {:?} is not an internal key",
            key
        );
        if self.num_entries > 0 {
            invariant!(
                self.icmp.compare(key, &self.last_key) == Ordering::Greater,
                "[table builder] key {:?} is not after the last key {:?}",
                key,
                &self.last_key
            );
        }
        if !self.data_block.is_empty()
            && self.data_block.assume_block_size(key, value) >= self.block_size
        {
            self.flush()?;
        }
        if let Some(fb) = self.filter_block.as_mut() {
            fb.add_key(key);
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);
        Ok(())
    }

    /// Writes the buffered data block into the file and records its largest
    /// key in the index block.
    ///
    /// # Panics
    ///
    /// Panics if the builder is closed
    pub fn flush(&mut self) -> Result<()> {
        self.assert_not_closed();
        if self.data_block.is_empty() {
            return Ok(());
        }
        let handle = {
            let raw = self.data_block.finish();
            let compressed = compress_block(raw, self.compression)?;
            match &compressed {
                Some(data) => write_raw_block(
                    &mut self.file,
                    data,
                    CompressionType::SnappyCompression,
                    &mut self.offset,
                )?,
                None => write_raw_block(
                    &mut self.file,
                    raw,
                    CompressionType::NoCompression,
                    &mut self.offset,
                )?,
            }
        };
        self.index_block
            .add(self.data_block.last_key(), &handle.encoded());
        self.data_block.reset();
        if let Some(fb) = self.filter_block.as_mut() {
            fb.generate_filter();
        }
        Ok(())
    }

    /// Finishes building the table and returns the file size. If `sync` is
    /// true, the file is synced and closed.
    ///
    /// # Panics
    ///
    /// Panics if the builder is closed
    pub fn finish(&mut self, sync: bool) -> Result<u64> {
        self.flush()?;
        self.closed = true;

        let mut meta_index_block = BlockBuilder::new(1, BytewiseComparator::default());
        if let (Some(fb), Some(policy)) = (self.filter_block.as_mut(), &self.filter_policy) {
            let filter_handle = write_raw_block(
                &mut self.file,
                fb.finish(),
                CompressionType::NoCompression,
                &mut self.offset,
            )?;
            meta_index_block.add(
                filter_meta_key(policy.as_ref()).as_bytes(),
                &filter_handle.encoded(),
            );
        }
        let meta_index_handle = write_raw_block(
            &mut self.file,
            meta_index_block.finish(),
            CompressionType::NoCompression,
            &mut self.offset,
        )?;
        let index_handle = write_raw_block(
            &mut self.file,
            self.index_block.finish(),
            CompressionType::NoCompression,
            &mut self.offset,
        )?;
        let footer = Footer::new(meta_index_handle, index_handle).encoded();
        self.file.write(&footer)?;
        self.offset += footer.len() as u64;
        if sync {
            self.file.flush()?;
            self.file.close()?;
        }
        Ok(self.offset)
    }

    /// Gives up the table. The written content is left as-is and the caller
    /// should remove the file.
    pub fn abandon(&mut self) {
        self.assert_not_closed();
        self.closed = true;
    }

    /// Returns the number of entries added so far
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Returns size of the file generated so far. If invoked after a successful
    /// `finish` call, returns the size of the final generated file.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    #[inline]
    fn assert_not_closed(&self) {
        assert!(
            !self.closed,
            "[table builder] try to handle a closed TableBuilder"
        );
    }
}

// Compresses the raw block with Snappy. Returns `None` if compression is
// disabled or saves less than 1/8 of the raw size.
fn compress_block(raw_block: &[u8], compression: CompressionType) -> Result<Option<Vec<u8>>> {
    match compression {
        CompressionType::SnappyCompression => {
            let compressed = snap::raw::Encoder::new()
                .compress_vec(raw_block)
                .map_err(Error::CompressionFailed)?;
            if compressed.len() < raw_block.len() - raw_block.len() / 8 {
                Ok(Some(compressed))
            } else {
                Ok(None)
            }
        }
        CompressionType::NoCompression | CompressionType::Unknown => Ok(None),
    }
}

// Writes the block contents followed by the trailer and returns the handle
// of the block
fn write_raw_block<F: File>(
    file: &mut F,
    data: &[u8],
    compression: CompressionType,
    offset: &mut u64,
) -> Result<BlockHandle> {
    file.write(data)?;
    let handle = BlockHandle::new(*offset, data.len() as u64);
    let mut trailer = Vec::with_capacity(BLOCK_TRAILER_SIZE);
    trailer.push(compression as u8);
    let crc = mask(extend(value(data), &[compression as u8]));
    put_fixed_32(&mut trailer, crc);
    file.write(&trailer)?;
    *offset += (data.len() + BLOCK_TRAILER_SIZE) as u64;
    Ok(handle)
}

/// Reads the block identified by `handle` from the first `file_size` bytes of
/// `file`, verifies its checksum and returns the uncompressed contents.
///
/// # Errors
///
/// Returns `Error::Corruption` on a handle pointing past `file_size`, a
/// checksum mismatch, an unknown compression type or a block that fails to
/// decompress
pub fn read_block<F: File>(file: &F, handle: &BlockHandle, file_size: u64) -> Result<Vec<u8>> {
    let end = handle
        .offset
        .checked_add(handle.size)
        .and_then(|n| n.checked_add(BLOCK_TRAILER_SIZE as u64));
    match end {
        Some(end) if end <= file_size => {}
        _ => {
            return Err(Error::Corruption(format!(
                "block handle [{}, {}) exceeds file size {}",
                handle.offset,
                handle.offset.saturating_add(handle.size),
                file_size
            )))
        }
    }
    let n = handle.size as usize;
    let mut buffer = vec![0; n + BLOCK_TRAILER_SIZE];
    file.read_exact_at(&mut buffer, handle.offset)?;
    let expected = unmask(decode_fixed_32(&buffer[n + 1..]));
    // Compression type is included in the checksum
    let actual = value(&buffer[..=n]);
    if expected != actual {
        return Err(Error::Corruption(format!(
            "block checksum mismatch at offset {}",
            handle.offset
        )));
    }
    match CompressionType::from(buffer[n]) {
        CompressionType::NoCompression => {
            buffer.truncate(n);
            Ok(buffer)
        }
        CompressionType::SnappyCompression => snap::raw::Decoder::new()
            .decompress_vec(&buffer[..n])
            .map_err(|e| {
                Error::Corruption(format!(
                    "block at offset {} fails to decompress: {}",
                    handle.offset, e
                ))
            }),
        CompressionType::Unknown => Err(Error::Corruption(format!(
            "bad block compression type {} at offset {}",
            buffer[n], handle.offset
        ))),
    }
}
