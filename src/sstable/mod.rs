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

//! Sorted string table files.
//!
//! ```text
//! <beginning_of_file>
//! [data block 1]
//! [data block 2]
//! ...
//! [data block N]
//! [filter block]
//! [meta index block]
//! [index block]
//! [footer]                  (fixed size 48 bytes)
//! <end_of_file>
//! ```
//!
//! Every block except the footer is followed by a 5 bytes trailer:
//! the compression type and the masked crc32c of `block ++ type`.

pub mod block;
pub mod filter_block;
pub mod table;

use crate::util::coding::{decode_fixed_32, put_fixed_32};
use crate::util::varint::{VarintU64, MAX_VARINT_LEN_U64};
use crate::{Error, Result};

/// 1 byte compression type + 4 bytes crc
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Maximum encoding length of a `BlockHandle`
pub const MAX_BLOCK_HANDLE_ENCODE_LENGTH: usize = 2 * MAX_VARINT_LEN_U64;

/// Encoded length of a `Footer`: two padded handles and the magic number
pub const FOOTER_ENCODED_LENGTH: usize = 2 * MAX_BLOCK_HANDLE_ENCODE_LENGTH + 8;

pub const TABLE_MAGIC_NUMBER: u64 = 0xbf92_0e17_98af_f023;

/// `BlockHandle` is a pointer to the extent of a file that stores a data
/// block or a meta block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockHandle {
    pub offset: u64,
    // the size of the block contents, excluding the trailer
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Appends the varint encoded handle into `dst`
    #[inline]
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        VarintU64::put_varint(dst, self.offset);
        VarintU64::put_varint(dst, self.size);
    }

    #[inline]
    pub fn encoded(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(MAX_BLOCK_HANDLE_ENCODE_LENGTH);
        self.encode_to(&mut v);
        v
    }

    /// Decodes a handle from the head of `src` and returns it with the
    /// number of bytes consumed.
    pub fn decode_from(src: &[u8]) -> Result<(Self, usize)> {
        if let Some((offset, n)) = VarintU64::read(src) {
            if let Some((size, m)) = VarintU64::read(&src[n..]) {
                return Ok((Self::new(offset, size), n + m));
            }
        }
        Err(Error::Corruption("bad block handle".to_owned()))
    }
}

/// `Footer` encapsulates the fixed information stored at the tail end of
/// every table file.
#[derive(Debug, Eq, PartialEq)]
pub struct Footer {
    pub meta_index_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn new(meta_index_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self {
            meta_index_handle,
            index_handle,
        }
    }

    /// Decodes a `Footer` from the given `src` bytes and returns it with
    /// the decoded length.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if `src` is too short, the magic number
    /// does not match or a handle is malformed
    pub fn decode_from(src: &[u8]) -> Result<(Self, usize)> {
        if src.len() < FOOTER_ENCODED_LENGTH {
            return Err(Error::Corruption(format!(
                "footer too short: {} bytes",
                src.len()
            )));
        }
        let magic_offset = FOOTER_ENCODED_LENGTH - 8;
        let magic_lo = decode_fixed_32(&src[magic_offset..]);
        let magic_hi = decode_fixed_32(&src[magic_offset + 4..]);
        let magic = (u64::from(magic_hi) << 32) | u64::from(magic_lo);
        if magic != TABLE_MAGIC_NUMBER {
            return Err(Error::Corruption(format!(
                "not an sstable (bad magic number {:#x})",
                magic
            )));
        }
        let (meta_index_handle, n) = BlockHandle::decode_from(&src[..magic_offset])?;
        let (index_handle, _) = BlockHandle::decode_from(&src[n..magic_offset])?;
        Ok((
            Self {
                meta_index_handle,
                index_handle,
            },
            FOOTER_ENCODED_LENGTH,
        ))
    }

    /// Encodes the footer into exactly `FOOTER_ENCODED_LENGTH` bytes
    pub fn encoded(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(FOOTER_ENCODED_LENGTH);
        self.meta_index_handle.encode_to(&mut v);
        self.index_handle.encode_to(&mut v);
        v.resize(2 * MAX_BLOCK_HANDLE_ENCODE_LENGTH, 0);
        put_fixed_32(&mut v, (TABLE_MAGIC_NUMBER & 0xffff_ffff) as u32);
        put_fixed_32(&mut v, (TABLE_MAGIC_NUMBER >> 32) as u32);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_handle() {
        let tests = vec![
            (BlockHandle::new(0, 0), 2),
            (BlockHandle::new(127, 128), 3),
            (BlockHandle::new(1 << 32, 300), 7),
            (BlockHandle::new(u64::max_value(), u64::max_value()), 20),
        ];
        for (handle, len) in tests {
            let encoded = handle.encoded();
            assert_eq!(encoded.len(), len);
            let (decoded, n) = BlockHandle::decode_from(&encoded).unwrap();
            assert_eq!(decoded, handle);
            assert_eq!(n, len);
            assert!(BlockHandle::decode_from(&encoded[..len - 1])
                .unwrap_err()
                .is_corruption());
        }
    }

    #[test]
    fn test_footer() {
        let footer = Footer::new(BlockHandle::new(300, 100), BlockHandle::new(401, 1000));
        let encoded = footer.encoded();
        assert_eq!(encoded.len(), FOOTER_ENCODED_LENGTH);
        assert_eq!(
            &encoded[40..],
            &[0x23, 0xf0, 0xaf, 0x98, 0x17, 0x0e, 0x92, 0xbf]
        );
        let (decoded, n) = Footer::decode_from(&encoded).unwrap();
        assert_eq!(n, FOOTER_ENCODED_LENGTH);
        assert_eq!(decoded, footer);
    }

    #[test]
    fn test_corrupted_footer() {
        let footer = Footer::new(BlockHandle::new(1, 2), BlockHandle::new(3, 4)).encoded();
        let mut tests = vec![];
        // too short
        tests.push(footer[..FOOTER_ENCODED_LENGTH - 1].to_vec());
        // any bit of the magic number flipped
        for i in 40..48 {
            let mut bad = footer.clone();
            bad[i] ^= 0x01;
            tests.push(bad);
        }
        // handle with a varint never terminating
        let mut bad_handle = vec![0xff; 40];
        bad_handle.extend_from_slice(&footer[40..]);
        tests.push(bad_handle);
        for data in tests {
            assert!(Footer::decode_from(&data).unwrap_err().is_corruption());
        }
    }
}
