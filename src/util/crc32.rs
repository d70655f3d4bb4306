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

//! CRC32C helpers used by block trailers and log records.

use crc::crc32::{checksum_castagnoli, make_table, update, CASTAGNOLI};

const MASK_DELTA: u32 = 0xa282_ead8;

lazy_static! {
    static ref CASTAGNOLI_TABLE: [u32; 256] = make_table(CASTAGNOLI);
}

/// Returns the crc32c of `data`
#[inline]
pub fn value(data: &[u8]) -> u32 {
    checksum_castagnoli(data)
}

/// Returns the crc32c of `A ++ data` where `crc` is the crc32c of some string `A`
#[inline]
pub fn extend(crc: u32, data: &[u8]) -> u32 {
    update(crc, &CASTAGNOLI_TABLE, data)
}

/// Returns a masked representation of `crc`.
///
/// Computing the crc of a string that contains embedded crcs is
/// problematic, so checksums are always stored masked.
#[inline]
pub fn mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Returns the crc whose masked representation is `masked`
#[inline]
pub fn unmask(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}
