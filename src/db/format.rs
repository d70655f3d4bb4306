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

use crate::filter::FilterPolicy;
use crate::util::coding::{decode_fixed_64, put_fixed_64};
use crate::util::comparator::Comparator;
use crate::util::varint::VarintU32;
use crate::{Error, Result};
use num_traits::FromPrimitive;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// The max key sequence number. The value is 2^56 - 1 because the seq number
/// only takes 56 bits when is serialized to `InternalKey`
pub const MAX_KEY_SEQUENCE: u64 = (1u64 << 56) - 1;

/// The tail bytes length of an internal key
/// 7bytes sequence number + 1byte type number
pub const INTERNAL_KEY_TAIL: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
pub enum ValueType {
    /// A value indicates that the key is deleted
    Deletion = 0,
    /// A normal value
    Value = 1,
}

/// `VALUE_TYPE_FOR_SEEK` defines the `ValueType` that should be passed when
/// constructing a `ParsedInternalKey` for seeking to a particular
/// sequence number (since we sort sequence numbers in decreasing order
/// and the value type is embedded as the low 8 bits in the sequence
/// number in internal keys, we need to use the highest-numbered
/// ValueType, not the lowest).
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

/// `ParsedInternalKey` is the decoded view of an internal key.
/// A `ParsedInternalKey` can be encoded into a `InternalKey` by `encode()`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub seq: u64,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(user_key: &'a [u8], seq: u64, value_type: ValueType) -> Self {
        ParsedInternalKey {
            user_key,
            seq,
            value_type,
        }
    }

    /// Decodes an internal key. Keys shorter than the 8 bytes tag or with an
    /// unknown value type are corruption.
    pub fn decode_from(internal_key: &'a [u8]) -> Result<Self> {
        let size = internal_key.len();
        if size < INTERNAL_KEY_TAIL {
            return Err(Error::Corruption(format!(
                "internal key too short: {} bytes",
                size
            )));
        }
        let (seq, value_type) = extract_seq_and_type(internal_key)?;
        Ok(Self {
            user_key: &internal_key[..size - INTERNAL_KEY_TAIL],
            seq,
            value_type,
        })
    }

    /// Returns a `InternalKey` encoded from the `ParsedInternalKey` using
    /// the format described in the below comment of `InternalKey`
    #[inline]
    pub fn encode(&self) -> InternalKey {
        InternalKey::new(self.user_key, self.seq, self.value_type)
    }
}

impl<'a> Debug for ParsedInternalKey<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} @ {} : {:?}",
            String::from_utf8_lossy(self.user_key),
            self.seq,
            self.value_type
        )
    }
}

/// A `InternalKey` is an owned encoding of a `ParsedInternalKey`
///
/// The format of `InternalKey`:
///
/// ```text
/// | ----------- n bytes ----------- | --- 7 bytes --- | - 1 byte - |
///              user key                  seq number        type
/// ```
///
/// The tag (seq and type) is stored as a little endian fixed64.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct InternalKey {
    data: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], seq: u64, t: ValueType) -> Self {
        let mut data = Vec::with_capacity(user_key.len() + INTERNAL_KEY_TAIL);
        data.extend_from_slice(user_key);
        put_fixed_64(&mut data, pack_seq_and_type(seq, t));
        InternalKey { data }
    }

    /// Wraps already encoded bytes
    #[inline]
    pub fn decoded_from(src: &[u8]) -> Self {
        Self { data: src.to_vec() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// REQUIRES: the key is not empty
    #[inline]
    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.data)
    }

    pub fn parsed(&self) -> Result<ParsedInternalKey<'_>> {
        ParsedInternalKey::decode_from(&self.data)
    }
}

impl Debug for InternalKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.parsed() {
            Ok(parsed) => write!(f, "{:?}", parsed),
            Err(_) => write!(f, "(bad){:?}", self.data),
        }
    }
}

/// A `LookupKey` represents a point lookup of a user key as of a specific
/// sequence number.
///
/// The format of a `LookupKey`:
///
/// ```text
///
///   +---------------------------------+
///   | varint32 of internal key length |
///   +---------------------------------+ --------------- user key start
///   | user key bytes                  |
///   +---------------------------------+   internal key
///   | sequence (7)        |  seek (1) |
///   +---------------------------------+ ---------------
///
/// ```
pub struct LookupKey {
    data: Vec<u8>,
    ukey_start: usize,
}

impl LookupKey {
    pub fn new(user_key: &[u8], seq: u64) -> Self {
        let mut data = Vec::with_capacity(user_key.len() + INTERNAL_KEY_TAIL + 5);
        VarintU32::put_varint(&mut data, (user_key.len() + INTERNAL_KEY_TAIL) as u32);
        let ukey_start = data.len();
        data.extend_from_slice(user_key);
        put_fixed_64(&mut data, pack_seq_and_type(seq, VALUE_TYPE_FOR_SEEK));
        Self { data, ukey_start }
    }

    /// Returns a key suitable for lookup in a MemTable.
    #[inline]
    pub fn mem_key(&self) -> &[u8] {
        &self.data
    }

    /// Returns an internal key (suitable for passing to an internal iterator)
    #[inline]
    pub fn internal_key(&self) -> &[u8] {
        &self.data[self.ukey_start..]
    }

    #[inline]
    pub fn user_key(&self) -> &[u8] {
        &self.data[self.ukey_start..self.data.len() - INTERNAL_KEY_TAIL]
    }
}

/// `InternalKeyComparator` orders internal keys by:
///    increasing user key (according to user-supplied comparator)
///    decreasing sequence number
///    decreasing type
///
/// So the newest version of a user key comes first.
#[derive(Clone, Default)]
pub struct InternalKeyComparator<C: Comparator> {
    /// The comparator defined in `Options`
    pub user_comparator: C,
}

impl<C: Comparator> InternalKeyComparator<C> {
    pub fn new(user_comparator: C) -> Self {
        InternalKeyComparator { user_comparator }
    }
}

impl<C: Comparator> Comparator for InternalKeyComparator<C> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self
            .user_comparator
            .compare(extract_user_key(a), extract_user_key(b))
        {
            Ordering::Equal => {
                // the larger tag sorts first
                let ta = decode_fixed_64(&a[a.len() - INTERNAL_KEY_TAIL..]);
                let tb = decode_fixed_64(&b[b.len() - INTERNAL_KEY_TAIL..]);
                tb.cmp(&ta)
            }
            o => o,
        }
    }

    #[inline]
    fn name(&self) -> &str {
        "leveldb.InternalKeyComparator"
    }

    #[inline]
    fn min_key_len(&self) -> usize {
        INTERNAL_KEY_TAIL
    }
}

/// Applies a user `FilterPolicy` to internal keys by stripping their tags
#[derive(Clone)]
pub struct InternalFilterPolicy {
    user_policy: Arc<dyn FilterPolicy>,
}

impl InternalFilterPolicy {
    pub fn new(user_policy: Arc<dyn FilterPolicy>) -> Self {
        Self { user_policy }
    }
}

impl FilterPolicy for InternalFilterPolicy {
    fn name(&self) -> &str {
        self.user_policy.name()
    }

    fn may_contain(&self, filter: &[u8], key: &[u8]) -> bool {
        self.user_policy.may_contain(filter, extract_user_key(key))
    }

    fn create_filter(&self, keys: &[Vec<u8>]) -> Vec<u8> {
        let user_keys: Vec<Vec<u8>> = keys
            .iter()
            .map(|key| extract_user_key(key).to_vec())
            .collect();
        self.user_policy.create_filter(&user_keys)
    }
}

/// Returns the user key part of an encoded internal key.
///
/// # Panics
///
/// Panics if the key is shorter than the 8 bytes tag. Keys read from disk
/// should go through `ParsedInternalKey::decode_from` first.
#[inline]
pub fn extract_user_key(key: &[u8]) -> &[u8] {
    let size = key.len();
    assert!(
        size >= INTERNAL_KEY_TAIL,
        "[internal key] invalid size of internal key : expect >= {} but got {}",
        INTERNAL_KEY_TAIL,
        size
    );
    &key[..size - INTERNAL_KEY_TAIL]
}

/// Returns the sequence number and the value type in the tag of an encoded
/// internal key
pub fn extract_seq_and_type(key: &[u8]) -> Result<(u64, ValueType)> {
    let size = key.len();
    corruption_if_not!(
        size >= INTERNAL_KEY_TAIL,
        "internal key too short: {} bytes",
        size
    );
    let tag = decode_fixed_64(&key[size - INTERNAL_KEY_TAIL..]);
    match ValueType::from_u64(tag & 0xff) {
        Some(t) => Ok((tag >> 8, t)),
        None => Err(Error::Corruption(format!(
            "unknown value type {} in internal key",
            tag & 0xff
        ))),
    }
}

/// Composes the sequence number and the value type into the tag of an
/// internal key
///
/// # Panics
///
/// Panics if `seq` doesn't fit in 56 bits
#[inline]
pub fn pack_seq_and_type(seq: u64, v_type: ValueType) -> u64 {
    assert!(
        seq <= MAX_KEY_SEQUENCE,
        "[key seq] the sequence number should be <= {}, but got {}",
        MAX_KEY_SEQUENCE,
        seq
    );
    seq << 8 | v_type as u64
}
