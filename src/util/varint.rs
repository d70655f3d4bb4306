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

pub const MAX_VARINT_LEN_U32: usize = 5;
pub const MAX_VARINT_LEN_U64: usize = 10;

/// Coding for u32 varints
pub struct VarintU32;

/// Coding for u64 varints
pub struct VarintU64;

macro_rules! impl_varint {
    ($type:ty, $uint:ty, $max_len:expr) => {
        impl $type {
            /// Encodes `n` into `data` and returns the number of bytes written.
            ///
            /// # Panics
            ///
            /// Panics if `data` has no room for the encoded integer
            pub fn write(data: &mut [u8], mut n: $uint) -> usize {
                let mut i = 0;
                while n >= 0b1000_0000 {
                    data[i] = (n as u8) | 0b1000_0000;
                    n >>= 7;
                    i += 1;
                }
                data[i] = n as u8;
                i + 1
            }

            /// Decodes a varint from the head of `src`.
            ///
            /// Returns `None` if the input is truncated or overflows the integer type.
            pub fn read(src: &[u8]) -> Option<($uint, usize)> {
                let mut n: $uint = 0;
                let mut shift: u32 = 0;
                for (i, &b) in src.iter().enumerate().take($max_len) {
                    if b < 0b1000_0000 {
                        return match (<$uint>::from(b)).checked_shl(shift) {
                            None => None,
                            Some(b) => Some((n | b, i + 1)),
                        };
                    }
                    match (<$uint>::from(b) & 0b0111_1111).checked_shl(shift) {
                        None => return None,
                        Some(b) => n |= b,
                    }
                    shift += 7;
                }
                None
            }

            /// Appends the varint encoding of `n` to `dst`
            pub fn put_varint(dst: &mut Vec<u8>, n: $uint) {
                let mut buf = [0u8; $max_len];
                let written = Self::write(&mut buf, n);
                dst.extend_from_slice(&buf[..written]);
            }

            /// Appends `varint(value.len()) ++ value` to `dst`
            pub fn put_varint_prefixed_slice(dst: &mut Vec<u8>, value: &[u8]) {
                Self::put_varint(dst, value.len() as $uint);
                dst.extend_from_slice(value);
            }

            /// Decodes a length prefixed slice and returns it along with
            /// the number of bytes consumed.
            pub fn get_varint_prefixed_slice(src: &[u8]) -> Option<(&[u8], usize)> {
                let (len, n) = Self::read(src)?;
                let end = n.checked_add(len as usize)?;
                if end > src.len() {
                    None
                } else {
                    Some((&src[n..end], end))
                }
            }

            /// Decodes a varint and advances `src` past it
            pub fn drain_read(src: &mut &[u8]) -> Option<$uint> {
                let (n, size) = Self::read(src)?;
                *src = &src[size..];
                Some(n)
            }

            /// Decodes a length prefixed slice and advances `src` past it
            pub fn drain_prefixed_slice<'a>(src: &mut &'a [u8]) -> Option<&'a [u8]> {
                let s: &'a [u8] = *src;
                let (value, size) = Self::get_varint_prefixed_slice(s)?;
                *src = &s[size..];
                Some(value)
            }

            /// Returns the encoded length of `n`
            pub fn varint_length(mut n: $uint) -> usize {
                let mut len = 1;
                while n >= 0b1000_0000 {
                    n >>= 7;
                    len += 1;
                }
                len
            }
        }
    };
}

impl_varint!(VarintU32, u32, MAX_VARINT_LEN_U32);
impl_varint!(VarintU64, u64, MAX_VARINT_LEN_U64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_u64() {
        // (input u64 , expected bytes)
        let tests = vec![
            (0u64, vec![0]),
            (100u64, vec![0b110_0100]),
            (129u64, vec![0b1000_0001, 0b1]),
            (258u64, vec![0b1000_0010, 0b10]),
            (
                58962304u64,
                vec![0b1000_0000, 0b1110_0011, 0b1000_1110, 0b1_1100],
            ),
        ];
        for (input, results) in tests {
            let mut bytes = vec![0u8; MAX_VARINT_LEN_U64];
            let written = VarintU64::write(&mut bytes, input);
            assert_eq!(written, results.len());
            assert_eq!(&bytes[..written], results.as_slice());
            assert_eq!(VarintU64::varint_length(input), written);
        }
    }

    #[test]
    fn test_read_u64() {
        #[rustfmt::skip]
        let mut test_data = vec![
            0,
            0b110_0100,
            0b1000_0001, 0b1,
            0b1000_0010, 0b10,
            0b1000_0000, 0b1110_0011, 0b1000_1110, 0b1_1100,
        ];
        let expects = vec![0u64, 100, 129, 258, 58962304];
        for expect in expects {
            let (n, size) = VarintU64::read(&test_data).expect("varint should be decoded");
            assert_eq!(n, expect);
            test_data.drain(0..size);
        }
        assert!(test_data.is_empty());
    }

    #[test]
    fn test_read_truncated_or_overflow() {
        // continuation bit set on the last byte
        assert_eq!(VarintU32::read(&[0b1000_0001]), None);
        assert_eq!(VarintU32::read(&[]), None);
        // six bytes never fit a u32
        assert_eq!(
            VarintU32::read(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
            None
        );
        assert_eq!(VarintU64::read(&[0xff; 11]), None);
        // the max u32 still decodes
        let mut buf = vec![];
        VarintU32::put_varint(&mut buf, u32::max_value());
        assert_eq!(VarintU32::read(&buf), Some((u32::max_value(), 5)));
    }

    #[test]
    fn test_prefixed_slice() {
        let mut buf = vec![];
        VarintU32::put_varint_prefixed_slice(&mut buf, b"hello");
        VarintU32::put_varint_prefixed_slice(&mut buf, b"");
        VarintU64::put_varint(&mut buf, 300);
        let mut s = buf.as_slice();
        assert_eq!(VarintU32::drain_prefixed_slice(&mut s), Some(&b"hello"[..]));
        assert_eq!(VarintU32::drain_prefixed_slice(&mut s), Some(&b""[..]));
        assert_eq!(VarintU64::drain_read(&mut s), Some(300));
        assert!(s.is_empty());
        // the declared length exceeds the input
        assert_eq!(VarintU32::get_varint_prefixed_slice(&[5, b'a']), None);
    }
}
