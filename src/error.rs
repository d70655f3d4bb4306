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

use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// If the hint is `None`, the key is deleted
        NotFound(hint: Option<String>) {
            display("key seeking failed: {:?}", hint)
        }
        /// On-disk data is damaged: checksum mismatch, bad magic number,
        /// truncated or malformed encodings
        Corruption(hint: String) {
            display("data corruption: {}", hint)
        }
        /// A contract or invariant of the engine is broken, e.g. overlapping
        /// files in a sorted level or keys added out of order
        Invariant(hint: String) {
            display("invariant violation: {}", hint)
        }
        UTF8Error(err: std::string::FromUtf8Error) {
            from()
            display("UTF8 error: {:?}", err)
        }
        InvalidArgument(hint: String) {
            display("invalid argument: {}", hint)
        }
        CompressionFailed(err: snap::Error) {
            display("compression failed: {}", err)
            cause(err)
        }
        IO(err: std::io::Error) {
            from()
            display("I/O operation error: {}", err)
            cause(err)
        }
        Customized(hint: String) {
            display("{}", hint)
        }
    }
}

impl Error {
    /// Returns true if the error indicates damaged persistent data
    #[inline]
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::Corruption(_) => true,
            _ => false,
        }
    }

    /// Returns true if the error is raised by a broken engine invariant
    #[inline]
    pub fn is_invariant(&self) -> bool {
        match self {
            Error::Invariant(_) => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
