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

//! The file system capability every persistent component is handed.
//!
//! Tables, the manifest and the `CURRENT` pointer only talk to a `Storage`,
//! so tests can run the whole data path against `MemStorage`.

pub mod file;
pub mod mem;

use crate::{Error, Result};
use std::io;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

pub trait Storage: Send + Sync {
    type F: File + 'static;
    /// Create a file if it does not exist and truncates exist one.
    fn create<P: AsRef<Path>>(&self, name: P) -> Result<Self::F>;

    /// Open a file for writing and reading
    fn open<P: AsRef<Path>>(&self, name: P) -> Result<Self::F>;

    /// Delete the named file
    fn remove<P: AsRef<Path>>(&self, name: P) -> Result<()>;

    /// Returns true iff the named file exists.
    fn exists<P: AsRef<Path>>(&self, name: P) -> bool;

    /// Rename a file or directory to a new name, replacing the original file if
    /// `new` already exists.
    fn rename<P: AsRef<Path>>(&self, old: P, new: P) -> Result<()>;

    /// Recursively create a directory and all of its parent components if they
    /// are missing.
    fn mkdir_all<P: AsRef<Path>>(&self, dir: P) -> Result<()>;

    /// Returns a list of the full-path to each file in given directory
    fn list<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>>;
}

pub trait File: Send + Sync {
    /// Appends `buf` to the end of the file
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    /// Makes every written byte durable
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize>;
    fn len(&self) -> Result<u64>;
    fn is_empty(&self) -> bool {
        match self.len() {
            Ok(length) => length == 0,
            // Err is considered as empty
            Err(_) => true,
        }
    }
    /// Locks the file for exclusive usage. Returns an error if the file is
    /// already locked.
    fn lock(&self) -> Result<()>;
    fn unlock(&self) -> Result<()>;

    /// Reads bytes from an offset in this source into a buffer, returning how
    /// many bytes were read.
    ///
    /// This function may yield fewer bytes than the size of `buf`, if it was
    /// interrupted or hit the "EOF".
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Reads the exact number of bytes required to fill `buf` from an `offset`.
    ///
    /// Errors if the "EOF" is encountered before filling the buffer.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => break,
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    offset += n as u64;
                }
                Err(Error::IO(err)) => {
                    if err.kind() != io::ErrorKind::Interrupted {
                        return Err(Error::IO(err));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if !buf.is_empty() {
            let e = io::Error::new(io::ErrorKind::UnexpectedEof, "failed to fill whole buffer");
            Err(Error::IO(e))
        } else {
            Ok(())
        }
    }
}

/// Writes `data` into a newly created file `file_name`.
/// The file is removed if it can't be completed.
pub fn do_write_string_to_file<S: Storage, P: AsRef<Path>>(
    storage: &S,
    data: String,
    file_name: P,
    should_sync: bool,
) -> Result<()> {
    let mut file = storage.create(&file_name)?;
    let res = file
        .write(data.as_bytes())
        .and_then(|_| {
            if should_sync {
                file.flush()
            } else {
                Ok(())
            }
        })
        .and_then(|_| file.close());
    if res.is_err() {
        storage.remove(&file_name)?;
    }
    res
}
