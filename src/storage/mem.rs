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

use crate::storage::{File, Storage};
use crate::util::collection::HashMap;
use crate::{Error, Result};
use std::io;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

fn not_found(name: &str) -> Error {
    Error::IO(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", name),
    ))
}

#[inline]
fn key_of<P: AsRef<Path>>(name: P) -> String {
    name.as_ref().to_string_lossy().into_owned()
}

/// An in memory file system keyed by the full path of each file.
/// Directories are implicit.
#[derive(Default, Clone)]
pub struct MemStorage {
    inner: Arc<RwLock<HashMap<String, FileNode>>>,
}

impl Storage for MemStorage {
    type F = FileNode;

    fn create<P: AsRef<Path>>(&self, name: P) -> Result<Self::F> {
        let key = key_of(name);
        let file_node = FileNode::new(&key);
        self.inner.write().unwrap().insert(key, file_node.clone());
        Ok(file_node)
    }

    fn open<P: AsRef<Path>>(&self, name: P) -> Result<Self::F> {
        let key = key_of(name);
        match self.inner.read().unwrap().get(&key) {
            Some(f) => Ok(f.clone()),
            None => Err(not_found(&key)),
        }
    }

    fn remove<P: AsRef<Path>>(&self, name: P) -> Result<()> {
        let key = key_of(name);
        match self.inner.write().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(not_found(&key)),
        }
    }

    fn exists<P: AsRef<Path>>(&self, name: P) -> bool {
        self.inner.read().unwrap().contains_key(&key_of(name))
    }

    fn rename<P: AsRef<Path>>(&self, old: P, new: P) -> Result<()> {
        let old = key_of(old);
        let mut map = self.inner.write().unwrap();
        match map.remove(&old) {
            Some(f) => {
                map.insert(key_of(new), f);
                Ok(())
            }
            None => Err(not_found(&old)),
        }
    }

    fn mkdir_all<P: AsRef<Path>>(&self, _dir: P) -> Result<()> {
        Ok(())
    }

    // Files directly under `dir`
    fn list<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut result = vec![];
        for key in self.inner.read().unwrap().keys() {
            let path = PathBuf::from(key);
            let parent = path.parent().unwrap_or_else(|| Path::new(""));
            if parent == dir {
                result.push(path)
            }
        }
        Ok(result)
    }
}

/// A shared handle to an `InmemFile`. Every `open` of the same name
/// sees the same contents.
#[derive(Clone)]
pub struct FileNode {
    inner: Arc<RwLock<InmemFile>>,
}

impl FileNode {
    fn new(name: &str) -> Self {
        FileNode {
            inner: Arc::new(RwLock::new(InmemFile::new(name))),
        }
    }
}

impl File for FileNode {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.inner.write().unwrap().write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.write().unwrap().flush()
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.write().unwrap().seek(pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.write().unwrap().read(buf)
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        self.inner.write().unwrap().read_all(buf)
    }

    fn len(&self) -> Result<u64> {
        self.inner.read().unwrap().len()
    }

    fn lock(&self) -> Result<()> {
        self.inner.read().unwrap().lock()
    }

    fn unlock(&self) -> Result<()> {
        self.inner.read().unwrap().unlock()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.inner.read().unwrap().read_at(buf, offset)
    }
}

/// `File` implementation based on memory
pub struct InmemFile {
    name: String,
    lock: AtomicBool,
    contents: Cursor<Vec<u8>>,
}

impl InmemFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            lock: AtomicBool::new(false),
            contents: Cursor::new(vec![]),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pos_and_data(&self) -> (u64, &[u8]) {
        (self.contents.position(), self.contents.get_ref().as_slice())
    }
}

impl File for InmemFile {
    // Always appends and keeps the read position untouched
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let pos = self.contents.position();
        self.contents
            .set_position(self.contents.get_ref().len() as u64);
        let r = self.contents.write(buf);
        self.contents.set_position(pos);
        Ok(r?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.contents.seek(pos)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.contents.read(buf)?)
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        self.contents.set_position(0);
        Ok(self.contents.read_to_end(buf)?)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.contents.get_ref().len() as u64)
    }

    // Returns Err instead of blocking if locked
    fn lock(&self) -> Result<()> {
        if self.lock.swap(true, Ordering::AcqRel) {
            Err(Error::IO(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("{} already locked", self.name),
            )))
        } else {
            Ok(())
        }
    }

    fn unlock(&self) -> Result<()> {
        self.lock.store(false, Ordering::Release);
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let inner = self.contents.get_ref();
        let length = inner.len() as u64;
        if buf.is_empty() || offset >= length {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(inner.len() - start);
        buf[..n].copy_from_slice(&inner[start..start + n]);
        Ok(n)
    }
}
