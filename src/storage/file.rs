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
use crate::Result;
use fs2::FileExt;
use std::fs::{create_dir_all, read_dir, remove_file, rename, File as SysFile, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// `Storage` backed by the local file system
#[derive(Clone, Copy, Default)]
pub struct FileStorage;

impl Storage for FileStorage {
    type F = SysFile;

    fn create<P: AsRef<Path>>(&self, name: P) -> Result<Self::F> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(name)?;
        Ok(f)
    }

    fn open<P: AsRef<Path>>(&self, name: P) -> Result<Self::F> {
        let f = OpenOptions::new().read(true).append(true).open(name)?;
        Ok(f)
    }

    fn remove<P: AsRef<Path>>(&self, name: P) -> Result<()> {
        remove_file(name)?;
        Ok(())
    }

    fn exists<P: AsRef<Path>>(&self, name: P) -> bool {
        name.as_ref().exists()
    }

    fn rename<P: AsRef<Path>>(&self, old: P, new: P) -> Result<()> {
        rename(old, new)?;
        Ok(())
    }

    fn mkdir_all<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        create_dir_all(dir)?;
        Ok(())
    }

    fn list<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(vec![]);
        }
        let mut v = vec![];
        for entry in read_dir(dir)? {
            v.push(entry?.path());
        }
        Ok(v)
    }
}

impl File for SysFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(self)?;
        self.sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let p = Seek::seek(self, pos)?;
        Ok(p)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = Read::read(self, buf)?;
        Ok(n)
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        Seek::seek(self, SeekFrom::Start(0))?;
        let n = self.read_to_end(buf)?;
        Ok(n)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn lock(&self) -> Result<()> {
        SysFile::try_lock_exclusive(self)?;
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        FileExt::unlock(self)?;
        Ok(())
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let n = std::os::unix::prelude::FileExt::read_at(self, buf, offset)?;
        Ok(n)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let n = std::os::windows::prelude::FileExt::seek_read(self, buf, offset)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_exact_at() {
        let dir = tempdir().unwrap();
        let name = dir.path().join("test");
        let s = FileStorage::default();
        let mut f = s.create(&name).unwrap();
        File::write(&mut f, b"hello world").unwrap();
        File::flush(&mut f).unwrap();
        let tests = vec![
            (0, "hello world"),
            (0, ""),
            (1, "ello"),
            (4, "o world"),
            (100, ""),
        ];
        let rf = s.open(&name).unwrap();
        let mut buffer = vec![];
        for (offset, expect) in tests {
            buffer.resize(expect.as_bytes().len(), 0u8);
            rf.read_exact_at(buffer.as_mut_slice(), offset).unwrap();
            assert_eq!(buffer, expect.as_bytes());
        }
        // EOF case
        buffer.resize(100, 0u8);
        assert!(rf.read_exact_at(buffer.as_mut_slice(), 2).is_err());
    }

    #[test]
    fn test_storage_basic() {
        let dir = tempdir().unwrap();
        let s = FileStorage::default();
        let sub = dir.path().join("db");
        s.mkdir_all(&sub).unwrap();
        let a = sub.join("a");
        let b = sub.join("b");
        let mut f = s.create(&a).unwrap();
        File::write(&mut f, b"content").unwrap();
        assert!(s.exists(&a));
        assert_eq!(File::len(&f).unwrap(), 7);

        s.rename(&a, &b).unwrap();
        assert!(!s.exists(&a));
        let mut f = s.open(&b).unwrap();
        let mut buf = vec![];
        f.read_all(&mut buf).unwrap();
        assert_eq!(buf, b"content");
        assert_eq!(s.list(&sub).unwrap(), vec![b.clone()]);

        // the LOCK file can only be held once
        let lock = s.create(sub.join("LOCK")).unwrap();
        File::lock(&lock).unwrap();
        let another = s.open(sub.join("LOCK")).unwrap();
        assert!(File::lock(&another).is_err());
        File::unlock(&lock).unwrap();

        s.remove(&b).unwrap();
        assert!(!s.exists(&b));
        assert!(s.open(&b).is_err());
    }
}
