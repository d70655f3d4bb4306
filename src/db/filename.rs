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

use crate::storage::{do_write_string_to_file, Storage};
use crate::Result;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    /// `NNNNNN.log` write-ahead log
    Log,
    /// `LOCK` file. Only one process may hold the lock of a db directory.
    Lock,
    /// `NNNNNN.sst` table file
    Table,
    /// `MANIFEST-NNNNNN` file holding the version edits
    Manifest,
    /// `CURRENT` file saves the name of the manifest in use
    Current,
    /// `NNNNNN.dbtmp` file
    Temp,
    /// `LOG` file records runtime logs. An existing `LOG` is renamed to
    /// `LOG.old` before a new one is created.
    InfoLog,
    /// `LOG.old` file records the logs of the last run
    OldInfoLog,
}

// Returns the base name of the file with given type and number
fn base_name(filetype: FileType, number: u64) -> String {
    match filetype {
        FileType::Log => format!("{:06}.log", number),
        FileType::Lock => "LOCK".to_owned(),
        FileType::Table => format!("{:06}.sst", number),
        FileType::Manifest => format!("MANIFEST-{:06}", number),
        FileType::Current => "CURRENT".to_owned(),
        FileType::Temp => format!("{:06}.dbtmp", number),
        FileType::InfoLog => "LOG".to_owned(),
        FileType::OldInfoLog => "LOG.old".to_owned(),
    }
}

/// Returns the path of a file with given `FileType` and file number under
/// `dirname`. The number is ignored by the types without one.
pub fn generate_filename(dirname: &str, filetype: FileType, number: u64) -> String {
    Path::new(dirname)
        .join(base_name(filetype, number))
        .to_string_lossy()
        .into_owned()
}

/// Returns the `FileType` and the file number of the given file path, or
/// `None` if the file does not belong to a db.
pub fn parse_filename<P: AsRef<Path>>(filename: P) -> Option<(FileType, u64)> {
    let name = filename.as_ref().file_name()?.to_str()?;
    match name {
        "CURRENT" => return Some((FileType::Current, 0)),
        "LOCK" => return Some((FileType::Lock, 0)),
        "LOG" => return Some((FileType::InfoLog, 0)),
        "LOG.old" => return Some((FileType::OldInfoLog, 0)),
        _ => {}
    }
    if let Some(number) = name.strip_prefix("MANIFEST-") {
        return parse_number(number).map(|n| (FileType::Manifest, n));
    }
    let dot = name.find('.')?;
    let number = parse_number(&name[..dot])?;
    let filetype = match &name[dot + 1..] {
        "log" => FileType::Log,
        "sst" => FileType::Table,
        "dbtmp" => FileType::Temp,
        _ => return None,
    };
    Some((filetype, number))
}

#[inline]
fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok()
}

/// Points the `CURRENT` file of `dirname` to the manifest with the given
/// number. The new content is written to a temp file first and then renamed.
pub fn update_current<S: Storage>(storage: &S, dirname: &str, manifest_number: u64) -> Result<()> {
    let contents = base_name(FileType::Manifest, manifest_number) + "\n";
    let tmp = generate_filename(dirname, FileType::Temp, manifest_number);
    do_write_string_to_file(storage, contents, &tmp, true)?;
    if let Err(e) = storage.rename(&tmp, &generate_filename(dirname, FileType::Current, 0)) {
        let _ = storage.remove(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem::MemStorage;
    use crate::storage::File;

    #[test]
    fn test_generate_filename() {
        let dirname = "test";
        let tests = vec![
            (FileType::Log, 10, "000010.log"),
            (FileType::Lock, 1, "LOCK"),
            (FileType::Table, 123, "000123.sst"),
            (FileType::Table, 1234567, "1234567.sst"),
            (FileType::Manifest, 9, "MANIFEST-000009"),
            (FileType::Current, 1, "CURRENT"),
            (FileType::Temp, 100, "000100.dbtmp"),
            (FileType::InfoLog, 1, "LOG"),
            (FileType::OldInfoLog, 1, "LOG.old"),
        ];
        for (ft, number, expect) in tests {
            let name = generate_filename(dirname, ft, number);
            let expect = Path::new(dirname).join(expect);
            assert_eq!(Path::new(&name), expect.as_path());
        }
    }

    #[test]
    fn test_parse_filename() {
        let tests = vec![
            ("a/b/c/000123.log", Some((FileType::Log, 123))),
            ("a/b/c/LOCK", Some((FileType::Lock, 0))),
            ("a/b/c/010666.sst", Some((FileType::Table, 10666))),
            ("a/b/c/MANIFEST-000009", Some((FileType::Manifest, 9))),
            ("a/b/c/000123.dbtmp", Some((FileType::Temp, 123))),
            ("a/b/c/CURRENT", Some((FileType::Current, 0))),
            ("a/b/c/LOG", Some((FileType::InfoLog, 0))),
            ("a/b/c/LOG.old", Some((FileType::OldInfoLog, 0))),
            ("18446744073709551615.log", Some((FileType::Log, u64::max_value()))),
            // invalid conditions
            ("a/b/c/test.123", None),
            ("a/b/c/LOG.", None),
            ("a/b/c/LOG.new", None),
            ("a/b/c/000def.log", None),
            ("a/b/c/+12.log", None),
            ("a/b/c/.log", None),
            ("a/b/c/123.log.old", None),
            ("18446744073709551616.log", None),
            ("a/b/c/MANIFEST-abcedf", None),
            ("a/b/c/MANIFEST", None),
            ("a/b/c/MANIFEST-", None),
            ("a/b/c/MANIFEST-123123-abcdef", None),
        ];
        for (filename, expect) in tests {
            assert_eq!(parse_filename(filename), expect, "parse {}", filename);
        }
    }

    #[test]
    fn test_update_current() {
        let s = MemStorage::default();
        let dir = "db";
        update_current(&s, dir, 5).unwrap();
        let mut current = s
            .open(generate_filename(dir, FileType::Current, 0))
            .unwrap();
        let mut buf = vec![];
        current.read_all(&mut buf).unwrap();
        assert_eq!(buf, b"MANIFEST-000005\n");
        assert!(!s.exists(generate_filename(dir, FileType::Temp, 5)));

        // CURRENT is replaced by the newer manifest
        update_current(&s, dir, 7).unwrap();
        let mut current = s
            .open(generate_filename(dir, FileType::Current, 0))
            .unwrap();
        let mut buf = vec![];
        current.read_all(&mut buf).unwrap();
        assert_eq!(buf, b"MANIFEST-000007\n");
    }
}
