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

use crate::compaction::{base_range, total_range, Compaction, CompactionInputs, CompactionReason};
use crate::db::filename::{generate_filename, parse_filename, update_current, FileType};
use crate::db::format::{InternalKey, InternalKeyComparator};
use crate::options::Options;
use crate::record::reader::Reader;
use crate::record::writer::Writer;
use crate::storage::{File, Storage};
use crate::util::collection::HashSet;
use crate::util::comparator::Comparator;
use crate::util::reporter::LogReporter;
use crate::version::version_edit::{FileDelta, FileMetaData, VersionEdit};
use crate::version::{total_file_size, Version};
use crate::{Error, Result};
use std::cmp::Ordering as CmpOrdering;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct LevelDiff {
    deleted_files: HashSet<u64>,
    added_files: Vec<FileMetaData>,
}

/// Accumulates a sequence of `FileDelta` on top of a base `Version` and
/// produces the resulting `Version` without building the intermediate ones.
pub struct VersionBuilder<'a, C: Comparator> {
    levels: Vec<LevelDiff>,
    base: &'a Version<C>,
}

impl<'a, C: Comparator> VersionBuilder<'a, C> {
    pub fn new(max_levels: usize, base: &'a Version<C>) -> Self {
        let mut levels = Vec::with_capacity(max_levels);
        for _ in 0..max_levels {
            levels.push(LevelDiff::default());
        }
        Self { levels, base }
    }

    /// Applies the given delta. Compaction pointers go straight into
    /// `compaction_pointer` since they are not part of a `Version`.
    pub fn accumulate(
        &mut self,
        delta: FileDelta,
        compaction_pointer: &mut [InternalKey],
    ) -> Result<()> {
        let max_levels = self.levels.len();
        for (level, key) in delta.compaction_pointers {
            invariant!(
                level < max_levels,
                "compaction pointer at level {} exceeds max levels {}",
                level,
                max_levels
            );
            compaction_pointer[level] = key;
        }
        for (level, number) in delta.deleted_files {
            invariant!(
                level < max_levels,
                "deleted file #{} at level {} exceeds max levels {}",
                number,
                level,
                max_levels
            );
            self.levels[level].deleted_files.insert(number);
        }
        for (level, new_file) in delta.new_files {
            invariant!(
                level < max_levels,
                "new file #{} at level {} exceeds max levels {}",
                new_file.number,
                level,
                max_levels
            );
            new_file.init_allowed_seeks();
            let diff = &mut self.levels[level];
            diff.deleted_files.remove(&new_file.number);
            diff.added_files.push(new_file);
        }
        Ok(())
    }

    /// Merges the accumulated changes with the base files into a new
    /// `Version`. Files in level 0 are ordered by file number and files in
    /// other levels by smallest key.
    ///
    /// Returns `Error::Invariant` if two files in a level > 0 overlap.
    pub fn apply_to_new(self, icmp: &InternalKeyComparator<C>) -> Result<Version<C>> {
        let base = self.base;
        let mut v = Version::new(base.options.clone(), icmp.clone());
        v.vnum = base.vnum + 1;
        for (level, diff) in self.levels.into_iter().enumerate() {
            let base_files = base.files.get(level).map_or(&[][..], |f| f.as_slice());
            let mut added = diff.added_files;
            added.sort_by(|a, b| file_order(icmp, level, a, b));
            let mut files = Vec::with_capacity(base_files.len() + added.len());
            let mut base_iter = base_files.iter().peekable();
            for f in added {
                while let Some(b) = base_iter.peek() {
                    if file_order(icmp, level, b, &f) != CmpOrdering::Less {
                        break;
                    }
                    if !diff.deleted_files.contains(&b.number) {
                        files.push((*b).clone());
                    }
                    base_iter.next();
                }
                if !diff.deleted_files.contains(&f.number) {
                    files.push(Arc::new(f));
                }
            }
            for b in base_iter {
                if !diff.deleted_files.contains(&b.number) {
                    files.push(b.clone());
                }
            }
            if level > 0 {
                for pair in files.windows(2) {
                    invariant!(
                        icmp.compare(pair[0].largest.data(), pair[1].smallest.data())
                            == CmpOrdering::Less,
                        "overlapping files #{} and #{} in level {}",
                        pair[0].number,
                        pair[1].number,
                        level
                    );
                }
            }
            v.files[level] = files;
        }
        Ok(v)
    }
}

fn file_order<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    level: usize,
    a: &FileMetaData,
    b: &FileMetaData,
) -> CmpOrdering {
    if level == 0 {
        a.number.cmp(&b.number)
    } else {
        match icmp.compare(a.smallest.data(), b.smallest.data()) {
            CmpOrdering::Equal => a.number.cmp(&b.number),
            o => o,
        }
    }
}

/// The set of all the live `Version`s plus the counters persisted in the
/// MANIFEST.
///
/// Every version change is logged as a `VersionEdit` record into the
/// MANIFEST. The first record of a new MANIFEST is always a snapshot of the
/// current version.
pub struct VersionSet<S: Storage, C: Comparator> {
    db_path: String,
    storage: S,
    options: Arc<Options<C>>,
    icmp: InternalKeyComparator<C>,
    next_file_number: u64,
    last_sequence: u64,
    log_number: u64,
    // 0 or backing store for memtable being compacted
    prev_log_number: u64,
    manifest_file_number: u64,
    // `None` until the first edit is logged
    manifest_writer: Option<Writer<S::F>>,
    // The last one is the current version
    versions: Vec<Arc<Version<C>>>,
    // Per-level key at which the next compaction at that level should start.
    // An empty key means start from the beginning.
    compaction_pointer: Vec<InternalKey>,
}

impl<S: Storage, C: Comparator> VersionSet<S, C> {
    pub fn new(db_path: String, options: Arc<Options<C>>, storage: S) -> Self {
        let icmp = InternalKeyComparator::new(options.comparator.clone());
        let max_levels = options.max_levels;
        let current = Version::new(options.clone(), icmp.clone());
        Self {
            db_path,
            storage,
            options,
            icmp,
            // the manifest takes 1
            next_file_number: 2,
            last_sequence: 0,
            log_number: 0,
            prev_log_number: 0,
            manifest_file_number: 1,
            manifest_writer: None,
            versions: vec![Arc::new(current)],
            compaction_pointer: vec![InternalKey::default(); max_levels],
        }
    }

    #[inline]
    pub fn current(&self) -> Arc<Version<C>> {
        // `versions` is never empty
        self.versions[self.versions.len() - 1].clone()
    }

    #[inline]
    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    #[inline]
    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    #[inline]
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    #[inline]
    pub fn manifest_number(&self) -> u64 {
        self.manifest_file_number
    }

    #[inline]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    #[inline]
    pub fn set_last_sequence(&mut self, seq: u64) {
        debug_assert!(seq >= self.last_sequence);
        self.last_sequence = seq;
    }

    /// Allocates and returns a new file number
    #[inline]
    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// Arranges to reuse `file_number` unless a newer file number has
    /// already been allocated.
    #[inline]
    pub fn reuse_file_number(&mut self, file_number: u64) {
        if self.next_file_number == file_number + 1 {
            self.next_file_number = file_number;
        }
    }

    /// Forward to `num + 1` as the next file number
    pub fn mark_file_number_used(&mut self, num: u64) {
        if self.next_file_number <= num {
            self.next_file_number = num + 1
        }
    }

    #[inline]
    pub fn num_level_files(&self, level: usize) -> usize {
        self.current().num_level_files(level)
    }

    #[inline]
    pub fn level_summary(&self) -> String {
        self.current().level_summary()
    }

    /// Returns the numbers of the files referenced by any live version
    pub fn live_files(&self) -> HashSet<u64> {
        let mut result = HashSet::default();
        for v in self.versions.iter() {
            for files in v.files.iter() {
                for f in files.iter() {
                    result.insert(f.number);
                }
            }
        }
        result
    }

    /// Applies `edit` to the current version to form a new version that is
    /// both saved to the MANIFEST and installed as the new current version.
    ///
    /// The log number, the next file number and the last sequence of the
    /// set are stamped into `edit` before it is written.
    pub fn log_and_apply(&mut self, mut edit: VersionEdit) -> Result<()> {
        let (v, record) = self.prepare_apply(&mut edit)?;
        let writer = self.manifest_writer.take();
        let is_new_manifest = writer.is_none();
        let snapshot = if is_new_manifest {
            Some(self.snapshot_record())
        } else {
            None
        };
        let result = write_manifest(
            &self.storage,
            &self.db_path,
            self.manifest_file_number,
            writer,
            snapshot,
            &record,
        );
        self.finish_apply(result, is_new_manifest, &edit, v)
    }

    /// Same as `log_and_apply` but releases `vset` while writing the
    /// MANIFEST so that readers of the current version are not blocked.
    ///
    /// The caller must make sure there is no concurrent `log_and_apply` on
    /// the same set.
    pub fn log_and_apply_with_lock(vset: &Mutex<Self>, mut edit: VersionEdit) -> Result<()>
    where
        S: Clone,
    {
        let (v, record, writer, snapshot, manifest_number, storage, db_path) = {
            let mut guard = vset.lock().unwrap();
            let (v, record) = guard.prepare_apply(&mut edit)?;
            let writer = guard.manifest_writer.take();
            let snapshot = if writer.is_none() {
                Some(guard.snapshot_record())
            } else {
                None
            };
            (
                v,
                record,
                writer,
                snapshot,
                guard.manifest_file_number,
                guard.storage.clone(),
                guard.db_path.clone(),
            )
        };
        let is_new_manifest = writer.is_none();
        let result = write_manifest(
            &storage,
            &db_path,
            manifest_number,
            writer,
            snapshot,
            &record,
        );
        let mut guard = vset.lock().unwrap();
        guard.finish_apply(result, is_new_manifest, &edit, v)
    }

    // Stamps the counters into `edit` and builds the version it leads to
    fn prepare_apply(&mut self, edit: &mut VersionEdit) -> Result<(Version<C>, Vec<u8>)> {
        match edit.log_number {
            Some(n) => invariant!(
                n >= self.log_number && n < self.next_file_number,
                "log number {} should be in [{}, {})",
                n,
                self.log_number,
                self.next_file_number
            ),
            None => edit.set_log_number(self.log_number),
        }
        if edit.prev_log_number.is_none() {
            edit.set_prev_log_number(self.prev_log_number);
        }
        edit.set_next_file(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let base = self.current();
        let mut builder = VersionBuilder::new(self.options.max_levels, &base);
        builder.accumulate(edit.file_delta.clone(), &mut self.compaction_pointer)?;
        let mut v = builder.apply_to_new(&self.icmp)?;
        v.finalize();

        let mut record = vec![];
        edit.encode_to(&mut record);
        Ok((v, record))
    }

    fn finish_apply(
        &mut self,
        result: Result<Writer<S::F>>,
        is_new_manifest: bool,
        edit: &VersionEdit,
        v: Version<C>,
    ) -> Result<()> {
        match result {
            Ok(writer) => {
                self.manifest_writer = Some(writer);
                if let Some(n) = edit.log_number {
                    self.log_number = n;
                }
                if let Some(n) = edit.prev_log_number {
                    self.prev_log_number = n;
                }
                info!("Apply version edit: {}", v.level_summary());
                self.append_new_version(v);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Write MANIFEST-{:06} failed: {:?}",
                    self.manifest_file_number, e
                );
                if !is_new_manifest {
                    // The old MANIFEST may end with a partial record. Start
                    // over with a fresh one on the next edit.
                    self.manifest_file_number = self.new_file_number();
                }
                Err(e)
            }
        }
    }

    fn append_new_version(&mut self, v: Version<C>) {
        self.versions.push(Arc::new(v));
        self.gc();
    }

    // Remove all the old versions
    // NOTE: This func always keeps the last element in `versions`
    fn gc(&mut self) {
        let mut i = 0;
        let last = self.versions.len() - 1;
        self.versions.retain(|v| {
            let keep = i == last || Arc::strong_count(v) > 1;
            i += 1;
            keep
        })
    }

    /// Encodes a `VersionEdit` that recreates the current state from scratch
    /// into `dst`.
    pub fn write_snapshot(&self, dst: &mut Vec<u8>) {
        let mut edit = VersionEdit::new(self.options.max_levels);
        edit.set_comparator_name(self.icmp.user_comparator.name());
        for (level, key) in self.compaction_pointer.iter().enumerate() {
            if !key.is_empty() {
                edit.add_compaction_pointer(level, key.clone());
            }
        }
        let current = self.current();
        for (level, files) in current.files.iter().enumerate() {
            for f in files.iter() {
                edit.add_file(
                    level,
                    f.number,
                    f.file_size,
                    f.smallest.clone(),
                    f.largest.clone(),
                );
            }
        }
        edit.encode_to(dst);
    }

    fn snapshot_record(&self) -> Vec<u8> {
        let mut record = vec![];
        self.write_snapshot(&mut record);
        record
    }

    /// Recovers the last saved state from the MANIFEST named by `CURRENT`.
    ///
    /// Returns true if the recovered MANIFEST is not reused and a new one
    /// will be written by the next `log_and_apply`.
    pub fn recover(&mut self) -> Result<bool> {
        let mut current = self
            .storage
            .open(generate_filename(&self.db_path, FileType::Current, 0))?;
        let mut buf = vec![];
        current.read_all(&mut buf)?;
        let content = String::from_utf8(buf)
            .map_err(|e| Error::Corruption(format!("invalid CURRENT file content: {}", e)))?;
        corruption_if_not!(
            content.len() > 1 && content.ends_with('\n'),
            "CURRENT file does not end with newline"
        );
        let manifest_number = match parse_filename(&content[..content.len() - 1]) {
            Some((FileType::Manifest, n)) => n,
            _ => {
                return Err(Error::Corruption(format!(
                    "CURRENT points to an invalid manifest {:?}",
                    content.trim_end()
                )))
            }
        };
        let manifest_path = generate_filename(&self.db_path, FileType::Manifest, manifest_number);
        let mut manifest = self.storage.open(&manifest_path)?;
        let file_length = manifest.len()?;
        manifest.seek(SeekFrom::Start(0))?;
        info!("Recovering from {}", &manifest_path);

        let base = Version::new(self.options.clone(), self.icmp.clone());
        let mut builder = VersionBuilder::new(self.options.max_levels, &base);
        let reporter = LogReporter::new();
        let mut reader = Reader::new(manifest, Some(Box::new(reporter.clone())), 0);
        let mut record = vec![];
        let mut next_file_number = None;
        let mut log_number = None;
        let mut prev_log_number = None;
        let mut last_sequence = None;
        // Without paranoid checks the damaged records are only logged by
        // the reporter and skipped
        let paranoid = self.options.paranoid_checks;
        while reader.read_record(&mut record) {
            if paranoid {
                reporter.result()?;
            }
            let mut edit = VersionEdit::new(self.options.max_levels);
            edit.decoded_from(&record)?;
            debug!("Decoded manifest record: {:?}", &edit);
            if let Some(name) = &edit.comparator_name {
                if name.as_str() != self.icmp.user_comparator.name() {
                    return Err(Error::InvalidArgument(format!(
                        "{} does not match existing comparator {}",
                        name,
                        self.icmp.user_comparator.name()
                    )));
                }
            }
            builder.accumulate(edit.file_delta, &mut self.compaction_pointer)?;
            next_file_number = edit.next_file_number.or(next_file_number);
            log_number = edit.log_number.or(log_number);
            prev_log_number = edit.prev_log_number.or(prev_log_number);
            last_sequence = edit.last_sequence.or(last_sequence);
        }
        if paranoid {
            reporter.result()?;
        }

        let next_file_number = next_file_number
            .ok_or_else(|| Error::Corruption("no meta-nextfile entry in manifest".to_owned()))?;
        let log_number = log_number
            .ok_or_else(|| Error::Corruption("no meta-lognumber entry in manifest".to_owned()))?;
        let last_sequence = last_sequence.ok_or_else(|| {
            Error::Corruption("no last-sequence-number entry in manifest".to_owned())
        })?;
        let prev_log_number = prev_log_number.unwrap_or(0);

        let mut v = builder.apply_to_new(&self.icmp)?;
        v.finalize();
        self.append_new_version(v);
        self.next_file_number = next_file_number;
        self.mark_file_number_used(prev_log_number);
        self.mark_file_number_used(log_number);
        self.manifest_file_number = self.new_file_number();
        self.last_sequence = last_sequence;
        self.log_number = log_number;
        self.prev_log_number = prev_log_number;
        info!(
            "Recovered {}: next file {}, last sequence {}, log {}, {}",
            &manifest_path,
            self.next_file_number,
            self.last_sequence,
            self.log_number,
            self.level_summary()
        );
        Ok(!self.should_reuse_manifest(&manifest_path, manifest_number, file_length))
    }

    // See if we can keep appending to the recovered MANIFEST
    fn should_reuse_manifest(
        &mut self,
        manifest_path: &str,
        manifest_number: u64,
        file_size: u64,
    ) -> bool {
        if !self.options.reuse_logs {
            return false;
        }
        if file_size >= self.options.max_file_size {
            // Make new compacted MANIFEST if old one is too big
            return false;
        }
        match self.storage.open(manifest_path) {
            Ok(f) => {
                info!("Reusing MANIFEST {}", manifest_path);
                self.manifest_writer = Some(Writer::new_with_offset(f, file_size));
                self.manifest_file_number = manifest_number;
                true
            }
            Err(e) => {
                error!("Reuse MANIFEST {}: {:?}", manifest_path, e);
                false
            }
        }
    }

    /// Returns a compaction for the files in `level` that overlap
    /// `[begin, end]`, or `None` if nothing overlaps. `None` bounds mean
    /// unbounded.
    pub fn compact_range(
        &mut self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Option<Compaction<C>> {
        if level + 1 >= self.options.max_levels {
            return None;
        }
        let version = self.current();
        let mut overlapping_inputs = version.get_overlapping_inputs(level, begin, end);
        if overlapping_inputs.is_empty() {
            return None;
        }
        // Avoid compacting too much in one shot in case the range is large.
        // But we cannot do this for level-0 since level-0 files can overlap
        // and we must not pick one file and drop another older file if the
        // two files overlap.
        if level > 0 {
            let mut total = 0;
            for (i, file) in overlapping_inputs.iter().enumerate() {
                total += file.file_size;
                if total >= self.options.max_file_size {
                    overlapping_inputs.truncate(i + 1);
                    break;
                }
            }
        }
        let mut c = Compaction::new(self.options.clone(), level, CompactionReason::Manual);
        c.input_version = Some(version);
        c.inputs.base = overlapping_inputs;
        Some(self.setup_other_inputs(c))
    }

    /// Picks the level and inputs for a new compaction.
    /// Returns `None` if no compaction needs to be done.
    pub fn pick_compaction(&mut self) -> Option<Compaction<C>> {
        let current = self.current();
        let size_compaction = current.compaction_score() >= 1.0;
        let seek_target = current.file_to_compact();
        // We prefer compactions triggered by too much data in a level over
        // the compactions triggered by seeks
        let mut compaction = if size_compaction {
            let level = current.compaction_level();
            if level + 1 >= self.options.max_levels {
                return None;
            }
            let mut compaction =
                Compaction::new(self.options.clone(), level, CompactionReason::MaxSize);
            // Pick the first file that comes after compact_pointer[level]
            let pointer = &self.compaction_pointer[level];
            let picked = current.files[level].iter().find(|f| {
                pointer.is_empty()
                    || self.icmp.compare(f.largest.data(), pointer.data()) == CmpOrdering::Greater
            });
            // Wrap-around to the beginning of the key space
            match picked.or_else(|| current.files[level].first()) {
                Some(f) => compaction.inputs.add_base(f.clone()),
                None => return None,
            }
            compaction
        } else if let Some((file, level)) = &seek_target {
            if level + 1 >= self.options.max_levels {
                // We've run out of the levels
                return None;
            }
            let mut compaction =
                Compaction::new(self.options.clone(), *level, CompactionReason::SeekLimit);
            compaction.inputs.add_base(file.clone());
            compaction
        } else {
            return None;
        };
        compaction.input_version = Some(current.clone());
        // Files in level 0 may overlap each other, so pick up all overlapping ones
        if compaction.level == 0 {
            let (smallest, largest) =
                base_range(&compaction.inputs.base, compaction.level, &self.icmp);
            // Note that the next call will discard the file we placed in
            // inputs[0] earlier and replace it with an overlapping set
            // which will include the picked file.
            compaction.inputs.base =
                current.get_overlapping_inputs(0, Some(&smallest), Some(&largest));
        }

        let compaction = self.setup_other_inputs(compaction);
        // Avoid recursively trivial sst moving when target level is empty
        if compaction.level > 1
            && compaction.reason == CompactionReason::SeekLimit
            && compaction.is_trivial_move()
            && current.files[compaction.level + 1].is_empty()
        {
            for f in compaction.inputs.base.iter() {
                f.init_allowed_seeks()
            }
            return None;
        }
        Some(compaction)
    }

    // Pick up files to compact in `c.level+1` based on given compaction
    // The input files in `c.level` might expand because of getting a large key range from newly picked files
    // in `c.level + 1`. And the final key range in `c.level + 1` should be a subset of `c.level`
    fn setup_other_inputs(&mut self, mut c: Compaction<C>) -> Compaction<C> {
        let current = self.current();
        let level = c.level;
        let mut not_expand = std::mem::take(&mut c.inputs).base;
        add_boundary_inputs_for_compact_files(&self.icmp, &current.files[level], &mut not_expand);
        let (smallest, largest) = base_range(&not_expand, level, &self.icmp);
        let overlapping_next_level =
            current.get_overlapping_inputs(level + 1, Some(&smallest), Some(&largest));
        let (all_smallest, all_largest) =
            total_range(&not_expand, &overlapping_next_level, level, &self.icmp);

        // See whether we can grow the number of inputs in "level" without
        // changing the number of "level+1" files we pick up.
        let (base, parent) = if !overlapping_next_level.is_empty() {
            // This also fills the 'holes' left by the boundary files
            let mut expanded0 =
                current.get_overlapping_inputs(level, Some(&all_smallest), Some(&all_largest));
            add_boundary_inputs_for_compact_files(&self.icmp, &current.files[level], &mut expanded0);
            let expanded0_size = total_file_size(&expanded0);
            let next_size = total_file_size(&overlapping_next_level);
            if expanded0.len() > not_expand.len()
                && next_size + expanded0_size <= self.options.expanded_compaction_byte_size_limit()
            {
                let (new_smallest, new_largest) = base_range(&expanded0, level, &self.icmp);
                let expanded_next = current.get_overlapping_inputs(
                    level + 1,
                    Some(&new_smallest),
                    Some(&new_largest),
                );
                if expanded_next.len() == overlapping_next_level.len() {
                    info!(
                        "Expanding@{} {}+{} ({}+{} bytes) to {}+{} ({}+{} bytes)",
                        level,
                        not_expand.len(),
                        overlapping_next_level.len(),
                        total_file_size(&not_expand),
                        next_size,
                        expanded0.len(),
                        expanded_next.len(),
                        expanded0_size,
                        total_file_size(&expanded_next),
                    );
                    (expanded0, expanded_next)
                } else {
                    (not_expand, overlapping_next_level)
                }
            } else {
                (not_expand, overlapping_next_level)
            }
        } else {
            (not_expand, overlapping_next_level)
        };

        let (final_smallest, final_largest) = total_range(&base, &parent, level, &self.icmp);
        // Compute the set of grandparent files that overlap this compaction
        // (parent == level+1; grandparent == level+2)
        if level + 2 < self.options.max_levels {
            c.grand_parents = current.get_overlapping_inputs(
                level + 2,
                Some(&final_smallest),
                Some(&final_largest),
            );
        }
        // Update the place where we will do the next compaction for this level.
        // We update this immediately instead of waiting for the VersionEdit
        // to be applied so that if the compaction fails, we will try a different
        // key range next time
        c.edit.add_compaction_pointer(level, final_largest.clone());
        self.compaction_pointer[level] = final_largest;
        c.inputs = CompactionInputs { base, parent };
        c
    }
}

// Writes `record` into the MANIFEST with the given number. A new MANIFEST
// is created with `snapshot` as the first record when `writer` is `None`,
// and CURRENT is pointed to it once the record is synced.
fn write_manifest<S: Storage>(
    storage: &S,
    db_path: &str,
    manifest_number: u64,
    writer: Option<Writer<S::F>>,
    snapshot: Option<Vec<u8>>,
    record: &[u8],
) -> Result<Writer<S::F>> {
    let filename = generate_filename(db_path, FileType::Manifest, manifest_number);
    let is_new = writer.is_none();
    let result = append_manifest(storage, &filename, writer, snapshot, record).and_then(|w| {
        if is_new {
            update_current(storage, db_path, manifest_number)?;
        }
        Ok(w)
    });
    if result.is_err() && is_new {
        let _ = storage.remove(&filename);
    }
    result
}

fn append_manifest<S: Storage>(
    storage: &S,
    filename: &str,
    writer: Option<Writer<S::F>>,
    snapshot: Option<Vec<u8>>,
    record: &[u8],
) -> Result<Writer<S::F>> {
    let mut writer = match writer {
        Some(w) => w,
        None => {
            info!("Create new manifest file {}", filename);
            let mut w = Writer::new(storage.create(filename)?);
            if let Some(s) = snapshot {
                w.add_record(&s)?;
            }
            w
        }
    };
    writer.add_record(record)?;
    writer.sync()?;
    Ok(writer)
}

// Add SST files which should have been included in `level` compaction but excluded by some reasons (e.g output size limit truncating).
// This guarantees that all the `InternalKey`s with a same user key in level `level` should be compacted. Otherwise, we might encounter a
// snapshot reading issue because the older key remains in a lower level when the newest key is at higher level after compaction.
// `files_to_compact` could be expand after this methods
fn add_boundary_inputs_for_compact_files<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    level_files: &[Arc<FileMetaData>],
    files_to_compact: &mut Vec<Arc<FileMetaData>>,
) {
    let mut largest_key = match files_to_compact
        .iter()
        .max_by(|a, b| icmp.compare(a.largest.data(), b.largest.data()))
    {
        Some(f) => f.largest.clone(),
        None => return,
    };
    // Only the last boundary file is appended each round, which might leave
    // 'holes' in files to be compacted. `get_overlapping_inputs` fills them.
    while let Some(file) = find_smallest_boundary_file(icmp, level_files, &largest_key) {
        largest_key = file.largest.clone();
        files_to_compact.push(file);
    }
}

// Finds the file with the smallest `smallest` key among those whose
// smallest key has the same user key as `largest_key` but sorts after it
fn find_smallest_boundary_file<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    level_files: &[Arc<FileMetaData>],
    largest_key: &InternalKey,
) -> Option<Arc<FileMetaData>> {
    let ucmp = &icmp.user_comparator;
    let mut smallest_boundary_file: Option<&Arc<FileMetaData>> = None;
    for f in level_files {
        if icmp.compare(f.smallest.data(), largest_key.data()) == CmpOrdering::Greater
            && ucmp.compare(f.smallest.user_key(), largest_key.user_key()) == CmpOrdering::Equal
        {
            match smallest_boundary_file {
                Some(current)
                    if icmp.compare(f.smallest.data(), current.smallest.data())
                        != CmpOrdering::Less => {}
                _ => smallest_boundary_file = Some(f),
            }
        }
    }
    smallest_boundary_file.cloned()
}
