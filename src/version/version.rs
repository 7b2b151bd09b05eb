//! Version
//!
//! An immutable list of tables per level. Readers clone the `Arc<Version>`
//! they start with, which keeps those tables on disk until they finish.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::{Result, StrataError};
use crate::iterator::{InternalIterator, TwoLevelIterator};
use crate::key::{
    make_internal_key, parse_internal_key, InternalKeyComparator, LookupKey, ValueType,
    MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK,
};
use crate::memtable::MemTableEntry;
use crate::storage::TableCache;

use super::{max_grandparent_overlap_bytes, total_file_size, FileMetaData, MAX_MEM_COMPACT_LEVEL, NUM_LEVELS};

pub struct Version {
    pub(crate) files: [Vec<Arc<FileMetaData>>; NUM_LEVELS],
    pub(crate) cmp: InternalKeyComparator,
    pub(crate) table_cache: Arc<TableCache>,
    /// Level that most needs compaction and its score (≥ 1 means needed)
    pub(crate) compaction_level: usize,
    pub(crate) compaction_score: f64,
}

impl Version {
    pub(crate) fn new(cmp: InternalKeyComparator, table_cache: Arc<TableCache>) -> Self {
        Self {
            files: Default::default(),
            cmp,
            table_cache,
            compaction_level: 0,
            compaction_score: -1.0,
        }
    }

    pub fn files(&self, level: usize) -> &[Arc<FileMetaData>] {
        &self.files[level]
    }

    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    pub fn level_bytes(&self, level: usize) -> u64 {
        total_file_size(&self.files[level])
    }

    /// Newest record for the lookup key among this version's tables.
    ///
    /// Level-0 tables may overlap and carry no ordering guarantee between
    /// them, so every candidate is probed and the highest sequence wins.
    pub fn get(&self, key: &LookupKey, verify_checksums: bool, fill_cache: bool) -> Result<Option<MemTableEntry>> {
        let user_key = key.user_key();
        let ikey = key.internal_key();

        let mut best: Option<(u64, MemTableEntry)> = None;
        for file in &self.files[0] {
            if !self.user_key_in_file(user_key, file) {
                continue;
            }
            if let Some((sequence, entry)) = self.probe(file, ikey, user_key, verify_checksums, fill_cache)? {
                if best.as_ref().map_or(true, |(s, _)| sequence > *s) {
                    best = Some((sequence, entry));
                }
            }
        }
        if let Some((_, entry)) = best {
            return Ok(Some(entry));
        }

        for level in 1..NUM_LEVELS {
            let files = &self.files[level];
            let index = find_file(&self.cmp, files, ikey);
            let Some(file) = files.get(index) else {
                continue;
            };
            if self.cmp.compare_user(user_key, file_user_smallest(file)) == Ordering::Less {
                continue;
            }
            if let Some((_, entry)) = self.probe(file, ikey, user_key, verify_checksums, fill_cache)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn probe(
        &self,
        file: &FileMetaData,
        ikey: &[u8],
        user_key: &[u8],
        verify_checksums: bool,
        fill_cache: bool,
    ) -> Result<Option<(u64, MemTableEntry)>> {
        let found = self
            .table_cache
            .get(file.number, file.file_size, ikey, verify_checksums, fill_cache)?;
        let Some((found_key, value)) = found else {
            return Ok(None);
        };
        let parsed = parse_internal_key(&found_key).ok_or_else(|| {
            StrataError::corruption(format!("bad internal key in table {}", file.number))
        })?;
        if self.cmp.compare_user(parsed.user_key, user_key) != Ordering::Equal {
            return Ok(None);
        }
        let entry = match parsed.value_type {
            ValueType::Value => MemTableEntry::Value(value),
            ValueType::Deletion => MemTableEntry::Tombstone,
        };
        Ok(Some((parsed.sequence, entry)))
    }

    fn user_key_in_file(&self, user_key: &[u8], file: &FileMetaData) -> bool {
        self.cmp.compare_user(user_key, file_user_smallest(file)) != Ordering::Less
            && self.cmp.compare_user(user_key, file_user_largest(file)) != Ordering::Greater
    }

    /// Whether any file in `level` overlaps the user-key range. `None`
    /// bounds are open.
    pub fn overlap_in_level(&self, level: usize, smallest: Option<&[u8]>, largest: Option<&[u8]>) -> bool {
        let files = &self.files[level];
        if level == 0 {
            return files.iter().any(|f| !self.after_file(smallest, f) && !self.before_file(largest, f));
        }
        let index = match smallest {
            Some(user_key) => {
                let probe = make_internal_key(user_key, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
                find_file(&self.cmp, files, &probe)
            }
            None => 0,
        };
        match files.get(index) {
            Some(file) => !self.before_file(largest, file),
            None => false,
        }
    }

    /// User key lies after every key in `file`
    fn after_file(&self, user_key: Option<&[u8]>, file: &FileMetaData) -> bool {
        user_key.is_some_and(|k| self.cmp.compare_user(k, file_user_largest(file)) == Ordering::Greater)
    }

    /// User key lies before every key in `file`
    fn before_file(&self, user_key: Option<&[u8]>, file: &FileMetaData) -> bool {
        user_key.is_some_and(|k| self.cmp.compare_user(k, file_user_smallest(file)) == Ordering::Less)
    }

    /// Files in `level` overlapping the internal-key range `[begin, end]`.
    ///
    /// In level 0 the range grows to cover every file it touches, and the
    /// scan restarts until it stops growing.
    pub fn overlapping_inputs(&self, level: usize, begin: Option<&[u8]>, end: Option<&[u8]>) -> Vec<Arc<FileMetaData>> {
        let user_cmp = self.cmp.user_comparator();
        let mut user_begin = begin.map(|k| crate::key::extract_user_key(k).to_vec());
        let mut user_end = end.map(|k| crate::key::extract_user_key(k).to_vec());

        let mut inputs = Vec::new();
        let mut i = 0;
        while i < self.files[level].len() {
            let file = &self.files[level][i];
            i += 1;
            let file_start = file_user_smallest(file);
            let file_limit = file_user_largest(file);
            if user_begin.as_deref().is_some_and(|b| user_cmp.compare(file_limit, b) == Ordering::Less) {
                continue;
            }
            if user_end.as_deref().is_some_and(|e| user_cmp.compare(file_start, e) == Ordering::Greater) {
                continue;
            }
            inputs.push(Arc::clone(file));
            if level == 0 {
                if user_begin.as_deref().is_some_and(|b| user_cmp.compare(file_start, b) == Ordering::Less) {
                    user_begin = Some(file_start.to_vec());
                    inputs.clear();
                    i = 0;
                } else if user_end.as_deref().is_some_and(|e| user_cmp.compare(file_limit, e) == Ordering::Greater) {
                    user_end = Some(file_limit.to_vec());
                    inputs.clear();
                    i = 0;
                }
            }
        }
        inputs
    }

    /// Level a freshly flushed table should land in. Pushed below level 0
    /// when it overlaps nothing there, but not so deep that it overlaps too
    /// much of the level after next.
    pub fn pick_level_for_memtable_output(&self, smallest: &[u8], largest: &[u8], max_file_size: usize) -> usize {
        let mut level = 0;
        if self.overlap_in_level(0, Some(smallest), Some(largest)) {
            return level;
        }
        let start = make_internal_key(smallest, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
        let limit = make_internal_key(largest, 0, ValueType::Deletion);
        while level < MAX_MEM_COMPACT_LEVEL {
            if self.overlap_in_level(level + 1, Some(smallest), Some(largest)) {
                break;
            }
            if level + 2 < NUM_LEVELS {
                let grandparents = self.overlapping_inputs(level + 2, Some(&start), Some(&limit));
                if total_file_size(&grandparents) > max_grandparent_overlap_bytes(max_file_size) {
                    break;
                }
            }
            level += 1;
        }
        level
    }

    /// Push one iterator per level-0 table and one concatenating iterator
    /// per deeper non-empty level.
    pub fn add_iterators(&self, verify_checksums: bool, fill_cache: bool, out: &mut Vec<Box<dyn InternalIterator>>) {
        for file in &self.files[0] {
            out.push(self.table_cache.iter(file.number, file.file_size, verify_checksums, fill_cache));
        }
        for level in 1..NUM_LEVELS {
            if !self.files[level].is_empty() {
                out.push(Box::new(concatenating_iterator(
                    self.cmp.clone(),
                    self.files[level].clone(),
                    Arc::clone(&self.table_cache),
                    verify_checksums,
                    fill_cache,
                )));
            }
        }
    }

    /// Listing used by the `leveldb.sstables` property
    pub fn debug_string(&self) -> String {
        let mut out = String::new();
        for (level, files) in self.files.iter().enumerate() {
            let _ = writeln!(out, "--- level {} ---", level);
            for file in files {
                let _ = writeln!(
                    out,
                    " {}:{}[{} .. {}]",
                    file.number,
                    file.file_size,
                    describe_key(&file.smallest),
                    describe_key(&file.largest)
                );
            }
        }
        out
    }
}

fn describe_key(internal_key: &[u8]) -> String {
    match parse_internal_key(internal_key) {
        Some(parsed) => parsed.to_string(),
        None => format!("(bad){}", String::from_utf8_lossy(internal_key)),
    }
}

pub(crate) fn file_user_smallest(file: &FileMetaData) -> &[u8] {
    crate::key::extract_user_key(&file.smallest)
}

pub(crate) fn file_user_largest(file: &FileMetaData) -> &[u8] {
    crate::key::extract_user_key(&file.largest)
}

/// Index of the first file whose largest key is ≥ `internal_key`, or
/// `files.len()` when there is none. Files must be sorted and disjoint.
pub(crate) fn find_file(cmp: &InternalKeyComparator, files: &[Arc<FileMetaData>], internal_key: &[u8]) -> usize {
    files.partition_point(|f| cmp.compare(&f.largest, internal_key) == Ordering::Less)
}

/// Iterator over a sorted, disjoint run of files: the index yields each
/// file's largest key and an encoded `(number, size)`, the second level opens
/// the table.
pub(crate) fn concatenating_iterator(
    cmp: InternalKeyComparator,
    files: Vec<Arc<FileMetaData>>,
    table_cache: Arc<TableCache>,
    verify_checksums: bool,
    fill_cache: bool,
) -> TwoLevelIterator {
    TwoLevelIterator::new(
        Box::new(LevelFileNumIterator::new(cmp, files)),
        Box::new(move |value: &[u8]| {
            let (number, size) = decode_file_value(value)?;
            Ok(table_cache.iter(number, size, verify_checksums, fill_cache))
        }),
    )
}

fn decode_file_value(value: &[u8]) -> Result<(u64, u64)> {
    if value.len() != 16 {
        return Err(StrataError::corruption("file reader invoked with unexpected value"));
    }
    let mut number = [0u8; 8];
    let mut size = [0u8; 8];
    number.copy_from_slice(&value[..8]);
    size.copy_from_slice(&value[8..]);
    Ok((u64::from_le_bytes(number), u64::from_le_bytes(size)))
}

struct LevelFileNumIterator {
    cmp: InternalKeyComparator,
    files: Vec<Arc<FileMetaData>>,
    /// `files.len()` when invalid
    index: usize,
    value: [u8; 16],
}

impl LevelFileNumIterator {
    fn new(cmp: InternalKeyComparator, files: Vec<Arc<FileMetaData>>) -> Self {
        let index = files.len();
        Self {
            cmp,
            files,
            index,
            value: [0; 16],
        }
    }

    fn fill_value(&mut self) {
        if let Some(file) = self.files.get(self.index) {
            self.value[..8].copy_from_slice(&file.number.to_le_bytes());
            self.value[8..].copy_from_slice(&file.file_size.to_le_bytes());
        }
    }
}

impl InternalIterator for LevelFileNumIterator {
    fn valid(&self) -> bool {
        self.index < self.files.len()
    }

    fn seek_to_first(&mut self) {
        self.index = 0;
        self.fill_value();
    }

    fn seek_to_last(&mut self) {
        self.index = if self.files.is_empty() { 0 } else { self.files.len() - 1 };
        self.fill_value();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index = find_file(&self.cmp, &self.files, target);
        self.fill_value();
    }

    fn next(&mut self) {
        self.index += 1;
        self.fill_value();
    }

    fn prev(&mut self) {
        self.index = if self.index == 0 { self.files.len() } else { self.index - 1 };
        self.fill_value();
    }

    fn key(&self) -> &[u8] {
        &self.files[self.index].largest
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
