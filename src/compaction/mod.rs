//! Compaction Module
//!
//! Merges tables down the level hierarchy to bound read amplification and
//! reclaim space held by overwritten or deleted keys.
//!
//! ## State machine
//! ```text
//! IDLE ──(score ≥ 1 | manual | frozen memtable)──▶ SELECTING
//!   ▲                                                  │
//!   │                                                  ▼
//! INSTALLING ◀───────────────────────────────────── MERGING
//! ```
//! Nothing becomes visible until the version edit is installed; a failed
//! merge deletes its partial outputs and leaves the prior version intact.

mod build;
mod picker;
mod worker;

use std::cmp::Ordering;
use std::sync::Arc;

pub use build::build_table;

use crate::comparator::Comparator;
use crate::config::Options;
use crate::iterator::{InternalIterator, MergingIterator};
use crate::storage::TableCache;
use crate::version::{
    concatenating_iterator, file_user_largest, file_user_smallest, max_grandparent_overlap_bytes,
    total_file_size, FileMetaData, Version, VersionEdit, NUM_LEVELS,
};

/// One compaction of `level` into `level + 1`
pub struct Compaction {
    level: usize,
    max_output_file_size: u64,
    max_grandparent_overlap: u64,
    input_version: Arc<Version>,
    pub(crate) edit: VersionEdit,
    /// `[files at level, overlapping files at level + 1]`
    pub(crate) inputs: [Vec<Arc<FileMetaData>>; 2],
    /// Files at `level + 2` overlapping the compaction range
    pub(crate) grandparents: Vec<Arc<FileMetaData>>,
    grandparent_index: usize,
    seen_key: bool,
    overlapped_bytes: u64,
    /// Per-level cursor for `is_base_level_for_key`; keys arrive in order
    level_ptrs: [usize; NUM_LEVELS],
}

impl Compaction {
    pub(crate) fn new(level: usize, max_file_size: usize, input_version: Arc<Version>) -> Self {
        Self {
            level,
            max_output_file_size: max_file_size as u64,
            max_grandparent_overlap: max_grandparent_overlap_bytes(max_file_size),
            input_version,
            edit: VersionEdit::new(),
            inputs: Default::default(),
            grandparents: Vec::new(),
            grandparent_index: 0,
            seen_key: false,
            overlapped_bytes: 0,
            level_ptrs: [0; NUM_LEVELS],
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn max_output_file_size(&self) -> u64 {
        self.max_output_file_size
    }

    pub fn num_input_files(&self, which: usize) -> usize {
        self.inputs[which].len()
    }

    pub fn input_bytes(&self) -> u64 {
        total_file_size(&self.inputs[0]) + total_file_size(&self.inputs[1])
    }

    /// A single input with nothing below it can be relinked to the next
    /// level without rewriting. Too much grandparent overlap would make the
    /// later compaction of that file expensive, so that case merges.
    pub fn is_trivial_move(&self) -> bool {
        self.inputs[0].len() == 1
            && self.inputs[1].is_empty()
            && total_file_size(&self.grandparents) <= self.max_grandparent_overlap
    }

    /// Record every input file as deleted in the edit.
    pub fn add_input_deletions(&mut self) {
        for which in 0..2 {
            for file in &self.inputs[which] {
                self.edit.remove_file(self.level + which, file.number);
            }
        }
    }

    /// True when no level below the output holds `user_key`, so a tombstone
    /// for it has nothing left to shadow.
    pub fn is_base_level_for_key(&mut self, user_key: &[u8]) -> bool {
        let cmp = self.input_version.cmp.user_comparator();
        for level in self.level + 2..NUM_LEVELS {
            let files = self.input_version.files(level);
            while let Some(file) = files.get(self.level_ptrs[level]) {
                if cmp.compare(user_key, file_user_largest(file)) != Ordering::Greater {
                    if cmp.compare(user_key, file_user_smallest(file)) != Ordering::Less {
                        return false;
                    }
                    break;
                }
                self.level_ptrs[level] += 1;
            }
        }
        true
    }

    /// True when the current output should be closed before `internal_key`
    /// to limit how much of the grandparent level it overlaps.
    pub fn should_stop_before(&mut self, internal_key: &[u8]) -> bool {
        let cmp = &self.input_version.cmp;
        while let Some(file) = self.grandparents.get(self.grandparent_index) {
            if cmp.compare(internal_key, &file.largest) != Ordering::Greater {
                break;
            }
            if self.seen_key {
                self.overlapped_bytes += file.file_size;
            }
            self.grandparent_index += 1;
        }
        self.seen_key = true;

        if self.overlapped_bytes > self.max_grandparent_overlap {
            self.overlapped_bytes = 0;
            true
        } else {
            false
        }
    }

    /// Merged view over every input, in internal-key order.
    pub fn input_iterator(&self, options: &Options, table_cache: &Arc<TableCache>) -> MergingIterator {
        let verify = options.paranoid_checks;
        let mut children: Vec<Box<dyn InternalIterator>> = Vec::new();
        for which in 0..2 {
            let files = &self.inputs[which];
            if files.is_empty() {
                continue;
            }
            if self.level + which == 0 {
                for file in files {
                    children.push(table_cache.iter(file.number, file.file_size, verify, false));
                }
            } else {
                children.push(Box::new(concatenating_iterator(
                    self.input_version.cmp.clone(),
                    files.clone(),
                    Arc::clone(table_cache),
                    verify,
                    false,
                )));
            }
        }
        MergingIterator::new(self.input_version.cmp.clone(), children)
    }
}

/// Per-level accounting reported by `leveldb.stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub micros: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl CompactionStats {
    pub fn add(&mut self, other: &CompactionStats) {
        self.micros += other.micros;
        self.bytes_read += other.bytes_read;
        self.bytes_written += other.bytes_written;
    }
}
