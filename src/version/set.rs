//! Version set and manifest
//!
//! Owns the current version and everything persisted alongside it. Callers
//! serialize access (the engine keeps it under its state mutex).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::comparator::Comparator;
use crate::config::Options;
use crate::error::{Result, StrataError};
use crate::filename::{descriptor_file_name, read_current_file, set_current_file};
use crate::key::{InternalKeyComparator, SequenceNumber};
use crate::storage::TableCache;
use crate::wal::{ReadOutcome, WalReader, WalWriter};

use super::{
    max_bytes_for_level, total_file_size, FileMetaData, Version, VersionEdit, L0_COMPACTION_TRIGGER, NUM_LEVELS,
};

pub struct VersionSet {
    dir: PathBuf,
    pub(crate) cmp: InternalKeyComparator,
    table_cache: Arc<TableCache>,
    pub(crate) max_file_size: usize,
    next_file_number: u64,
    manifest_file_number: u64,
    last_sequence: SequenceNumber,
    log_number: u64,
    current: Arc<Version>,
    /// Every version handed out; dead entries are pruned lazily
    live: Vec<Weak<Version>>,
    /// Largest key of the last compaction per level
    pub(crate) compact_pointers: [Vec<u8>; NUM_LEVELS],
    descriptor_log: Option<WalWriter>,
}

impl VersionSet {
    pub fn new(dir: &Path, options: &Options, cmp: InternalKeyComparator, table_cache: Arc<TableCache>) -> Self {
        let current = Arc::new(Version::new(cmp.clone(), Arc::clone(&table_cache)));
        Self {
            dir: dir.to_path_buf(),
            cmp,
            table_cache,
            max_file_size: options.max_file_size,
            next_file_number: 2,
            manifest_file_number: 0,
            last_sequence: 0,
            log_number: 0,
            live: vec![Arc::downgrade(&current)],
            current,
            compact_pointers: Default::default(),
            descriptor_log: None,
        }
    }

    /// Rebuild the current version from the manifest named by CURRENT.
    pub fn recover(&mut self) -> Result<()> {
        let manifest_name = read_current_file(&self.dir)?;
        let manifest_path = self.dir.join(&manifest_name);
        let manifest_number = manifest_name
            .strip_prefix("MANIFEST-")
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| StrataError::corruption(format!("CURRENT names {}", manifest_name)))?;

        let mut reader = WalReader::open(&manifest_path)?;
        let mut builder = Builder::new(&self.current);
        let mut log_number = None;
        let mut next_file = None;
        let mut last_sequence = None;
        let mut records = 0u64;

        loop {
            match reader.read_record()? {
                ReadOutcome::Record(payload) => {
                    let edit = VersionEdit::decode(&payload)?;
                    if let Some(name) = &edit.comparator {
                        let expected = self.cmp.user_comparator().name();
                        if name != expected {
                            return Err(StrataError::invalid_argument(format!(
                                "{} does not match existing comparator {}",
                                expected, name
                            )));
                        }
                    }
                    builder.apply(&edit, &mut self.compact_pointers);
                    log_number = edit.log_number.or(log_number);
                    next_file = edit.next_file_number.or(next_file);
                    last_sequence = edit.last_sequence.or(last_sequence);
                    records += 1;
                }
                ReadOutcome::Eof => break,
                ReadOutcome::Truncated => {
                    warn!(manifest = %manifest_path.display(), "Ignoring torn manifest tail");
                    break;
                }
                ReadOutcome::Corrupted { offset, reason } => {
                    return Err(StrataError::corruption(format!(
                        "{} at offset {}: {}",
                        manifest_name, offset, reason
                    )));
                }
            }
        }

        let next_file = next_file.ok_or_else(|| StrataError::corruption("no next-file entry in manifest"))?;
        let log_number = log_number.ok_or_else(|| StrataError::corruption("no log-number entry in manifest"))?;
        let last_sequence =
            last_sequence.ok_or_else(|| StrataError::corruption("no last-sequence entry in manifest"))?;

        let mut version = builder.save(self.cmp.clone(), Arc::clone(&self.table_cache));
        finalize(&mut version);
        self.append_version(version);

        self.manifest_file_number = manifest_number;
        self.next_file_number = next_file.max(manifest_number + 1);
        self.last_sequence = last_sequence;
        self.log_number = log_number;
        self.mark_file_number_used(log_number);

        info!(
            manifest = %manifest_name,
            records,
            next_file = self.next_file_number,
            last_sequence,
            log_number,
            "Recovered version set"
        );
        Ok(())
    }

    /// Apply `edit` to the current version, persist it, and install the
    /// result. The first call after open starts a fresh manifest holding a
    /// full snapshot.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        match edit.log_number {
            Some(number) => {
                debug_assert!(number >= self.log_number);
                debug_assert!(number < self.next_file_number);
            }
            None => edit.set_log_number(self.log_number),
        }
        edit.set_next_file(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let mut builder = Builder::new(&self.current);
        builder.apply(edit, &mut self.compact_pointers);
        let mut version = builder.save(self.cmp.clone(), Arc::clone(&self.table_cache));
        finalize(&mut version);

        let new_manifest = match self.descriptor_log {
            Some(_) => None,
            None => Some(self.new_file_number()),
        };

        if let Err(e) = self.write_edit(edit, new_manifest) {
            self.descriptor_log = None;
            if let Some(number) = new_manifest {
                let _ = fs::remove_file(descriptor_file_name(&self.dir, number));
            }
            return Err(e);
        }

        if let Some(number) = new_manifest {
            debug!(manifest = number, "Started new manifest");
            self.manifest_file_number = number;
        }
        self.append_version(version);
        if let Some(number) = edit.log_number {
            self.log_number = number;
        }
        Ok(())
    }

    fn write_edit(&mut self, edit: &VersionEdit, new_manifest: Option<u64>) -> Result<()> {
        if let Some(number) = new_manifest {
            let mut writer = WalWriter::create(&descriptor_file_name(&self.dir, number))?;
            writer.add_record(&self.snapshot_edit().encode()?)?;
            self.descriptor_log = Some(writer);
        }
        let Some(log) = self.descriptor_log.as_mut() else {
            return Err(StrataError::Background("manifest writer missing".into()));
        };
        log.add_record(&edit.encode()?)?;
        log.sync()?;
        if let Some(number) = new_manifest {
            set_current_file(&self.dir, number)?;
        }
        Ok(())
    }

    /// Edit describing the whole current state
    fn snapshot_edit(&self) -> VersionEdit {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.cmp.user_comparator().name());
        for (level, pointer) in self.compact_pointers.iter().enumerate() {
            if !pointer.is_empty() {
                edit.set_compact_pointer(level, pointer);
            }
        }
        for level in 0..NUM_LEVELS {
            for file in self.current.files(level) {
                edit.add_file(level, FileMetaData::clone(file));
            }
        }
        edit
    }

    fn append_version(&mut self, version: Version) {
        let version = Arc::new(version);
        self.live.retain(|v| v.strong_count() > 0);
        self.live.push(Arc::downgrade(&version));
        self.current = version;
    }

    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&self.current)
    }

    /// Numbers of every table referenced by any live version
    pub fn live_files(&mut self) -> HashSet<u64> {
        self.live.retain(|v| v.strong_count() > 0);
        let mut live = HashSet::new();
        for version in self.live.iter().filter_map(Weak::upgrade) {
            for level in 0..NUM_LEVELS {
                live.extend(version.files(level).iter().map(|f| f.number));
            }
        }
        live
    }

    pub fn new_file_number(&mut self) -> u64 {
        let number = self.next_file_number;
        self.next_file_number += 1;
        number
    }

    /// Hand back a number obtained from `new_file_number` that went unused.
    pub fn reuse_file_number(&mut self, number: u64) {
        if self.next_file_number == number + 1 {
            self.next_file_number = number;
        }
    }

    pub fn mark_file_number_used(&mut self, number: u64) {
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    pub fn set_last_sequence(&mut self, sequence: SequenceNumber) {
        debug_assert!(sequence >= self.last_sequence);
        self.last_sequence = sequence;
    }

    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    pub fn manifest_file_number(&self) -> u64 {
        self.manifest_file_number
    }

    pub fn num_level_files(&self, level: usize) -> usize {
        self.current.num_files(level)
    }

    pub fn num_level_bytes(&self, level: usize) -> u64 {
        self.current.level_bytes(level)
    }

    pub fn needs_compaction(&self) -> bool {
        self.current.compaction_score >= 1.0
    }

    /// Approximate byte offset of `internal_key` across all of `version`'s
    /// tables, as if they were laid end to end.
    pub fn approximate_offset_of(&self, version: &Version, internal_key: &[u8]) -> u64 {
        let mut result = 0;
        for level in 0..NUM_LEVELS {
            for file in version.files(level) {
                if self.cmp.compare(&file.largest, internal_key) != std::cmp::Ordering::Greater {
                    result += file.file_size;
                } else if self.cmp.compare(&file.smallest, internal_key) == std::cmp::Ordering::Greater {
                    // Deeper-level files are sorted; nothing further can overlap.
                    if level > 0 {
                        break;
                    }
                } else if let Ok(table) = self.table_cache.find_table(file.number, file.file_size) {
                    result += table.approximate_offset_of(internal_key);
                }
            }
        }
        result
    }

    /// One-line level summary, e.g. `files[ 3 1 0 0 0 0 0 ]`
    pub fn level_summary(&self) -> String {
        let counts: Vec<String> = (0..NUM_LEVELS).map(|l| self.num_level_files(l).to_string()).collect();
        format!("files[ {} ]", counts.join(" "))
    }
}

/// Write a brand-new manifest holding a single edit and point CURRENT at it.
pub(crate) fn write_fresh_manifest(dir: &Path, number: u64, edit: &VersionEdit) -> Result<()> {
    let path = descriptor_file_name(dir, number);
    let result = (|| {
        let mut writer = WalWriter::create(&path)?;
        writer.add_record(&edit.encode()?)?;
        writer.sync()?;
        set_current_file(dir, number)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&path);
    }
    result
}

/// Choose the level most in need of compaction.
fn finalize(version: &mut Version) {
    let mut best_level = 0;
    let mut best_score = -1.0;
    for level in 0..NUM_LEVELS - 1 {
        let score = if level == 0 {
            // Count files rather than bytes: each level-0 file is merged on
            // every read.
            version.files[0].len() as f64 / L0_COMPACTION_TRIGGER as f64
        } else {
            total_file_size(&version.files[level]) as f64 / max_bytes_for_level(level)
        };
        if score > best_score {
            best_level = level;
            best_score = score;
        }
    }
    version.compaction_level = best_level;
    version.compaction_score = best_score;
}

/// Accumulates edits on top of a base version.
struct Builder<'a> {
    base: &'a Version,
    deleted: [HashSet<u64>; NUM_LEVELS],
    added: [Vec<Arc<FileMetaData>>; NUM_LEVELS],
}

impl<'a> Builder<'a> {
    fn new(base: &'a Version) -> Self {
        Self {
            base,
            deleted: Default::default(),
            added: Default::default(),
        }
    }

    fn apply(&mut self, edit: &VersionEdit, compact_pointers: &mut [Vec<u8>; NUM_LEVELS]) {
        for (level, key) in &edit.compact_pointers {
            compact_pointers[*level] = key.clone();
        }
        for &(level, number) in &edit.deleted_files {
            self.deleted[level].insert(number);
        }
        for (level, file) in &edit.new_files {
            self.deleted[*level].remove(&file.number);
            self.added[*level].push(Arc::new(file.clone()));
        }
    }

    fn save(&self, cmp: InternalKeyComparator, table_cache: Arc<TableCache>) -> Version {
        let mut version = Version::new(cmp, table_cache);
        for level in 0..NUM_LEVELS {
            let mut files: Vec<Arc<FileMetaData>> = self.base.files[level]
                .iter()
                .chain(self.added[level].iter())
                .filter(|f| !self.deleted[level].contains(&f.number))
                .cloned()
                .collect();
            files.sort_by(|a, b| {
                version
                    .cmp
                    .compare(&a.smallest, &b.smallest)
                    .then(a.number.cmp(&b.number))
            });
            if cfg!(debug_assertions) && level > 0 {
                for pair in files.windows(2) {
                    debug_assert!(
                        version.cmp.compare(&pair[0].largest, &pair[1].smallest) == std::cmp::Ordering::Less,
                        "overlapping ranges in level {}",
                        level
                    );
                }
            }
            version.files[level] = files;
        }
        version
    }
}
