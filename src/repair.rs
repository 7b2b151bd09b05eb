//! Repair
//!
//! Rebuilds a database whose manifest is missing or damaged from whatever
//! logs and tables are still readable.
//!
//! ## Procedure
//! 1. Scan every existing table for its key range and highest sequence
//!    number; under `paranoid_checks` an unreadable table fails the repair
//!    before anything on disk changes
//! 2. Convert every log into a new level-0 table
//! 3. Write a fresh manifest naming every surviving table at level 0 and
//!    point CURRENT at it
//! 4. Only then archive the logs, the old manifests and the damaged tables
//!
//! If any step before the switch of CURRENT fails, the tables built from
//! logs are deleted and the directory is left as it was.
//!
//! Archived files go to `<db>/lost/` so nothing is ever deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::compaction::build_table;
use crate::comparator::Comparator;
use crate::config::Options;
use crate::error::{Result, StrataError};
use crate::filename::{log_file_name, parse_file_name, table_file_name, FileType};
use crate::iterator::InternalIterator;
use crate::key::{parse_internal_key, InternalKeyComparator, SequenceNumber};
use crate::memtable::MemTable;
use crate::storage::{BlockCache, TableCache};
use crate::version::{write_fresh_manifest, FileMetaData, VersionEdit};
use crate::wal::WalRecovery;

/// What a repair did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Logs turned into tables
    pub logs_converted: usize,

    /// Tables named by the new manifest
    pub tables_recovered: usize,

    /// Unreadable tables moved to `lost/`
    pub tables_dropped: usize,

    /// Highest sequence number found
    pub last_sequence: SequenceNumber,
}

/// Rebuild the manifest of the database at `path`.
///
/// The directory must exist. The database must not be open.
pub fn repair_database(path: impl AsRef<Path>, options: &Options) -> Result<RepairStats> {
    options.validate()?;
    let dir = path.as_ref();
    if !dir.is_dir() {
        return Err(StrataError::NotFound(format!("{} is not a directory", dir.display())));
    }
    Repairer::new(dir, options).run()
}

struct TableFile {
    number: u64,
    path: PathBuf,
}

struct Repairer<'a> {
    dir: &'a Path,
    options: &'a Options,
    cmp: InternalKeyComparator,
    table_cache: TableCache,
    next_file_number: u64,
    logs: Vec<u64>,
    tables: Vec<TableFile>,
    manifests: Vec<PathBuf>,
    /// Tables built from logs during this run
    created: Vec<u64>,
    dropped: Vec<PathBuf>,
    stats: RepairStats,
}

impl<'a> Repairer<'a> {
    fn new(dir: &'a Path, options: &'a Options) -> Self {
        let cmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
        let block_cache = options.block_cache.clone().unwrap_or_else(|| Arc::new(BlockCache::default()));
        let table_cache = TableCache::new(dir, cmp.clone(), block_cache, options.max_open_files, options.paranoid_checks);
        Self {
            dir,
            options,
            cmp,
            table_cache,
            next_file_number: 1,
            logs: Vec::new(),
            tables: Vec::new(),
            manifests: Vec::new(),
            created: Vec::new(),
            dropped: Vec::new(),
            stats: RepairStats::default(),
        }
    }

    fn run(mut self) -> Result<RepairStats> {
        self.find_files()?;
        let mut files = self.scan_tables()?;
        let result = self
            .convert_logs(&mut files)
            .and_then(|()| self.write_descriptor(&files));
        if let Err(e) = result {
            self.remove_created();
            return Err(e);
        }
        self.archive_inputs();

        info!(
            path = %self.dir.display(),
            logs = self.stats.logs_converted,
            tables = self.stats.tables_recovered,
            dropped = self.stats.tables_dropped,
            last_sequence = self.stats.last_sequence,
            "Repaired database"
        );
        Ok(self.stats)
    }

    fn find_files(&mut self) -> Result<()> {
        for entry in fs::read_dir(self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((number, kind)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            self.next_file_number = self.next_file_number.max(number + 1);
            match kind {
                FileType::Descriptor => self.manifests.push(entry.path()),
                FileType::Log => self.logs.push(number),
                FileType::Table => self.tables.push(TableFile {
                    number,
                    path: entry.path(),
                }),
                FileType::Current | FileType::Temp => {}
            }
        }
        self.logs.sort_unstable();
        self.tables.sort_unstable_by_key(|t| t.number);
        Ok(())
    }

    fn new_file_number(&mut self) -> u64 {
        let number = self.next_file_number;
        self.next_file_number += 1;
        number
    }

    fn convert_logs(&mut self, files: &mut Vec<FileMetaData>) -> Result<()> {
        for log in self.logs.clone() {
            match self.convert_log(log) {
                Ok(meta) => {
                    self.stats.logs_converted += 1;
                    if let Some(meta) = meta {
                        self.stats.tables_recovered += 1;
                        files.push(meta);
                    }
                }
                Err(e) if self.options.paranoid_checks => {
                    return Err(StrataError::corruption(format!("log {}: {}", log, e)));
                }
                Err(e) => warn!(log, error = %e, "Ignoring unreadable log"),
            }
        }
        Ok(())
    }

    fn convert_log(&mut self, log: u64) -> Result<Option<FileMetaData>> {
        let mem = Arc::new(MemTable::new(self.cmp.clone()));
        let result = WalRecovery::replay(&log_file_name(self.dir, log), |entry| {
            mem.apply(entry.sequence, &entry.operations);
            Ok(())
        })?;
        if result.entries_corrupted > 0 || result.was_truncated {
            warn!(log, recovered = result.entries_recovered, "Log ends in a damaged record");
        }
        if mem.is_empty() {
            return Ok(None);
        }

        let number = self.new_file_number();
        let mut iter = mem.iter();
        let meta = build_table(self.dir, self.options, &self.cmp, &self.table_cache, &mut iter, number)?;
        if meta.file_size == 0 {
            return Ok(None);
        }
        self.created.push(number);
        self.stats.last_sequence = self.stats.last_sequence.max(result.last_sequence);
        info!(log, table = number, entries = mem.entry_count(), bytes = meta.file_size, "Converted log");
        Ok(Some(meta))
    }

    fn scan_tables(&mut self) -> Result<Vec<FileMetaData>> {
        let mut files = Vec::new();
        for table in std::mem::take(&mut self.tables) {
            match self.scan_table(&table) {
                Ok(meta) => {
                    self.stats.tables_recovered += 1;
                    files.push(meta);
                }
                Err(e) if self.options.paranoid_checks => {
                    return Err(StrataError::corruption(format!(
                        "table {}: {}",
                        table.path.display(),
                        e
                    )));
                }
                Err(e) => {
                    warn!(table = table.number, error = %e, "Dropping damaged table");
                    self.stats.tables_dropped += 1;
                    self.table_cache.evict(table.number);
                    self.dropped.push(table.path);
                }
            }
        }
        Ok(files)
    }

    /// Read a whole table with checksums on, collecting its key range.
    fn scan_table(&mut self, table: &TableFile) -> Result<FileMetaData> {
        let file_size = fs::metadata(&table.path)?.len();
        self.table_cache.find_table(table.number, file_size)?;

        let mut iter = self.table_cache.iter(table.number, file_size, true, false);
        let mut meta = FileMetaData {
            number: table.number,
            file_size,
            smallest: Vec::new(),
            largest: Vec::new(),
        };
        let mut entries = 0u64;
        iter.seek_to_first();
        while iter.valid() {
            let key = iter.key();
            let parsed = parse_internal_key(key)
                .ok_or_else(|| StrataError::corruption(format!("malformed key after {} entries", entries)))?;
            self.stats.last_sequence = self.stats.last_sequence.max(parsed.sequence);
            if entries == 0 {
                meta.smallest = key.to_vec();
            }
            meta.largest.clear();
            meta.largest.extend_from_slice(key);
            entries += 1;
            iter.next();
        }
        iter.status()?;
        if entries == 0 {
            return Err(StrataError::corruption("table holds no entries"));
        }
        Ok(meta)
    }

    fn write_descriptor(&mut self, files: &[FileMetaData]) -> Result<()> {
        let manifest_number = self.new_file_number();
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.options.comparator.name());
        edit.set_log_number(0);
        edit.set_next_file(self.next_file_number);
        edit.set_last_sequence(self.stats.last_sequence);
        for file in files {
            edit.add_file(0, file.clone());
        }
        write_fresh_manifest(self.dir, manifest_number, &edit)
    }

    fn remove_created(&mut self) {
        for number in std::mem::take(&mut self.created) {
            self.table_cache.evict(number);
            let path = table_file_name(self.dir, number);
            if let Err(e) = fs::remove_file(&path) {
                warn!(file = %path.display(), error = %e, "Failed to remove table");
            }
        }
    }

    /// Archive what the new manifest replaced.
    fn archive_inputs(&mut self) {
        for log in std::mem::take(&mut self.logs) {
            self.archive(&log_file_name(self.dir, log));
        }
        let mut stale = std::mem::take(&mut self.manifests);
        stale.append(&mut self.dropped);
        for path in stale {
            self.archive(&path);
        }
    }

    /// Move a file into `lost/`; failures are only logged.
    fn archive(&self, path: &Path) {
        let lost = self.dir.join("lost");
        let Some(name) = path.file_name() else {
            return;
        };
        let result = fs::create_dir_all(&lost).and_then(|()| fs::rename(path, lost.join(name)));
        if let Err(e) = result {
            warn!(file = %path.display(), error = %e, "Failed to archive file");
        }
    }
}
