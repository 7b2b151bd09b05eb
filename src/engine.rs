//! Engine Module
//!
//! The database instance: coordinates the write-ahead log, memory tables,
//! the version set and the background compaction worker.
//!
//! ## Responsibilities
//! - Open, create and recover a database directory
//! - Assign sequence numbers and apply write batches
//! - Point lookups and iterators as of the latest state or a snapshot
//! - Freeze full memory tables and hand them to the background worker
//! - Introspection (`property`, `approximate_sizes`) and manual compaction

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::batch::WriteBatch;
use crate::compaction::{build_table, CompactionStats};
use crate::config::{Options, ReadOptions, WriteOptions};
use crate::error::{Result, StrataError};
use crate::filename::{current_file_name, log_file_name, parse_file_name, sst_table_file_name, table_file_name, FileType};
use crate::iterator::{DbIterator, InternalIterator, MergingIterator};
use crate::key::{make_internal_key, InternalKeyComparator, LookupKey, SequenceNumber, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK};
use crate::memtable::{MemTable, MemTableEntry};
use crate::snapshot::{Snapshot, SnapshotList};
use crate::storage::{BlockCache, TableCache};
use crate::version::{
    write_fresh_manifest, VersionEdit, VersionSet, L0_SLOWDOWN_WRITES_TRIGGER, L0_STOP_WRITES_TRIGGER, NUM_LEVELS,
};
use crate::wal::{WalEntry, WalRecovery, WalWriter};

/// Key range `[start, limit)` for `Engine::approximate_sizes`
#[derive(Debug, Clone, Copy)]
pub struct Range<'a> {
    pub start: &'a [u8],
    pub limit: &'a [u8],
}

impl<'a> Range<'a> {
    pub fn new(start: &'a [u8], limit: &'a [u8]) -> Self {
        Self { start, limit }
    }
}

/// Messages for the background worker
pub(crate) enum BackgroundTask {
    Compact,
    Shutdown,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/write): serialized by `write_lock`
///   - Lock order: write_lock → state → wal
///   - One sequence number per batch, published after the whole batch is
///     in the memory table
///
/// - **Reads** (get/iter): take the state lock only long enough to clone
///   `Arc`s to the memory tables and the current version, then read without
///   any engine lock
///
/// - **Background**: one worker thread flushes frozen memory tables and runs
///   compactions; it holds the state lock only while picking work and
///   installing results
pub struct Engine {
    inner: Arc<EngineInner>,
    worker: Option<JoinHandle<()>>,
}

/// State shared with the background worker
pub(crate) struct EngineInner {
    pub(crate) dir: PathBuf,
    pub(crate) options: Options,
    pub(crate) cmp: InternalKeyComparator,
    pub(crate) table_cache: Arc<TableCache>,
    block_cache: Arc<BlockCache>,
    pub(crate) snapshots: Arc<SnapshotList>,

    /// Serializes writers
    write_lock: Mutex<()>,

    /// Log for the active memory table
    wal: Mutex<WalWriter>,

    pub(crate) state: Mutex<EngineState>,

    /// Signalled whenever background work finishes
    pub(crate) bg_cv: Condvar,
    pub(crate) bg_sender: Sender<BackgroundTask>,
    pub(crate) shutting_down: AtomicBool,

    /// Mirrors `state.imm.is_some()` so compaction can poll it unlocked
    pub(crate) has_imm: AtomicBool,
}

/// Everything guarded by the state mutex
pub(crate) struct EngineState {
    pub(crate) mem: Arc<MemTable>,
    /// Frozen memory table waiting to be flushed
    pub(crate) imm: Option<Arc<MemTable>>,
    pub(crate) logfile_number: u64,
    pub(crate) versions: VersionSet,
    pub(crate) bg_scheduled: bool,
    /// Sticky error after background work gave up
    pub(crate) bg_error: Option<StrataError>,
    /// Table numbers being written that no version references yet
    pub(crate) pending_outputs: HashSet<u64>,
    pub(crate) stats: [CompactionStats; NUM_LEVELS],
}

impl Engine {
    /// Open the database at `path`
    ///
    /// On startup:
    /// 1. Create the directory and an empty manifest if allowed and missing
    /// 2. Recover the version set from the manifest
    /// 3. Replay logs newer than the manifest's log number into level-0 tables
    /// 4. Start a fresh log and record it in a new manifest
    /// 5. Delete obsolete files and start the background worker
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;
        let dir = path.as_ref().to_path_buf();

        let mut options = options;
        let block_cache = options.block_cache.clone().unwrap_or_default();
        options.block_cache = Some(Arc::clone(&block_cache));

        if current_file_name(&dir).exists() {
            if options.error_if_exists {
                return Err(StrataError::invalid_argument(format!(
                    "{} exists (error_if_exists is true)",
                    dir.display()
                )));
            }
        } else if options.create_if_missing {
            fs::create_dir_all(&dir)?;
            new_db(&dir, &options)?;
        } else {
            return Err(StrataError::NotFound(format!(
                "{} does not exist (create_if_missing is false)",
                dir.display()
            )));
        }

        let cmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
        let table_cache = Arc::new(TableCache::new(
            &dir,
            cmp.clone(),
            Arc::clone(&block_cache),
            options.max_open_files,
            options.paranoid_checks,
        ));

        let mut versions = VersionSet::new(&dir, &options, cmp.clone(), Arc::clone(&table_cache));
        versions.recover()?;
        check_tables_present(&dir, &versions)?;

        let mut edit = VersionEdit::new();
        recover_logs(&dir, &options, &cmp, &table_cache, &mut versions, &mut edit)?;

        let logfile_number = versions.new_file_number();
        let wal = WalWriter::create(&log_file_name(&dir, logfile_number))?;
        edit.set_log_number(logfile_number);
        versions.log_and_apply(&mut edit)?;

        info!(
            path = %dir.display(),
            last_sequence = versions.last_sequence(),
            log = logfile_number,
            levels = %versions.level_summary(),
            "Opened database"
        );

        let (bg_sender, bg_receiver) = channel::unbounded();
        let inner = Arc::new(EngineInner {
            dir,
            cmp: cmp.clone(),
            table_cache,
            block_cache,
            snapshots: SnapshotList::new(),
            write_lock: Mutex::new(()),
            wal: Mutex::new(wal),
            state: Mutex::new(EngineState {
                mem: Arc::new(MemTable::new(cmp)),
                imm: None,
                logfile_number,
                versions,
                bg_scheduled: false,
                bg_error: None,
                pending_outputs: HashSet::new(),
                stats: Default::default(),
            }),
            bg_cv: Condvar::new(),
            bg_sender,
            shutting_down: AtomicBool::new(false),
            has_imm: AtomicBool::new(false),
            options,
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("stratakv-bg".into())
            .spawn(move || worker_inner.background_loop(bg_receiver))?;

        {
            let mut state = inner.state.lock();
            inner.delete_obsolete_files(&mut state);
            inner.maybe_schedule_compaction(&mut state);
        }

        Ok(Self {
            inner,
            worker: Some(worker),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply `batch` atomically under one sequence number.
    ///
    /// Steps:
    /// 1. Acquire the write lock and make room in the memory table
    /// 2. Append the batch to the log (and fsync if `options.sync`)
    /// 3. Insert every operation into the memory table
    /// 4. Publish the new sequence number
    pub fn write(&self, options: &WriteOptions, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let _writer = self.inner.write_lock.lock();

        let (mem, sequence) = {
            let mut state = self.inner.state.lock();
            self.inner.make_room_for_write(&mut state, false)?;
            (Arc::clone(&state.mem), state.versions.last_sequence() + 1)
        };
        if sequence > MAX_SEQUENCE_NUMBER {
            return Err(StrataError::invalid_argument("sequence numbers exhausted"));
        }

        let entry = WalEntry::new(sequence, batch.into_operations());
        let logged = {
            let mut wal = self.inner.wal.lock();
            wal.append(&entry).and_then(|()| if options.sync { wal.sync() } else { Ok(()) })
        };
        if let Err(e) = logged {
            // The log may end in a torn record; anything appended after it
            // would be lost on replay
            error!(error = %e, sequence, "Log write failed");
            self.inner.state.lock().bg_error = Some(e.clone());
            return Err(e);
        }

        mem.apply(sequence, &entry.operations);
        self.inner.state.lock().versions.set_last_sequence(sequence);
        Ok(())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(&WriteOptions::default(), key, value)
    }

    pub fn put_with(&self, options: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(options, batch)
    }

    /// Delete `key`; deleting a missing key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.delete_with(&WriteOptions::default(), key)
    }

    pub fn delete_with(&self, options: &WriteOptions, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(options, batch)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Latest value of `key`, or `None` if it was never written or is deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_with(&ReadOptions::default(), key)
    }

    /// Search order:
    /// 1. Active memory table
    /// 2. Frozen memory table
    /// 3. Tables of the current version, level 0 first
    pub fn get_with(&self, options: &ReadOptions<'_>, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (mem, imm, version, sequence) = {
            let state = self.inner.state.lock();
            let sequence = match options.snapshot {
                Some(snapshot) => snapshot.sequence(),
                None => state.versions.last_sequence(),
            };
            (Arc::clone(&state.mem), state.imm.clone(), state.versions.current(), sequence)
        };

        let lookup = LookupKey::new(key, sequence);
        if let Some(entry) = mem.get(&lookup) {
            return Ok(entry.into_value());
        }
        if let Some(entry) = imm.as_ref().and_then(|imm| imm.get(&lookup)) {
            return Ok(entry.into_value());
        }

        let found = version.get(&lookup, self.verify_checksums(options), options.fill_cache)?;
        Ok(found.and_then(MemTableEntry::into_value))
    }

    /// Iterator over the database as of now, or as of `options.snapshot`.
    /// The iterator is not positioned until one of its `seek*` methods runs.
    pub fn iter(&self, options: &ReadOptions<'_>) -> DbIterator {
        let (mut children, version, sequence) = {
            let state = self.inner.state.lock();
            let sequence = match options.snapshot {
                Some(snapshot) => snapshot.sequence(),
                None => state.versions.last_sequence(),
            };
            let mut children: Vec<Box<dyn InternalIterator>> = vec![Box::new(state.mem.iter())];
            if let Some(imm) = &state.imm {
                children.push(Box::new(imm.iter()));
            }
            (children, state.versions.current(), sequence)
        };
        version.add_iterators(self.verify_checksums(options), options.fill_cache, &mut children);

        let merged = MergingIterator::new(self.inner.cmp.clone(), children);
        DbIterator::new(
            Arc::clone(self.inner.cmp.user_comparator()),
            Box::new(merged),
            sequence,
            version,
        )
    }

    fn verify_checksums(&self, options: &ReadOptions<'_>) -> bool {
        options.verify_checksums || self.inner.options.paranoid_checks
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Capture the current sequence number as a read view.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock();
        self.inner.snapshots.acquire(state.versions.last_sequence())
    }

    /// Release a snapshot. Dropping it has the same effect.
    pub fn release_snapshot(&self, snapshot: Snapshot) {
        drop(snapshot);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Value of an introspection property, `None` for unknown names.
    ///
    /// - `leveldb.num-files-at-level<N>`
    /// - `leveldb.stats`
    /// - `leveldb.sstables`
    /// - `leveldb.approximate-memory-usage`
    pub fn property(&self, name: &str) -> Option<String> {
        let name = name.strip_prefix("leveldb.")?;
        let state = self.inner.state.lock();

        if let Some(level) = name.strip_prefix("num-files-at-level") {
            let level: usize = level.parse().ok()?;
            if level >= NUM_LEVELS {
                return None;
            }
            return Some(state.versions.num_level_files(level).to_string());
        }

        match name {
            "stats" => {
                const MB: f64 = 1_048_576.0;
                let mut out = String::new();
                out.push_str("                               Compactions\n");
                out.push_str("Level  Files Size(MB) Time(sec) Read(MB) Write(MB)\n");
                out.push_str("--------------------------------------------------\n");
                for level in 0..NUM_LEVELS {
                    let files = state.versions.num_level_files(level);
                    let stats = &state.stats[level];
                    if files == 0 && stats.micros == 0 {
                        continue;
                    }
                    let _ = writeln!(
                        out,
                        "{:3} {:8} {:8.0} {:9.0} {:8.0} {:9.0}",
                        level,
                        files,
                        state.versions.num_level_bytes(level) as f64 / MB,
                        stats.micros as f64 / 1e6,
                        stats.bytes_read as f64 / MB,
                        stats.bytes_written as f64 / MB,
                    );
                }
                Some(out)
            }
            "sstables" => Some(state.versions.current().debug_string()),
            "approximate-memory-usage" => {
                let mut total = self.inner.block_cache.total_charge() + state.mem.approximate_memory_usage();
                if let Some(imm) = &state.imm {
                    total += imm.approximate_memory_usage();
                }
                Some(total.to_string())
            }
            _ => None,
        }
    }

    /// Approximate on-disk bytes holding each range. Data still in memory
    /// tables is not counted.
    pub fn approximate_sizes(&self, ranges: &[Range<'_>]) -> Vec<u64> {
        let state = self.inner.state.lock();
        let version = state.versions.current();
        ranges
            .iter()
            .map(|range| {
                let start = make_internal_key(range.start, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
                let limit = make_internal_key(range.limit, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
                let start = state.versions.approximate_offset_of(&version, &start);
                let limit = state.versions.approximate_offset_of(&version, &limit);
                limit.saturating_sub(start)
            })
            .collect()
    }

    // =========================================================================
    // Manual Compaction
    // =========================================================================

    /// Compact every level overlapping the user-key range `[begin, end]`
    /// (`None` is unbounded). The memory table is flushed first.
    pub fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        let max_level_with_files = {
            let state = self.inner.state.lock();
            let version = state.versions.current();
            (1..NUM_LEVELS)
                .filter(|&level| version.overlap_in_level(level, begin, end))
                .max()
                .unwrap_or(1)
        };

        self.flush_memtable()?;
        for level in 0..max_level_with_files {
            self.inner.run_manual_compaction(level, begin, end)?;
        }
        Ok(())
    }

    /// Freeze the memory table and wait for it to reach disk.
    fn flush_memtable(&self) -> Result<()> {
        let _writer = self.inner.write_lock.lock();
        let mut state = self.inner.state.lock();
        if !state.mem.is_empty() {
            self.inner.make_room_for_write(&mut state, true)?;
        }
        while state.imm.is_some() && state.bg_error.is_none() {
            self.inner.bg_cv.wait(&mut state);
        }
        match &state.bg_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Waits for in-flight background work, stops the worker and syncs the
    /// active log. Unflushed writes are recovered from the log on next open.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.inner.shutting_down.store(true, AtomicOrdering::Release);
        {
            let mut state = self.inner.state.lock();
            while state.bg_scheduled {
                self.inner.bg_cv.wait(&mut state);
            }
        }
        let _ = self.inner.bg_sender.send(BackgroundTask::Shutdown);
        if worker.join().is_err() {
            error!("Background worker panicked");
        }
        self.inner.wal.lock().sync()?;
        debug!(path = %self.inner.dir.display(), "Closed database");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the database directory path
    pub fn path(&self) -> &Path {
        &self.inner.dir
    }

    /// Sequence number of the last applied batch
    pub fn last_sequence(&self) -> SequenceNumber {
        self.inner.state.lock().versions.last_sequence()
    }

    pub fn num_files_at_level(&self, level: usize) -> usize {
        if level >= NUM_LEVELS {
            return 0;
        }
        self.inner.state.lock().versions.num_level_files(level)
    }

    /// Options in effect, including the block cache actually used
    pub fn options(&self) -> &Options {
        &self.inner.options
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Error while closing database");
        }
    }
}

impl EngineInner {
    /// Ensure the active memory table has room for a write, freezing it when
    /// full. `force` freezes a non-empty table regardless of its size.
    pub(crate) fn make_room_for_write(&self, state: &mut MutexGuard<'_, EngineState>, force: bool) -> Result<()> {
        let mut allow_delay = !force;
        let mut force = force;
        loop {
            if let Some(e) = &state.bg_error {
                return Err(e.clone());
            }

            if allow_delay && state.versions.num_level_files(0) >= L0_SLOWDOWN_WRITES_TRIGGER {
                // Spread the delay across writers instead of stalling one
                // for seconds at the hard limit
                MutexGuard::unlocked(state, || thread::sleep(Duration::from_millis(1)));
                allow_delay = false;
            } else if !force && state.mem.approximate_memory_usage() <= self.options.write_buffer_size {
                return Ok(());
            } else if state.imm.is_some() {
                debug!("Memory table full; waiting for flush");
                self.bg_cv.wait(state);
            } else if state.versions.num_level_files(0) >= L0_STOP_WRITES_TRIGGER {
                warn!(files = state.versions.num_level_files(0), "Too many level-0 files; waiting");
                self.bg_cv.wait(state);
            } else {
                let number = state.versions.new_file_number();
                let writer = match WalWriter::create(&log_file_name(&self.dir, number)) {
                    Ok(writer) => writer,
                    Err(e) => {
                        state.versions.reuse_file_number(number);
                        return Err(e);
                    }
                };
                *self.wal.lock() = writer;
                state.logfile_number = number;

                let full = std::mem::replace(&mut state.mem, Arc::new(MemTable::new(self.cmp.clone())));
                debug!(
                    entries = full.entry_count(),
                    bytes = full.approximate_memory_usage(),
                    log = number,
                    "Froze memory table"
                );
                state.imm = Some(full);
                self.has_imm.store(true, AtomicOrdering::Release);
                force = false;
                self.maybe_schedule_compaction(state);
            }
        }
    }
}

/// Write the manifest of an empty database.
fn new_db(dir: &Path, options: &Options) -> Result<()> {
    let mut edit = VersionEdit::new();
    edit.set_comparator_name(options.comparator.name());
    edit.set_log_number(0);
    edit.set_next_file(2);
    edit.set_last_sequence(0);
    write_fresh_manifest(dir, 1, &edit)?;
    info!(path = %dir.display(), "Created new database");
    Ok(())
}

/// Every table the manifest names must be on disk.
fn check_tables_present(dir: &Path, versions: &VersionSet) -> Result<()> {
    let version = versions.current();
    let missing: Vec<u64> = (0..NUM_LEVELS)
        .flat_map(|level| version.files(level).iter().map(|f| f.number))
        .filter(|&number| !table_file_name(dir, number).exists() && !sst_table_file_name(dir, number).exists())
        .collect();
    match missing.first() {
        None => Ok(()),
        Some(first) => Err(StrataError::corruption(format!(
            "{} missing files; e.g.: {}",
            missing.len(),
            table_file_name(dir, *first).display()
        ))),
    }
}

/// Replay logs the manifest does not cover into level-0 tables recorded in
/// `edit`, and raise the version set's sequence watermark past them.
fn recover_logs(
    dir: &Path,
    options: &Options,
    cmp: &InternalKeyComparator,
    table_cache: &TableCache,
    versions: &mut VersionSet,
    edit: &mut VersionEdit,
) -> Result<()> {
    let min_log = versions.log_number();
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some((number, FileType::Log)) = entry.file_name().to_str().and_then(parse_file_name) {
            if number >= min_log {
                logs.push(number);
            }
        }
    }
    logs.sort_unstable();

    let mut max_sequence = versions.last_sequence();
    for number in logs {
        versions.mark_file_number_used(number);
        let path = log_file_name(dir, number);
        let mut mem = Arc::new(MemTable::new(cmp.clone()));
        let mut tables = 0;

        let result = WalRecovery::replay(&path, |entry| {
            mem.apply(entry.sequence, &entry.operations);
            max_sequence = max_sequence.max(entry.sequence);
            if mem.approximate_memory_usage() > options.write_buffer_size {
                write_level0_table(dir, options, cmp, table_cache, versions, &mem, edit)?;
                mem = Arc::new(MemTable::new(cmp.clone()));
                tables += 1;
            }
            Ok(())
        })?;

        if result.entries_corrupted > 0 {
            if options.paranoid_checks {
                return Err(StrataError::corruption(format!(
                    "{}: corrupted record after {} entries",
                    path.display(),
                    result.entries_recovered
                )));
            }
            warn!(log = number, recovered = result.entries_recovered, "Dropped corrupted log tail");
        } else if result.was_truncated {
            warn!(log = number, recovered = result.entries_recovered, "Ignoring torn log tail");
        }

        if !mem.is_empty() {
            write_level0_table(dir, options, cmp, table_cache, versions, &mem, edit)?;
            tables += 1;
        }
        info!(
            log = number,
            entries = result.entries_recovered,
            last_sequence = result.last_sequence,
            tables,
            "Recovered log"
        );
    }

    if max_sequence > versions.last_sequence() {
        versions.set_last_sequence(max_sequence);
    }
    Ok(())
}

fn write_level0_table(
    dir: &Path,
    options: &Options,
    cmp: &InternalKeyComparator,
    table_cache: &TableCache,
    versions: &mut VersionSet,
    mem: &Arc<MemTable>,
    edit: &mut VersionEdit,
) -> Result<()> {
    let number = versions.new_file_number();
    let mut iter = mem.iter();
    let meta = build_table(dir, options, cmp, table_cache, &mut iter, number)?;
    debug!(table = number, entries = mem.entry_count(), bytes = meta.file_size, "Level-0 table written");
    if meta.file_size > 0 {
        edit.add_file(0, meta);
    }
    Ok(())
}

/// Remove every file the engine owns under `path`, then the directory if it
/// ends up empty. A missing directory is not an error.
pub fn destroy_database(path: impl AsRef<Path>, _options: &Options) -> Result<()> {
    let dir = path.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut first_error = None;
    for entry in entries {
        let entry = entry?;
        let owned = entry.file_name().to_str().and_then(parse_file_name).is_some();
        if owned {
            if let Err(e) = fs::remove_file(entry.path()) {
                first_error.get_or_insert(StrataError::Io(e));
            }
        }
    }
    // Fails harmlessly when foreign files remain
    let _ = fs::remove_dir(dir);

    info!(path = %dir.display(), "Destroyed database");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
