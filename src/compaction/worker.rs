//! Background worker: memory-table flushes and compactions.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use parking_lot::MutexGuard;
use tracing::{debug, error, info, warn};

use crate::comparator::Comparator;
use crate::engine::{BackgroundTask, EngineInner, EngineState};
use crate::error::{Result, StrataError};
use crate::filename::{parse_file_name, table_file_name, FileType};
use crate::iterator::InternalIterator;
use crate::key::{extract_user_key, make_internal_key, parse_internal_key, ValueType, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK};
use crate::storage::TableBuilder;
use crate::version::{FileMetaData, VersionEdit};

use super::{build_table, Compaction, CompactionStats};

/// Attempts per background task before the error becomes sticky
const MAX_BACKGROUND_ATTEMPTS: u32 = 3;

/// Backoff between attempts, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

type StateGuard<'a> = MutexGuard<'a, EngineState>;

impl EngineInner {
    /// Worker thread body
    pub(crate) fn background_loop(self: Arc<Self>, tasks: Receiver<BackgroundTask>) {
        debug!("Background worker started");
        while let Ok(task) = tasks.recv() {
            match task {
                BackgroundTask::Compact => self.background_call(),
                BackgroundTask::Shutdown => break,
            }
        }
        debug!("Background worker stopped");
    }

    /// Queue background work if there is any and none is queued already.
    pub(crate) fn maybe_schedule_compaction(&self, state: &mut EngineState) {
        if state.bg_scheduled || state.bg_error.is_some() || self.shutting_down.load(AtomicOrdering::Acquire) {
            return;
        }
        if state.imm.is_none() && !state.versions.needs_compaction() {
            return;
        }
        state.bg_scheduled = true;
        if self.bg_sender.send(BackgroundTask::Compact).is_err() {
            state.bg_scheduled = false;
        }
    }

    fn background_call(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.bg_scheduled);

        if !self.shutting_down.load(AtomicOrdering::Acquire) && state.bg_error.is_none() {
            let mut attempt = 1;
            loop {
                match self.background_compaction(&mut state) {
                    Ok(()) => break,
                    Err(e) if self.shutting_down.load(AtomicOrdering::Acquire) => {
                        debug!(error = %e, "Background work abandoned for shutdown");
                        break;
                    }
                    Err(e) if attempt < MAX_BACKGROUND_ATTEMPTS => {
                        warn!(attempt, error = %e, "Background work failed; retrying");
                        let backoff = RETRY_BACKOFF * attempt;
                        MutexGuard::unlocked(&mut state, || thread::sleep(backoff));
                        attempt += 1;
                    }
                    Err(e) => {
                        error!(attempts = attempt, error = %e, "Background work failed; giving up");
                        state.bg_error = Some(StrataError::Background(e.to_string()));
                        break;
                    }
                }
            }
        }

        state.bg_scheduled = false;
        // The finished work may have pushed another level over its limit
        self.maybe_schedule_compaction(&mut state);
        self.bg_cv.notify_all();
    }

    fn background_compaction(&self, state: &mut StateGuard<'_>) -> Result<()> {
        if state.imm.is_some() {
            return self.compact_memtable(state);
        }
        match state.versions.pick_compaction() {
            Some(compaction) => self.run_compaction(state, compaction, false),
            None => Ok(()),
        }
    }

    /// Write the frozen memory table to a table and drop it.
    pub(crate) fn compact_memtable(&self, state: &mut StateGuard<'_>) -> Result<()> {
        let Some(imm) = state.imm.clone() else {
            return Ok(());
        };
        let start = Instant::now();
        let base = state.versions.current();
        let number = state.versions.new_file_number();
        state.pending_outputs.insert(number);

        let mut iter = imm.iter();
        let built = MutexGuard::unlocked(state, || {
            build_table(&self.dir, &self.options, &self.cmp, &self.table_cache, &mut iter, number)
        });
        let meta = match built {
            Ok(meta) => meta,
            Err(e) => {
                state.pending_outputs.remove(&number);
                return Err(e);
            }
        };

        let mut edit = VersionEdit::new();
        let mut level = 0;
        if meta.file_size > 0 {
            level = base.pick_level_for_memtable_output(
                extract_user_key(&meta.smallest),
                extract_user_key(&meta.largest),
                self.options.max_file_size,
            );
            edit.add_file(level, meta.clone());
        }
        // Everything in older logs is now in a table
        edit.set_log_number(state.logfile_number);
        let installed = state.versions.log_and_apply(&mut edit);
        state.pending_outputs.remove(&number);
        installed?;

        let stats = CompactionStats {
            micros: start.elapsed().as_micros() as u64,
            bytes_read: 0,
            bytes_written: meta.file_size,
        };
        state.stats[level].add(&stats);
        state.imm = None;
        self.has_imm.store(false, AtomicOrdering::Release);

        info!(
            table = number,
            level,
            entries = imm.entry_count(),
            bytes = meta.file_size,
            summary = %state.versions.level_summary(),
            "Flushed memory table"
        );
        self.delete_obsolete_files(state);
        Ok(())
    }

    /// Compact `[begin, end]` (user keys) at `level` in the caller's thread.
    pub(crate) fn run_manual_compaction(&self, level: usize, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        let begin = begin.map(|k| make_internal_key(k, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK));
        let end = end.map(|k| make_internal_key(k, 0, ValueType::Deletion));

        let mut state = self.state.lock();
        loop {
            while state.bg_scheduled {
                self.bg_cv.wait(&mut state);
            }
            if let Some(e) = &state.bg_error {
                return Err(e.clone());
            }
            let Some(compaction) = state.versions.compact_range(level, begin.as_deref(), end.as_deref()) else {
                break;
            };

            state.bg_scheduled = true;
            let result = self.run_compaction(&mut state, compaction, true);
            state.bg_scheduled = false;
            self.maybe_schedule_compaction(&mut state);
            self.bg_cv.notify_all();
            result?;
        }
        Ok(())
    }

    fn run_compaction(&self, state: &mut StateGuard<'_>, mut c: Compaction, manual: bool) -> Result<()> {
        if !manual && c.is_trivial_move() {
            let file = Arc::clone(&c.inputs[0][0]);
            let level = c.level();
            c.edit.remove_file(level, file.number);
            c.edit.add_file(level + 1, FileMetaData::clone(&file));
            state.versions.log_and_apply(&mut c.edit)?;
            info!(
                table = file.number,
                from = level,
                to = level + 1,
                bytes = file.file_size,
                summary = %state.versions.level_summary(),
                "Moved table"
            );
            return Ok(());
        }
        self.do_compaction_work(state, c)
    }

    fn do_compaction_work(&self, state: &mut StateGuard<'_>, mut c: Compaction) -> Result<()> {
        let start = Instant::now();
        let level = c.level();
        info!(
            level,
            inputs = c.num_input_files(0),
            next_level_inputs = c.num_input_files(1),
            bytes = c.input_bytes(),
            "Compacting"
        );

        // Entries at or below this sequence only need their newest version
        let smallest_snapshot = self
            .snapshots
            .oldest()
            .unwrap_or_else(|| state.versions.last_sequence());

        let mut outputs = Vec::new();
        let merged = MutexGuard::unlocked(state, || self.merge_inputs(&mut c, smallest_snapshot, &mut outputs));
        let result = merged.and_then(|()| {
            c.add_input_deletions();
            for output in &outputs {
                c.edit.add_file(level + 1, output.clone());
            }
            state.versions.log_and_apply(&mut c.edit)
        });

        for output in &outputs {
            state.pending_outputs.remove(&output.number);
        }
        if let Err(e) = result {
            for output in &outputs {
                self.table_cache.evict(output.number);
                let _ = fs::remove_file(table_file_name(&self.dir, output.number));
            }
            return Err(e);
        }

        let stats = CompactionStats {
            micros: start.elapsed().as_micros() as u64,
            bytes_read: c.input_bytes(),
            bytes_written: outputs.iter().map(|o| o.file_size).sum(),
        };
        state.stats[level + 1].add(&stats);
        info!(
            level,
            outputs = outputs.len(),
            bytes_read = stats.bytes_read,
            bytes_written = stats.bytes_written,
            summary = %state.versions.level_summary(),
            "Compacted"
        );
        self.delete_obsolete_files(state);
        Ok(())
    }

    /// Merge the compaction inputs into new tables, dropping entries no
    /// reader can see. Runs without the state lock.
    fn merge_inputs(&self, c: &mut Compaction, smallest_snapshot: u64, outputs: &mut Vec<FileMetaData>) -> Result<()> {
        let mut input = c.input_iterator(&self.options, &self.table_cache);
        let user_cmp = Arc::clone(self.cmp.user_comparator());
        let mut builder: Option<TableBuilder> = None;
        let mut current_user_key: Option<Vec<u8>> = None;
        let mut last_sequence_for_key = MAX_SEQUENCE_NUMBER;

        input.seek_to_first();
        while input.valid() {
            if self.shutting_down.load(AtomicOrdering::Acquire) {
                return Err(StrataError::Background("compaction interrupted by shutdown".into()));
            }
            if self.has_imm.load(AtomicOrdering::Acquire) {
                // Flushing takes priority so writers are not held up
                let mut state = self.state.lock();
                if state.imm.is_some() {
                    self.compact_memtable(&mut state)?;
                    self.bg_cv.notify_all();
                }
            }

            let key = input.key();
            let stop = c.should_stop_before(key);
            if stop && builder.is_some() {
                self.finish_output(&mut builder, outputs)?;
            }

            let mut drop = false;
            match parse_internal_key(key) {
                None => {
                    // Keep malformed keys and forget the current user key
                    current_user_key = None;
                    last_sequence_for_key = MAX_SEQUENCE_NUMBER;
                }
                Some(ikey) => {
                    let first_occurrence = match &current_user_key {
                        Some(current) => user_cmp.compare(ikey.user_key, current) != Ordering::Equal,
                        None => true,
                    };
                    if first_occurrence {
                        current_user_key = Some(ikey.user_key.to_vec());
                        last_sequence_for_key = MAX_SEQUENCE_NUMBER;
                    }

                    if last_sequence_for_key <= smallest_snapshot {
                        // Shadowed by a newer entry every snapshot can see
                        drop = true;
                    } else if ikey.value_type == ValueType::Deletion
                        && ikey.sequence <= smallest_snapshot
                        && c.is_base_level_for_key(ikey.user_key)
                    {
                        // Nothing older below to hide, and every snapshot
                        // already sees the key as deleted
                        drop = true;
                    }
                    last_sequence_for_key = ikey.sequence;
                }
            }

            if !drop {
                let table = match builder.take() {
                    Some(table) => table,
                    None => self.open_output(key, outputs)?,
                };
                let table = builder.insert(table);
                table.add(key, input.value())?;
                if let Some(meta) = outputs.last_mut() {
                    meta.largest.clear();
                    meta.largest.extend_from_slice(key);
                }
                if table.file_size() >= c.max_output_file_size() {
                    self.finish_output(&mut builder, outputs)?;
                }
            }
            input.next();
        }

        input.status()?;
        self.finish_output(&mut builder, outputs)
    }

    fn open_output(&self, first_key: &[u8], outputs: &mut Vec<FileMetaData>) -> Result<TableBuilder> {
        let number = {
            let mut state = self.state.lock();
            let number = state.versions.new_file_number();
            state.pending_outputs.insert(number);
            number
        };
        outputs.push(FileMetaData {
            number,
            file_size: 0,
            smallest: first_key.to_vec(),
            largest: first_key.to_vec(),
        });
        let file = File::create(table_file_name(&self.dir, number))?;
        Ok(TableBuilder::new(&self.options, self.cmp.clone(), file))
    }

    fn finish_output(&self, builder: &mut Option<TableBuilder>, outputs: &mut [FileMetaData]) -> Result<()> {
        let Some(mut table) = builder.take() else {
            return Ok(());
        };
        let Some(meta) = outputs.last_mut() else {
            table.abandon();
            return Ok(());
        };
        let entries = table.num_entries();
        meta.file_size = table.finish()?;
        // Make sure the new table is readable before it is installed
        self.table_cache.find_table(meta.number, meta.file_size)?;
        debug!(table = meta.number, entries, bytes = meta.file_size, "Compaction output written");
        Ok(())
    }

    /// Delete files no live version, pending output or current log needs.
    pub(crate) fn delete_obsolete_files(&self, state: &mut EngineState) {
        if state.bg_error.is_some() {
            // After a failure it is unclear which files are still needed
            return;
        }
        let mut live = state.versions.live_files();
        live.extend(state.pending_outputs.iter().copied());
        let log_number = state.versions.log_number();
        let manifest_number = state.versions.manifest_file_number();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cannot list database directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some((number, kind)) = file_name.to_str().and_then(parse_file_name) else {
                continue;
            };
            let keep = match kind {
                FileType::Log => number >= log_number,
                FileType::Descriptor => number >= manifest_number,
                FileType::Table | FileType::Temp => live.contains(&number),
                FileType::Current => true,
            };
            if keep {
                continue;
            }
            if kind == FileType::Table {
                self.table_cache.evict(number);
            }
            debug!(file = ?file_name, "Deleting obsolete file");
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(file = ?file_name, error = %e, "Failed to delete obsolete file");
            }
        }
    }
}
