//! Table Cache
//!
//! Bounded set of open tables keyed by file number, so reads do not reopen
//! files and the number of descriptors stays under `max_open_files`.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StrataError};
use crate::filename::{sst_table_file_name, table_file_name};
use crate::iterator::{EmptyIterator, InternalIterator};
use crate::key::InternalKeyComparator;

use super::{BlockCache, RandomAccessFile, Table};

/// Descriptors kept back for logs, manifests and the like
const RESERVED_FILES: usize = 10;

pub struct TableCache {
    dir: PathBuf,
    cmp: InternalKeyComparator,
    block_cache: Arc<BlockCache>,
    paranoid_checks: bool,
    tables: Mutex<LruCache<u64, Arc<Table>>>,
}

impl TableCache {
    pub fn new(
        dir: &Path,
        cmp: InternalKeyComparator,
        block_cache: Arc<BlockCache>,
        max_open_files: usize,
        paranoid_checks: bool,
    ) -> Self {
        let entries = max_open_files.saturating_sub(RESERVED_FILES).max(1);
        Self {
            dir: dir.to_path_buf(),
            cmp,
            block_cache,
            paranoid_checks,
            tables: Mutex::new(LruCache::new(
                NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Return the open table for `file_number`, opening it on a miss.
    pub fn find_table(&self, file_number: u64, file_size: u64) -> Result<Arc<Table>> {
        if let Some(table) = self.tables.lock().get(&file_number) {
            return Ok(Arc::clone(table));
        }

        // Open outside the lock; a racing open of the same file is harmless.
        let file = match RandomAccessFile::open(&table_file_name(&self.dir, file_number)) {
            Ok(file) => file,
            Err(StrataError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                RandomAccessFile::open(&sst_table_file_name(&self.dir, file_number))?
            }
            Err(e) => return Err(e),
        };
        let table = Arc::new(Table::open(
            file,
            file_size,
            self.cmp.clone(),
            Arc::clone(&self.block_cache),
            self.paranoid_checks,
        )?);
        debug!(file_number, file_size, "Opened table");

        self.tables.lock().put(file_number, Arc::clone(&table));
        Ok(table)
    }

    /// Point lookup inside one table. See [`Table::internal_get`].
    pub fn get(
        &self,
        file_number: u64,
        file_size: u64,
        internal_key: &[u8],
        verify_checksums: bool,
        fill_cache: bool,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let table = self.find_table(file_number, file_size)?;
        table.internal_get(internal_key, verify_checksums, fill_cache)
    }

    /// Iterator over one table. Open failures surface through `status()`.
    pub fn iter(
        &self,
        file_number: u64,
        file_size: u64,
        verify_checksums: bool,
        fill_cache: bool,
    ) -> Box<dyn InternalIterator> {
        match self.find_table(file_number, file_size) {
            Ok(table) => Box::new(table.iter(verify_checksums, fill_cache)),
            Err(e) => Box::new(EmptyIterator::with_error(e)),
        }
    }

    /// Drop a table that is about to be deleted.
    pub fn evict(&self, file_number: u64) {
        self.tables.lock().pop(&file_number);
    }

    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
