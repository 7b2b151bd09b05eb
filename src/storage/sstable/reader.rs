//! Table Reader
//!
//! Opens a table file, keeps its index block and filter in memory and reads
//! data blocks through the shared block cache.

use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::{Result, StrataError};
use crate::iterator::{InternalIterator, TwoLevelIterator};
use crate::key::{extract_user_key, InternalKeyComparator};
use crate::storage::{BlockCache, RandomAccessFile};

use super::block::{Block, BlockIter};
use super::filter::bloom_may_contain;
use super::format::{read_block, BlockHandle, Footer, FOOTER_SIZE};
use super::FILTER_META_KEY;

/// An open, immutable table
pub struct Table {
    file: RandomAccessFile,
    cmp: Arc<dyn Comparator>,
    cache: Arc<BlockCache>,
    cache_id: u64,
    index_block: Block,
    filter: Option<Bytes>,
    metaindex_handle: BlockHandle,
    /// Verify every block read, whatever the caller asks for
    paranoid_checks: bool,
}

impl Table {
    /// Open a table of `file_size` bytes.
    ///
    /// A missing or unreadable filter is not fatal; the table is served
    /// without one.
    pub fn open(
        file: RandomAccessFile,
        file_size: u64,
        cmp: InternalKeyComparator,
        cache: Arc<BlockCache>,
        paranoid_checks: bool,
    ) -> Result<Self> {
        if file_size < FOOTER_SIZE as u64 {
            return Err(StrataError::corruption(format!(
                "file {} is too short to be a sorted table",
                file.path().display()
            )));
        }

        let footer_bytes = file.read_at(file_size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_bytes)?;

        let index_block = Block::new(read_block(&file, &footer.index, paranoid_checks)?)?;

        let mut table = Self {
            file,
            cmp: Arc::new(cmp),
            cache_id: cache.new_id(),
            cache,
            index_block,
            filter: None,
            metaindex_handle: footer.metaindex,
            paranoid_checks,
        };

        match table.read_filter(&footer.metaindex) {
            Ok(filter) => table.filter = filter,
            Err(e) if paranoid_checks => return Err(e),
            Err(e) => warn!(path = %table.file.path().display(), error = %e, "Ignoring table filter"),
        }

        Ok(table)
    }

    fn read_filter(&self, metaindex: &BlockHandle) -> Result<Option<Bytes>> {
        let meta = Block::new(read_block(&self.file, metaindex, self.paranoid_checks)?)?;
        let mut iter = meta.iter(BytewiseComparator::shared());
        iter.seek(FILTER_META_KEY);
        if !iter.valid() || iter.key() != FILTER_META_KEY {
            return Ok(None);
        }
        let handle = BlockHandle::decode(iter.value())?;
        Ok(Some(read_block(&self.file, &handle, self.paranoid_checks)?))
    }

    /// Iterator over the data block named by an encoded handle.
    fn block_reader(&self, encoded_handle: &[u8], verify_checksums: bool, fill_cache: bool) -> Result<BlockIter> {
        let handle = BlockHandle::decode(encoded_handle)?;
        let verify = verify_checksums || self.paranoid_checks;

        let block = match self.cache.lookup(self.cache_id, handle.offset) {
            Some(block) => block,
            None => {
                let block = Block::new(read_block(&self.file, &handle, verify)?)?;
                if fill_cache {
                    self.cache.insert(self.cache_id, handle.offset, block.clone());
                }
                block
            }
        };
        Ok(block.iter(Arc::clone(&self.cmp)))
    }

    /// First entry whose key is ≥ `internal_key`, if it lives in the block the
    /// index points at. The caller checks whether the user key matches.
    pub fn internal_get(
        &self,
        internal_key: &[u8],
        verify_checksums: bool,
        fill_cache: bool,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut index = self.index_block.iter(Arc::clone(&self.cmp));
        index.seek(internal_key);
        if !index.valid() {
            return index.status().map(|_| None);
        }

        if let Some(filter) = &self.filter {
            if !bloom_may_contain(filter, extract_user_key(internal_key)) {
                return Ok(None);
            }
        }

        let mut block = self.block_reader(index.value(), verify_checksums, fill_cache)?;
        block.seek(internal_key);
        if block.valid() {
            return Ok(Some((block.key().to_vec(), block.value().to_vec())));
        }
        block.status()?;
        Ok(None)
    }

    /// Ordered iterator over every entry. Keeps the table open while alive.
    pub fn iter(self: &Arc<Self>, verify_checksums: bool, fill_cache: bool) -> TwoLevelIterator {
        let index = self.index_block.iter(Arc::clone(&self.cmp));
        let table = Arc::clone(self);
        TwoLevelIterator::new(
            Box::new(index),
            Box::new(move |handle: &[u8]| {
                table
                    .block_reader(handle, verify_checksums, fill_cache)
                    .map(|iter| Box::new(iter) as Box<dyn InternalIterator>)
            }),
        )
    }

    /// Approximate file offset where data for `internal_key` begins. Keys past
    /// the last entry map to the end of the data section.
    pub fn approximate_offset_of(&self, internal_key: &[u8]) -> u64 {
        let mut index = self.index_block.iter(Arc::clone(&self.cmp));
        index.seek(internal_key);
        if index.valid() {
            if let Ok(handle) = BlockHandle::decode(index.value()) {
                return handle.offset;
            }
        }
        self.metaindex_handle.offset
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }
}
