//! Table Builder
//!
//! Writes internal-key-ordered entries to a new table file.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::comparator::Comparator;
use crate::config::{Compression, Options};
use crate::error::Result;
use crate::key::{extract_user_key, InternalKeyComparator};

use super::block::BlockBuilder;
use super::filter::BloomFilterBuilder;
use super::format::{block_checksum, BlockHandle, Footer};
use super::FILTER_META_KEY;

/// Builder for creating a table from sorted entries
///
/// Call `add()` in strictly increasing internal-key order, then `finish()`
/// (or `abandon()` to give up on the file).
pub struct TableBuilder {
    writer: BufWriter<File>,
    cmp: InternalKeyComparator,
    block_size: usize,
    compression: Compression,
    /// Current write position
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter: Option<BloomFilterBuilder>,
    last_key: Vec<u8>,
    num_entries: u64,
    /// Set after a data block is flushed; its index entry is written once the
    /// next key is known so a short separator can be chosen
    pending_index_entry: bool,
    pending_handle: BlockHandle,
    closed: bool,
}

impl TableBuilder {
    pub fn new(options: &Options, cmp: InternalKeyComparator, file: File) -> Self {
        Self {
            writer: BufWriter::new(file),
            cmp,
            block_size: options.block_size,
            compression: options.compression,
            offset: 0,
            data_block: BlockBuilder::new(options.block_restart_interval),
            // Index entries are few; every one is a restart point.
            index_block: BlockBuilder::new(1),
            filter: (options.bloom_bits_per_key > 0)
                .then(|| BloomFilterBuilder::new(options.bloom_bits_per_key)),
            last_key: Vec::new(),
            num_entries: 0,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            closed: false,
        }
    }

    /// Add an entry (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.closed);
        debug_assert!(
            self.num_entries == 0
                || self.cmp.compare(key, &self.last_key) == std::cmp::Ordering::Greater
        );

        if self.pending_index_entry {
            self.cmp.find_shortest_separator(&mut self.last_key, key);
            let handle = self.pending_handle.encode();
            self.index_block.add(&self.last_key, &handle);
            self.pending_index_entry = false;
        }

        if let Some(filter) = self.filter.as_mut() {
            filter.add_key(extract_user_key(key));
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out the buffered data block, if any.
    pub fn flush(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(!self.pending_index_entry);
        let contents = self.data_block.finish().to_vec();
        self.pending_handle = self.write_block(&contents)?;
        self.data_block.reset();
        self.pending_index_entry = true;
        Ok(())
    }

    /// Finish building: write filter, metaindex, index and footer, then sync.
    /// Returns the final file size.
    pub fn finish(&mut self) -> Result<u64> {
        self.flush()?;
        self.closed = true;

        let filter_handle = match self.filter.as_ref() {
            Some(filter) => {
                let contents = filter.finish();
                Some(self.write_raw_block(&contents, Compression::None)?)
            }
            None => None,
        };

        let mut metaindex = BlockBuilder::new(1);
        if let Some(handle) = filter_handle {
            metaindex.add(FILTER_META_KEY, &handle.encode());
        }
        let contents = metaindex.finish().to_vec();
        let metaindex_handle = self.write_raw_block(&contents, Compression::None)?;

        if self.pending_index_entry {
            self.cmp.find_short_successor(&mut self.last_key);
            let handle = self.pending_handle.encode();
            self.index_block.add(&self.last_key, &handle);
            self.pending_index_entry = false;
        }
        let contents = self.index_block.finish().to_vec();
        let index_handle = self.write_block(&contents)?;

        let footer = Footer {
            metaindex: metaindex_handle,
            index: index_handle,
        }
        .encode();
        self.writer.write_all(&footer)?;
        self.offset += footer.len() as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.offset)
    }

    /// Stop building; the caller removes the file.
    pub fn abandon(&mut self) {
        self.closed = true;
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far (the final size after `finish`)
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    fn write_block(&mut self, raw: &[u8]) -> Result<BlockHandle> {
        match self.compression {
            Compression::None => self.write_raw_block(raw, Compression::None),
            Compression::Lz4 => match lz4::block::compress(raw, None, true) {
                // Keep compression only when it saves at least 12.5%
                Ok(compressed) if compressed.len() < raw.len() - raw.len() / 8 => {
                    self.write_raw_block(&compressed, Compression::Lz4)
                }
                _ => self.write_raw_block(raw, Compression::None),
            },
        }
    }

    fn write_raw_block(&mut self, contents: &[u8], compression: Compression) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, contents.len() as u64);
        let block_type = compression as u8;
        self.writer.write_all(contents)?;
        self.writer.write_all(&[block_type])?;
        self.writer
            .write_all(&block_checksum(contents, block_type).to_le_bytes())?;
        self.offset += (contents.len() + super::BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }
}
