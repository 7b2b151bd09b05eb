//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults. `Options` is consumed at
//! open time; `ReadOptions` and `WriteOptions` are passed per call.

use std::fmt;
use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::{Result, StrataError};
use crate::snapshot::Snapshot;
use crate::storage::BlockCache;

/// Block compression applied to sorted-table blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// Store blocks raw
    None = 0x00,
    /// LZ4 block compression
    Lz4 = 0x01,
}

impl Compression {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Compression::None),
            0x01 => Some(Compression::Lz4),
            _ => None,
        }
    }
}

/// Main configuration for a StrataKV instance
#[derive(Clone)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Open Behaviour
    // -------------------------------------------------------------------------
    /// Create the database if it is missing
    pub create_if_missing: bool,

    /// Fail to open if the database already exists
    pub error_if_exists: bool,

    /// Treat any detected corruption as fatal (open, reads, repair)
    pub paranoid_checks: bool,

    // -------------------------------------------------------------------------
    // Write Path
    // -------------------------------------------------------------------------
    /// Bytes buffered in the memory table before it is flushed
    pub write_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Sorted Tables
    // -------------------------------------------------------------------------
    /// Upper bound on tables kept open by the table cache
    pub max_open_files: usize,

    /// Approximate uncompressed size of a data block
    pub block_size: usize,

    /// Entries between restart points inside a block
    pub block_restart_interval: usize,

    pub compression: Compression,

    /// Bloom filter bits per key (0 disables filters)
    pub bloom_bits_per_key: usize,

    /// Target size of a compaction output table
    pub max_file_size: usize,

    // -------------------------------------------------------------------------
    // Shared Resources
    // -------------------------------------------------------------------------
    /// Total order over user keys
    pub comparator: Arc<dyn Comparator>,

    /// Block cache shared between instances; a private one is created if unset
    pub block_cache: Option<Arc<BlockCache>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            max_open_files: 1000,
            block_size: 4 * 1024, // 4 KB
            block_restart_interval: 16,
            compression: Compression::Lz4,
            bloom_bits_per_key: 10,
            max_file_size: 2 * 1024 * 1024, // 2 MB
            comparator: BytewiseComparator::shared(),
            block_cache: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("max_open_files", &self.max_open_files)
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .field("bloom_bits_per_key", &self.bloom_bits_per_key)
            .field("max_file_size", &self.max_file_size)
            .field("comparator", &self.comparator.name())
            .field("block_cache", &self.block_cache.as_ref().map(|c| c.capacity()))
            .finish()
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(StrataError::invalid_argument("block_size must be positive"));
        }
        if self.block_restart_interval == 0 {
            return Err(StrataError::invalid_argument(
                "block_restart_interval must be at least 1",
            ));
        }
        if self.write_buffer_size == 0 {
            return Err(StrataError::invalid_argument("write_buffer_size must be positive"));
        }
        if self.max_file_size == 0 {
            return Err(StrataError::invalid_argument("max_file_size must be positive"));
        }
        Ok(())
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.options.create_if_missing = value;
        self
    }

    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.options.error_if_exists = value;
        self
    }

    pub fn paranoid_checks(mut self, value: bool) -> Self {
        self.options.paranoid_checks = value;
        self
    }

    /// Set the memory table size limit (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.options.write_buffer_size = size;
        self
    }

    pub fn max_open_files(mut self, count: usize) -> Self {
        self.options.max_open_files = count;
        self
    }

    /// Set the data block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.options.block_size = size;
        self
    }

    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.options.block_restart_interval = interval;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.options.compression = compression;
        self
    }

    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.options.bloom_bits_per_key = bits;
        self
    }

    /// Set the compaction output file size (in bytes)
    pub fn max_file_size(mut self, size: usize) -> Self {
        self.options.max_file_size = size;
        self
    }

    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.options.comparator = comparator;
        self
    }

    pub fn block_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.options.block_cache = Some(cache);
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

/// Per-read options
#[derive(Clone, Copy)]
pub struct ReadOptions<'a> {
    /// Verify block checksums on every read
    pub verify_checksums: bool,

    /// Insert blocks read by this call into the block cache
    pub fill_cache: bool,

    /// Read as of this snapshot instead of the latest state
    pub snapshot: Option<&'a Snapshot>,
}

impl Default for ReadOptions<'_> {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            snapshot: None,
        }
    }
}

impl<'a> ReadOptions<'a> {
    pub fn with_snapshot(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ReadOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("verify_checksums", &self.verify_checksums)
            .field("fill_cache", &self.fill_cache)
            .field("snapshot", &self.snapshot.map(|s| s.sequence()))
            .finish()
    }
}

/// Per-write options
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// fsync the log before acknowledging the write
    pub sync: bool,
}

impl WriteOptions {
    pub fn sync() -> Self {
        Self { sync: true }
    }
}
