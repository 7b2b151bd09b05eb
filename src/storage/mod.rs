//! Storage Module
//!
//! Persistent storage layer: immutable sorted tables plus the caches that sit
//! in front of them.
//!
//! ## Responsibilities
//! - Build sorted tables from flushed memory tables and compaction output
//! - Point lookups and ordered scans over a single table
//! - Keep decoded blocks in a shared, byte-bounded LRU (`BlockCache`)
//! - Keep open table handles in a count-bounded LRU (`TableCache`)

mod cache;
mod file;
pub mod sstable;
mod table_cache;

pub use cache::BlockCache;
pub use file::RandomAccessFile;
pub use sstable::{Block, BlockHandle, Table, TableBuilder};
pub use table_cache::TableCache;
