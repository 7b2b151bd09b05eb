//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory, ordered by internal key
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered, bidirectional iteration for reads and flushes
//!
//! ## Data Structure Choice
//! An arena-backed skip list behind a `RwLock`:
//! - Ordered by the injected comparator (a `BTreeMap` cannot take one)
//! - Nodes are never removed, so iterator positions stay valid across inserts
//! - A full table is replaced, not cleared: readers holding the old `Arc`
//!   keep a consistent view

mod skiplist;
mod table;

pub use skiplist::{SkipList, MAX_HEIGHT};
pub use table::{MemTable, MemTableIterator};

/// Result of a memory-table point lookup
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// The value a reader sees: tombstones read as absent.
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MemTableEntry::Value(value) => Some(value),
            MemTableEntry::Tombstone => None,
        }
    }
}
