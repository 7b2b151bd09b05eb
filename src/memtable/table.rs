//! MemTable implementation
//!
//! Skip-list memtable with RwLock for concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::iterator::InternalIterator;
use crate::key::{append_internal_key, parse_internal_key, InternalKeyComparator, LookupKey, SequenceNumber, ValueType};
use crate::wal::Operation;

use super::{MemTableEntry, SkipList};

/// In-memory table for recent writes
///
/// Owned by the engine while it accepts writes; once full it is frozen and
/// handed to the flush, then dropped when the last reader lets go.
pub struct MemTable {
    list: RwLock<SkipList>,
    cmp: InternalKeyComparator,
    /// Approximate bytes held, updated on every insert
    memory: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new(cmp: InternalKeyComparator) -> Self {
        Self {
            list: RwLock::new(SkipList::new(cmp.clone())),
            cmp,
            memory: AtomicUsize::new(0),
        }
    }

    /// Insert a record (write lock).
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        let mut internal_key = Vec::with_capacity(key.len() + 8);
        append_internal_key(&mut internal_key, key, sequence, value_type);

        let mut list = self.list.write();
        list.insert(internal_key, value.to_vec());
        self.memory.store(list.size_bytes(), Ordering::Release);
    }

    /// Apply one logged batch. Every operation shares `sequence`; a key
    /// repeated within the batch keeps only its last operation.
    pub fn apply(&self, sequence: SequenceNumber, operations: &[Operation]) {
        for op in operations {
            match op {
                Operation::Put { key, value } => self.add(sequence, ValueType::Value, key, value),
                Operation::Delete { key } => self.add(sequence, ValueType::Deletion, key, &[]),
            }
        }
    }

    /// Look up the newest record for the key at or below the lookup sequence.
    ///
    /// Returns:
    /// - `Some(Value)`: a live value
    /// - `Some(Tombstone)`: the key was deleted
    /// - `None`: this table has nothing for the key
    pub fn get(&self, key: &LookupKey) -> Option<MemTableEntry> {
        let list = self.list.read();
        let node = list.find_greater_or_equal(key.internal_key(), None)?;
        let parsed = parse_internal_key(list.key(node))?;
        if self.cmp.compare_user(parsed.user_key, key.user_key()) != std::cmp::Ordering::Equal {
            return None;
        }
        Some(match parsed.value_type {
            ValueType::Value => MemTableEntry::Value(list.value(node).to_vec()),
            ValueType::Deletion => MemTableEntry::Tombstone,
        })
    }

    /// Get approximate size in bytes
    pub fn approximate_memory_usage(&self) -> usize {
        self.memory.load(Ordering::Acquire)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.list.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    /// Ordered iterator over every record, including tombstones and
    /// superseded versions. The iterator keeps the table alive.
    pub fn iter(self: &Arc<Self>) -> MemTableIterator {
        MemTableIterator {
            table: Arc::clone(self),
            node: None,
            key: Vec::new(),
            value: Vec::new(),
        }
    }
}

/// Cursor over a memory table
///
/// Holds a copy of the current entry, so readers never keep the table lock
/// between calls.
pub struct MemTableIterator {
    table: Arc<MemTable>,
    node: Option<usize>,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl MemTableIterator {
    fn load(&mut self, list: &SkipList, node: Option<usize>) {
        self.node = node;
        self.key.clear();
        self.value.clear();
        if let Some(n) = node {
            self.key.extend_from_slice(list.key(n));
            self.value.extend_from_slice(list.value(n));
        }
    }
}

impl InternalIterator for MemTableIterator {
    fn valid(&self) -> bool {
        self.node.is_some()
    }

    fn seek_to_first(&mut self) {
        let table = Arc::clone(&self.table);
        let list = table.list.read();
        self.load(&list, list.first());
    }

    fn seek_to_last(&mut self) {
        let table = Arc::clone(&self.table);
        let list = table.list.read();
        self.load(&list, list.find_last());
    }

    fn seek(&mut self, target: &[u8]) {
        let table = Arc::clone(&self.table);
        let list = table.list.read();
        let node = list.find_greater_or_equal(target, None);
        self.load(&list, node);
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        let table = Arc::clone(&self.table);
        let list = table.list.read();
        let node = self.node.and_then(|n| list.next(n));
        self.load(&list, node);
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        let table = Arc::clone(&self.table);
        let list = table.list.read();
        let node = list.find_less_than(&self.key);
        self.load(&list, node);
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
