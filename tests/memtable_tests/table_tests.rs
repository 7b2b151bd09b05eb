//! MemTable Tests
//!
//! Tests verify:
//! - Point lookups by sequence ceiling
//! - Tombstone handling
//! - Batch application
//! - Size tracking
//! - Ordered, bidirectional iteration over internal keys
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use stratakv::comparator::BytewiseComparator;
use stratakv::iterator::InternalIterator;
use stratakv::key::{parse_internal_key, InternalKeyComparator, LookupKey, ValueType, MAX_SEQUENCE_NUMBER};
use stratakv::memtable::{MemTable, MemTableEntry};
use stratakv::wal::Operation;

// =============================================================================
// Helper Functions
// =============================================================================

fn new_memtable() -> MemTable {
    MemTable::new(InternalKeyComparator::new(BytewiseComparator::shared()))
}

fn get(memtable: &MemTable, key: &[u8], sequence: u64) -> Option<MemTableEntry> {
    memtable.get(&LookupKey::new(key, sequence))
}

fn value(v: &[u8]) -> Option<MemTableEntry> {
    Some(MemTableEntry::Value(v.to_vec()))
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = new_memtable();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.approximate_memory_usage(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_add_and_get() {
    let memtable = new_memtable();
    memtable.add(1, ValueType::Value, b"key1", b"value1");

    assert_eq!(get(&memtable, b"key1", 1), value(b"value1"));
    assert_eq!(get(&memtable, b"key1", 100), value(b"value1"));
}

#[test]
fn test_get_nonexistent_key() {
    let memtable = new_memtable();
    memtable.add(1, ValueType::Value, b"b", b"x");

    assert_eq!(get(&memtable, b"a", 10), None);
    assert_eq!(get(&memtable, b"c", 10), None);
    // A key that merely has the lookup key as a prefix is a different key
    assert_eq!(get(&memtable, b"", 10), None);
}

#[test]
fn test_newer_versions_shadow_older() {
    let memtable = new_memtable();
    memtable.add(1, ValueType::Value, b"key", b"v1");
    memtable.add(2, ValueType::Value, b"key", b"v2");
    memtable.add(3, ValueType::Value, b"key", b"v3");

    assert_eq!(memtable.entry_count(), 3);
    assert_eq!(get(&memtable, b"key", 3), value(b"v3"));
    assert_eq!(get(&memtable, b"key", 2), value(b"v2"));
    assert_eq!(get(&memtable, b"key", 1), value(b"v1"));
}

#[test]
fn test_entries_newer_than_ceiling_are_invisible() {
    let memtable = new_memtable();
    memtable.add(5, ValueType::Value, b"key", b"later");

    assert_eq!(get(&memtable, b"key", 4), None);
    assert_eq!(get(&memtable, b"key", 5), value(b"later"));
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_delete_creates_tombstone() {
    let memtable = new_memtable();
    memtable.add(1, ValueType::Value, b"key", b"value");
    memtable.add(2, ValueType::Deletion, b"key", b"");

    assert_eq!(get(&memtable, b"key", 2), Some(MemTableEntry::Tombstone));
    assert_eq!(get(&memtable, b"key", 1), value(b"value"));
}

#[test]
fn test_tombstone_reads_as_absent() {
    assert_eq!(MemTableEntry::Tombstone.into_value(), None);
    assert_eq!(MemTableEntry::Value(b"v".to_vec()).into_value(), Some(b"v".to_vec()));
}

#[test]
fn test_put_after_delete() {
    let memtable = new_memtable();
    memtable.add(1, ValueType::Deletion, b"key", b"");
    memtable.add(2, ValueType::Value, b"key", b"back");

    assert_eq!(get(&memtable, b"key", 2), value(b"back"));
    assert_eq!(get(&memtable, b"key", 1), Some(MemTableEntry::Tombstone));
}

// =============================================================================
// Batch Application Tests
// =============================================================================

#[test]
fn test_apply_batch_shares_sequence() {
    let memtable = new_memtable();
    memtable.apply(
        7,
        &[
            Operation::Put { key: b"a".to_vec(), value: b"1".to_vec() },
            Operation::Put { key: b"b".to_vec(), value: b"2".to_vec() },
            Operation::Delete { key: b"c".to_vec() },
        ],
    );

    assert_eq!(get(&memtable, b"a", 7), value(b"1"));
    assert_eq!(get(&memtable, b"b", 7), value(b"2"));
    assert_eq!(get(&memtable, b"c", 7), Some(MemTableEntry::Tombstone));
    assert_eq!(get(&memtable, b"a", 6), None);
}

#[test]
fn test_last_operation_in_batch_wins() {
    let memtable = new_memtable();
    memtable.apply(
        3,
        &[
            Operation::Put { key: b"bar".to_vec(), value: b"b".to_vec() },
            Operation::Put { key: b"box".to_vec(), value: b"c".to_vec() },
            Operation::Delete { key: b"bar".to_vec() },
        ],
    );

    assert_eq!(get(&memtable, b"bar", 3), Some(MemTableEntry::Tombstone));
    assert_eq!(get(&memtable, b"box", 3), value(b"c"));
    assert_eq!(memtable.entry_count(), 2);
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_memory_usage_grows() {
    let memtable = new_memtable();

    memtable.add(1, ValueType::Value, b"key", b"value");
    let after_one = memtable.approximate_memory_usage();
    assert!(after_one >= 3 + 8 + 5);

    memtable.add(2, ValueType::Value, b"key2", &[0u8; 1000]);
    assert!(memtable.approximate_memory_usage() >= after_one + 1000);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iteration_is_sorted_newest_first_per_key() {
    let memtable = Arc::new(new_memtable());
    memtable.add(1, ValueType::Value, b"b", b"b1");
    memtable.add(2, ValueType::Value, b"a", b"a2");
    memtable.add(3, ValueType::Value, b"b", b"b3");
    memtable.add(4, ValueType::Deletion, b"c", b"");

    let mut iter = memtable.iter();
    iter.seek_to_first();

    let mut seen = Vec::new();
    while iter.valid() {
        let parsed = parse_internal_key(iter.key()).unwrap();
        seen.push((parsed.user_key.to_vec(), parsed.sequence, parsed.value_type));
        iter.next();
    }
    iter.status().unwrap();

    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), 2, ValueType::Value),
            (b"b".to_vec(), 3, ValueType::Value),
            (b"b".to_vec(), 1, ValueType::Value),
            (b"c".to_vec(), 4, ValueType::Deletion),
        ]
    );
}

#[test]
fn test_iterator_backwards_and_seek() {
    let memtable = Arc::new(new_memtable());
    for (i, key) in [b"apple", b"grape", b"mango"].iter().enumerate() {
        memtable.add(i as u64 + 1, ValueType::Value, *key, b"x");
    }

    let mut iter = memtable.iter();
    assert!(!iter.valid());

    iter.seek_to_last();
    assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"mango");
    iter.prev();
    assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"grape");
    iter.prev();
    iter.prev();
    assert!(!iter.valid());

    iter.seek(LookupKey::new(b"banana", 100).internal_key());
    assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"grape");

    iter.seek(LookupKey::new(b"zebra", 100).internal_key());
    assert!(!iter.valid());
}

#[test]
fn test_iterator_sees_inserts_after_creation() {
    let memtable = Arc::new(new_memtable());
    memtable.add(1, ValueType::Value, b"a", b"1");

    let mut iter = memtable.iter();
    memtable.add(2, ValueType::Value, b"b", b"2");

    iter.seek_to_first();
    iter.next();
    assert!(iter.valid());
    assert_eq!(iter.value(), b"2");
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers_during_writes() {
    let memtable = Arc::new(new_memtable());
    for i in 0..100u64 {
        memtable.add(i + 1, ValueType::Value, format!("key{:03}", i).as_bytes(), b"initial");
    }

    let writer = {
        let memtable = Arc::clone(&memtable);
        thread::spawn(move || {
            for i in 0..100u64 {
                memtable.add(1000 + i, ValueType::Value, format!("key{:03}", i).as_bytes(), b"updated");
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let memtable = Arc::clone(&memtable);
            thread::spawn(move || {
                for i in 0..100u64 {
                    // The original versions stay visible at their own sequence
                    let key = format!("key{:03}", i);
                    assert_eq!(
                        memtable.get(&LookupKey::new(key.as_bytes(), i + 1)),
                        Some(MemTableEntry::Value(b"initial".to_vec()))
                    );
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(memtable.entry_count(), 200);
    assert_eq!(get(&memtable, b"key050", MAX_SEQUENCE_NUMBER), value(b"updated"));
}
