//! Tests for sorted table implementation
//!
//! These tests verify:
//! - Table creation and the footer/index layout
//! - Point lookups through the index and bloom filter
//! - Tombstones and multiple versions per user key
//! - Ordered, bidirectional iteration
//! - Compression and checksum verification
//! - Approximate offsets

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stratakv::comparator::BytewiseComparator;
use stratakv::iterator::InternalIterator;
use stratakv::key::{extract_user_key, make_internal_key, InternalKeyComparator, LookupKey, ValueType};
use stratakv::storage::{BlockCache, RandomAccessFile, Table, TableBuilder};
use stratakv::{Compression, Options};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_table() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("000001.ldb");
    (temp_dir, path)
}

fn icmp() -> InternalKeyComparator {
    InternalKeyComparator::new(BytewiseComparator::shared())
}

fn small_blocks(compression: Compression) -> Options {
    Options::builder()
        .block_size(256)
        .block_restart_interval(4)
        .compression(compression)
        .build()
}

/// Build a table of `count` numbered keys, one version each. Returns the file size.
fn build_numbered(path: &Path, options: &Options, count: usize) -> u64 {
    let mut builder = TableBuilder::new(options, icmp(), File::create(path).unwrap());
    for i in 0..count {
        let key = make_internal_key(format!("key{:05}", i).as_bytes(), i as u64 + 1, ValueType::Value);
        builder.add(&key, format!("value{}", i).as_bytes()).unwrap();
    }
    let size = builder.finish().unwrap();
    assert_eq!(builder.num_entries(), count as u64);
    size
}

fn open_table(path: &Path, size: u64) -> Arc<Table> {
    let file = RandomAccessFile::open(path).unwrap();
    Arc::new(Table::open(file, size, icmp(), Arc::new(BlockCache::new(1 << 20)), false).unwrap())
}

/// Point lookup returning the value when the found entry is for the same user key
fn lookup(table: &Table, key: &str, sequence: u64) -> Option<(ValueType, Vec<u8>)> {
    let lookup = LookupKey::new(key.as_bytes(), sequence);
    let (found, value) = table.internal_get(lookup.internal_key(), false, true).unwrap()?;
    if extract_user_key(&found) != key.as_bytes() {
        return None;
    }
    let parsed = stratakv::key::parse_internal_key(&found).unwrap();
    Some((parsed.value_type, value))
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_creates_file_of_reported_size() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &small_blocks(Compression::None), 100);

    assert!(path.exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
}

#[test]
fn test_empty_table_opens_and_iterates_nothing() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &Options::default(), 0);

    let table = open_table(&path, size);
    let mut iter = table.iter(true, true);
    iter.seek_to_first();
    assert!(!iter.valid());
    iter.status().unwrap();
}

#[test]
fn test_short_file_is_corruption() {
    let (_temp, path) = setup_temp_table();
    std::fs::write(&path, b"not a table").unwrap();

    let file = RandomAccessFile::open(&path).unwrap();
    let err = Table::open(file, 11, icmp(), Arc::new(BlockCache::default()), false)
        .err()
        .unwrap();
    assert!(err.is_corruption());
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_point_lookups_across_blocks() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &small_blocks(Compression::None), 500);
    let table = open_table(&path, size);

    for i in [0usize, 1, 77, 250, 499] {
        let found = lookup(&table, &format!("key{:05}", i), u64::MAX >> 8);
        assert_eq!(found, Some((ValueType::Value, format!("value{}", i).into_bytes())));
    }
    assert_eq!(lookup(&table, "key99999", u64::MAX >> 8), None);
    assert_eq!(lookup(&table, "aaa", u64::MAX >> 8), None);
}

#[test]
fn test_lookup_respects_sequence() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &Options::default(), 10);
    let table = open_table(&path, size);

    // key00005 was written at sequence 6
    assert_eq!(lookup(&table, "key00005", 5), None);
    assert!(lookup(&table, "key00005", 6).is_some());
}

#[test]
fn test_versions_and_tombstones() {
    let (_temp, path) = setup_temp_table();
    let mut builder = TableBuilder::new(&Options::default(), icmp(), File::create(&path).unwrap());
    builder.add(&make_internal_key(b"k", 9, ValueType::Deletion), b"").unwrap();
    builder.add(&make_internal_key(b"k", 4, ValueType::Value), b"old").unwrap();
    builder.add(&make_internal_key(b"z", 2, ValueType::Value), b"zz").unwrap();
    let size = builder.finish().unwrap();

    let table = open_table(&path, size);
    assert_eq!(lookup(&table, "k", 100), Some((ValueType::Deletion, Vec::new())));
    assert_eq!(lookup(&table, "k", 8), Some((ValueType::Value, b"old".to_vec())));
    assert_eq!(lookup(&table, "z", 100), Some((ValueType::Value, b"zz".to_vec())));
}

#[test]
fn test_filter_is_written_when_enabled() {
    let (_temp, with_path) = setup_temp_table();
    let without_path = with_path.with_file_name("000002.ldb");

    let size = build_numbered(&with_path, &Options::default(), 50);
    assert!(open_table(&with_path, size).has_filter());

    let options = Options::builder().bloom_bits_per_key(0).build();
    let size = build_numbered(&without_path, &options, 50);
    let table = open_table(&without_path, size);
    assert!(!table.has_filter());
    assert!(lookup(&table, "key00010", 100).is_some());
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_forward_and_backward() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &small_blocks(Compression::Lz4), 300);
    let table = open_table(&path, size);

    let mut iter = table.iter(true, false);
    iter.seek_to_first();
    let mut count = 0;
    let mut last: Option<Vec<u8>> = None;
    while iter.valid() {
        let key = iter.key().to_vec();
        if let Some(prev) = &last {
            assert!(prev < &key);
        }
        last = Some(key);
        count += 1;
        iter.next();
    }
    assert_eq!(count, 300);

    iter.seek_to_last();
    assert_eq!(extract_user_key(iter.key()), b"key00299");
    let mut backwards = 0;
    while iter.valid() {
        backwards += 1;
        iter.prev();
    }
    assert_eq!(backwards, 300);
    iter.status().unwrap();
}

#[test]
fn test_iterator_seek() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &small_blocks(Compression::None), 100);
    let table = open_table(&path, size);

    let mut iter = table.iter(false, true);
    iter.seek(LookupKey::new(b"key00042x", u64::MAX >> 8).internal_key());
    assert!(iter.valid());
    assert_eq!(extract_user_key(iter.key()), b"key00043");
    assert_eq!(iter.value(), b"value43");

    iter.seek(LookupKey::new(b"zzz", u64::MAX >> 8).internal_key());
    assert!(!iter.valid());
}

#[test]
fn test_lz4_tables_read_back_identically() {
    let (_temp, path) = setup_temp_table();
    let lz4_path = path.with_file_name("000002.ldb");

    let plain_size = build_numbered(&path, &small_blocks(Compression::None), 400);
    let lz4_size = build_numbered(&lz4_path, &small_blocks(Compression::Lz4), 400);

    let plain = open_table(&path, plain_size);
    let compressed = open_table(&lz4_path, lz4_size);
    let mut a = plain.iter(true, false);
    let mut b = compressed.iter(true, false);
    a.seek_to_first();
    b.seek_to_first();
    while a.valid() {
        assert!(b.valid());
        assert_eq!(a.key(), b.key());
        assert_eq!(a.value(), b.value());
        a.next();
        b.next();
    }
    assert!(!b.valid());
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_checksum_mismatch_detected_when_verifying() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &small_blocks(Compression::None), 100);

    // The first data block starts at offset 0
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(20)).unwrap();
    file.write_all(&[0xFF, 0xFE, 0xFD]).unwrap();
    drop(file);

    let table = open_table(&path, size);
    let lookup = LookupKey::new(b"key00000", u64::MAX >> 8);
    let err = table.internal_get(lookup.internal_key(), true, false).unwrap_err();
    assert!(err.is_corruption());

    // Iteration skips the damaged block and reports it through status()
    let mut iter = table.iter(true, false);
    iter.seek_to_first();
    let mut count = 0;
    while iter.valid() {
        count += 1;
        iter.next();
    }
    assert!(count < 100);
    assert!(iter.status().unwrap_err().is_corruption());
}

// =============================================================================
// Approximate Offset Tests
// =============================================================================

#[test]
fn test_approximate_offsets_are_monotonic() {
    let (_temp, path) = setup_temp_table();
    let size = build_numbered(&path, &small_blocks(Compression::None), 1000);
    let table = open_table(&path, size);

    let offset_of = |key: &str| table.approximate_offset_of(LookupKey::new(key.as_bytes(), u64::MAX >> 8).internal_key());

    assert_eq!(offset_of("a"), 0);
    let middle = offset_of("key00500");
    assert!(middle > 0);
    assert!(offset_of("key00900") > middle);
    let end = offset_of("zzz");
    assert!(end >= offset_of("key00999"));
    assert!(end < size);
}
