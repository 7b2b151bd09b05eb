//! Iterator Tests
//!
//! Tests verify:
//! - Unpositioned and empty iterators
//! - Forward and backward scans match the latest state
//! - Seeks land on the first key at or after the target
//! - Direction changes return to the neighbouring entry
//! - Entries spread over memory tables and several table levels merge
//!   correctly, with deletions hiding older values
//! - A custom comparator orders every layer, across flushes and reopens

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use stratakv::{Comparator, DbIterator, Engine, Options, ReadOptions, StrataError, WriteBatch, WriteOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open(dir: &std::path::Path, write_buffer_size: usize) -> Engine {
    let options = Options::builder()
        .create_if_missing(true)
        .write_buffer_size(write_buffer_size)
        .block_size(512)
        .build();
    Engine::open(dir, options).unwrap()
}

fn entry(iter: &DbIterator) -> (String, String) {
    (
        String::from_utf8(iter.key().to_vec()).unwrap(),
        String::from_utf8(iter.value().to_vec()).unwrap(),
    )
}

fn forward(engine: &Engine) -> Vec<(String, String)> {
    let mut iter = engine.iter(&ReadOptions::default());
    iter.seek_to_first();
    let mut out = Vec::new();
    while iter.valid() {
        out.push(entry(&iter));
        iter.next();
    }
    iter.status().unwrap();
    out
}

fn backward(engine: &Engine) -> Vec<(String, String)> {
    let mut iter = engine.iter(&ReadOptions::default());
    iter.seek_to_last();
    let mut out = Vec::new();
    while iter.valid() {
        out.push(entry(&iter));
        iter.prev();
    }
    iter.status().unwrap();
    out.reverse();
    out
}

fn model_entries(model: &BTreeMap<String, String>) -> Vec<(String, String)> {
    model.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_iterator_starts_unpositioned() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);
    engine.put(b"a", b"1").unwrap();

    let iter = engine.iter(&ReadOptions::default());
    assert!(!iter.valid());
}

#[test]
fn test_empty_database() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);

    let mut iter = engine.iter(&ReadOptions::default());
    iter.seek_to_first();
    assert!(!iter.valid());
    iter.seek_to_last();
    assert!(!iter.valid());
    iter.seek(b"anything");
    assert!(!iter.valid());
    iter.status().unwrap();
}

#[test]
fn test_all_keys_deleted() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);
    for key in ["a", "b", "c"] {
        engine.put(key.as_bytes(), b"v").unwrap();
        engine.delete(key.as_bytes()).unwrap();
    }

    assert!(forward(&engine).is_empty());
    assert!(backward(&engine).is_empty());
}

#[test]
fn test_only_latest_version_is_returned() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);
    engine.put(b"k", b"1").unwrap();
    engine.put(b"k", b"2").unwrap();
    engine.put(b"k", b"3").unwrap();

    assert_eq!(forward(&engine), vec![("k".to_string(), "3".to_string())]);
}

// =============================================================================
// Seek Tests
// =============================================================================

#[test]
fn test_seek_positions() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);
    for key in ["apple", "banana", "cherry"] {
        engine.put(key.as_bytes(), key.to_uppercase().as_bytes()).unwrap();
    }

    let mut iter = engine.iter(&ReadOptions::default());
    iter.seek(b"banana");
    assert_eq!(iter.key(), b"banana");
    iter.seek(b"b");
    assert_eq!(iter.key(), b"banana");
    iter.seek(b"bananas");
    assert_eq!(iter.key(), b"cherry");
    iter.seek(b"");
    assert_eq!(iter.key(), b"apple");
    iter.seek(b"zzz");
    assert!(!iter.valid());
}

#[test]
fn test_seek_skips_deleted_key() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);
    let mut batch = WriteBatch::new();
    batch.put(b"a", b"1").put(b"b", b"2").put(b"c", b"3");
    engine.write(&WriteOptions::default(), batch).unwrap();
    engine.delete(b"b").unwrap();

    let mut iter = engine.iter(&ReadOptions::default());
    iter.seek(b"b");
    assert_eq!(entry(&iter), ("c".to_string(), "3".to_string()));
    iter.prev();
    assert_eq!(entry(&iter), ("a".to_string(), "1".to_string()));
}

// =============================================================================
// Direction Change Tests
// =============================================================================

#[test]
fn test_direction_changes() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 1 << 20);
    for i in 0..10 {
        engine.put(format!("k{}", i).as_bytes(), format!("v{}", i).as_bytes()).unwrap();
    }

    let mut iter = engine.iter(&ReadOptions::default());
    iter.seek(b"k5");
    iter.next();
    assert_eq!(iter.key(), b"k6");
    iter.prev();
    assert_eq!(iter.key(), b"k5");
    iter.prev();
    assert_eq!(iter.key(), b"k4");
    iter.next();
    assert_eq!(iter.key(), b"k5");
    iter.next();
    iter.next();
    assert_eq!(iter.key(), b"k7");

    iter.seek_to_last();
    assert_eq!(iter.key(), b"k9");
    iter.next();
    assert!(!iter.valid());

    iter.seek_to_first();
    iter.prev();
    assert!(!iter.valid());
}

// =============================================================================
// Multi-Layer Tests
// =============================================================================

#[test]
fn test_merge_across_memtable_and_tables() {
    let temp = TempDir::new().unwrap();
    let engine = open(temp.path(), 4 * 1024);
    let mut model = BTreeMap::new();

    // First wave ends up compacted into deeper levels
    for i in 0..400 {
        let key = format!("key{:04}", i);
        let value = format!("first{}", i);
        engine.put(key.as_bytes(), value.as_bytes()).unwrap();
        model.insert(key, value);
    }
    engine.compact_range(None, None).unwrap();

    // Second wave: overwrites and deletions, partly flushed to level 0
    for i in (0..400).step_by(3) {
        let key = format!("key{:04}", i);
        if i % 2 == 0 {
            engine.delete(key.as_bytes()).unwrap();
            model.remove(&key);
        } else {
            let value = format!("second{}", i);
            engine.put(key.as_bytes(), value.as_bytes()).unwrap();
            model.insert(key, value);
        }
    }

    // Third wave stays in the memory table
    for i in 400..420 {
        let key = format!("key{:04}", i);
        engine.put(key.as_bytes(), b"third").unwrap();
        model.insert(key, "third".to_string());
    }

    assert_eq!(forward(&engine), model_entries(&model));
    assert_eq!(backward(&engine), model_entries(&model));
}

#[test]
fn test_scan_after_reopen() {
    let temp = TempDir::new().unwrap();
    let mut model = BTreeMap::new();
    {
        let engine = open(temp.path(), 2 * 1024);
        for i in 0..250 {
            let key = format!("r{:03}", (i * 7) % 250);
            let value = format!("{}", i);
            engine.put(key.as_bytes(), value.as_bytes()).unwrap();
            model.insert(key, value);
        }
        engine.close().unwrap();
    }

    let engine = open(temp.path(), 2 * 1024);
    assert_eq!(forward(&engine), model_entries(&model));
}

// =============================================================================
// Custom Comparator Tests
// =============================================================================

struct ReverseComparator;

impl Comparator for ReverseComparator {
    fn name(&self) -> &str {
        "test.ReverseBytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }
}

fn open_reverse(dir: &std::path::Path) -> Engine {
    let options = Options::builder()
        .create_if_missing(true)
        .write_buffer_size(2 * 1024)
        .block_size(256)
        .comparator(Arc::new(ReverseComparator))
        .build();
    Engine::open(dir, options).unwrap()
}

#[test]
fn test_custom_comparator_orders_all_layers() {
    let temp = TempDir::new().unwrap();
    let mut model = BTreeMap::new();
    {
        let engine = open_reverse(temp.path());
        for i in 0..300 {
            let key = format!("key{:03}", (i * 37) % 300);
            let value = format!("v{}", i);
            engine.put(key.as_bytes(), value.as_bytes()).unwrap();
            model.insert(key, value);
        }
        engine.compact_range(None, None).unwrap();

        // A second wave stays in the memory table
        for i in (0..300).step_by(10) {
            let key = format!("key{:03}", i);
            engine.delete(key.as_bytes()).unwrap();
            model.remove(&key);
        }

        let mut expected = model_entries(&model);
        expected.reverse();
        assert_eq!(forward(&engine), expected);

        let mut iter = engine.iter(&ReadOptions::default());
        iter.seek(b"key150");
        assert_eq!(iter.key(), b"key149");
        engine.close().unwrap();
    }

    let engine = open_reverse(temp.path());
    let mut expected = model_entries(&model);
    expected.reverse();
    assert_eq!(forward(&engine), expected);
    assert_eq!(backward(&engine), expected);
    assert_eq!(engine.get(b"key001").unwrap(), Some(model["key001"].clone().into_bytes()));
    assert_eq!(engine.get(b"key010").unwrap(), None);
}

#[test]
fn test_reopen_with_other_comparator_is_rejected() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_reverse(temp.path());
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }

    let result = Engine::open(temp.path(), Options::builder().create_if_missing(true).build());
    assert!(matches!(result, Err(StrataError::InvalidArgument(_))));
}
