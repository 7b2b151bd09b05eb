//! Tests for WAL Writer
//!
//! These tests verify:
//! - Appending batch entries and raw records
//! - Offsets tracking the bytes written
//! - Sync
//! - Integration with reader

use std::path::PathBuf;

use stratakv::wal::{Operation, ReadOutcome, WalEntry, WalReader, WalWriter, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("000003.log");
    (temp_dir, wal_path)
}

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_create_makes_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let writer = WalWriter::create(&wal_path).unwrap();

    assert!(wal_path.exists());
    assert_eq!(writer.offset(), 0);
    assert_eq!(writer.path(), wal_path.as_path());
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
}

#[test]
fn test_write_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path).unwrap();
    let entry = WalEntry::new(1, vec![put("key1", "value1")]);
    writer.append(&entry).unwrap();

    let expected = entry.serialize().unwrap().len() as u64;
    assert_eq!(writer.offset(), expected);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), expected);
}

#[test]
fn test_batch_entry_is_one_record() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path).unwrap();
    let entry = WalEntry::new(
        7,
        vec![
            put("a", "1"),
            put("b", "2"),
            Operation::Delete { key: b"a".to_vec() },
        ],
    );
    writer.append(&entry).unwrap();
    drop(writer);

    let mut reader = WalReader::open(&wal_path).unwrap();
    let read = reader.next_entry().unwrap().unwrap();
    assert_eq!(read, entry);
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_offset_grows_with_each_record() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path).unwrap();
    let mut expected = 0u64;
    for i in 0..50u64 {
        let payload = format!("payload-{}", i).into_bytes();
        writer.add_record(&payload).unwrap();
        expected += (HEADER_SIZE + payload.len()) as u64;
        assert_eq!(writer.offset(), expected);
    }
}

#[test]
fn test_create_truncates_existing_file() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::create(&wal_path).unwrap();
        writer.append(&WalEntry::new(1, vec![put("old", "data")])).unwrap();
    }

    let writer = WalWriter::create(&wal_path).unwrap();
    assert_eq!(writer.offset(), 0);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.read_record().unwrap(), ReadOutcome::Eof);
}

// =============================================================================
// Sync Tests
// =============================================================================

#[test]
fn test_sync_after_writes() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path).unwrap();
    for i in 0..10u64 {
        writer.append(&WalEntry::new(i + 1, vec![put(&format!("k{}", i), "v")])).unwrap();
    }
    writer.sync().unwrap();

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 10);
}

#[test]
fn test_records_visible_without_sync() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path).unwrap();
    writer.append(&WalEntry::new(1, vec![put("k", "v")])).unwrap();

    // Every append reaches the OS; a reader sees it while the writer is open
    let mut reader = WalReader::open(&wal_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.sequence, 1);
}

// =============================================================================
// Integration Tests
// =============================================================================

#[test]
fn test_write_and_read_back_in_order() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path).unwrap();
    for i in 0..100u64 {
        let entry = WalEntry::new(
            i + 1,
            vec![put(&format!("key{}", i), &format!("val{}", i))],
        );
        writer.append(&entry).unwrap();
    }
    drop(writer);

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 100);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64 + 1);
        assert_eq!(entry.operations[0].key(), format!("key{}", i).as_bytes());
    }
}

#[test]
fn test_large_value() {
    let (_temp, wal_path) = setup_temp_wal();

    let value = vec![0xAB; 1024 * 1024];
    let mut writer = WalWriter::create(&wal_path).unwrap();
    writer
        .append(&WalEntry::new(
            1,
            vec![Operation::Put {
                key: b"big".to_vec(),
                value: value.clone(),
            }],
        ))
        .unwrap();
    drop(writer);

    let entry = WalReader::open(&wal_path).unwrap().next_entry().unwrap().unwrap();
    match &entry.operations[0] {
        Operation::Put { value: read, .. } => assert_eq!(read, &value),
        other => panic!("unexpected operation {:?}", other),
    }
}
