//! Repair Tests
//!
//! Tests verify:
//! - A database whose manifest is gone can be rebuilt and reopened
//! - Logs are converted into tables and their writes survive
//! - Damaged tables are archived under `lost/` (or fail a paranoid repair)
//! - Repair reports what it did

use std::fs;
use std::path::Path;

use stratakv::{repair_database, Engine, Options, StrataError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn small_options() -> Options {
    Options::builder()
        .create_if_missing(true)
        .write_buffer_size(4 * 1024)
        .block_size(512)
        .build()
}

/// Remove CURRENT and every MANIFEST so only logs and tables remain.
fn remove_manifest(dir: &Path) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if name == "CURRENT" || name.starts_with("MANIFEST") {
            fs::remove_file(&path).unwrap();
        }
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    files
}

fn corrupt_file(path: &Path, offset: usize) {
    let mut bytes = fs::read(path).unwrap();
    for byte in bytes.iter_mut().skip(offset).take(16) {
        *byte ^= 0xff;
    }
    fs::write(path, bytes).unwrap();
}

// =============================================================================
// Manifest Loss Tests
// =============================================================================

#[test]
fn test_repair_missing_directory() {
    let temp = TempDir::new().unwrap();
    let result = repair_database(temp.path().join("nope"), &Options::default());
    assert!(matches!(result, Err(StrataError::NotFound(_))));
}

#[test]
fn test_open_without_manifest_needs_repair() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(temp.path(), small_options()).unwrap();
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }
    remove_manifest(temp.path());

    let options = Options::builder().create_if_missing(false).build();
    assert!(matches!(
        Engine::open(temp.path(), options.clone()),
        Err(StrataError::NotFound(_))
    ));

    repair_database(temp.path(), &options).unwrap();
    let engine = Engine::open(temp.path(), options).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_repair_recovers_tables_and_logs() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(temp.path(), small_options()).unwrap();
        for i in 0..1000 {
            engine.put(format!("key{:04}", i).as_bytes(), format!("value{}", i).as_bytes()).unwrap();
        }
        engine.close().unwrap();
    }
    assert!(!files_with_extension(temp.path(), "ldb").is_empty());
    remove_manifest(temp.path());

    let stats = repair_database(temp.path(), &small_options()).unwrap();
    assert!(stats.logs_converted >= 1);
    assert!(stats.tables_recovered >= 1);
    assert_eq!(stats.tables_dropped, 0);
    assert_eq!(stats.last_sequence, 1000);

    let engine = Engine::open(temp.path(), small_options()).unwrap();
    assert_eq!(engine.last_sequence(), 1000);
    for i in (0..1000).step_by(37) {
        assert_eq!(
            engine.get(format!("key{:04}", i).as_bytes()).unwrap(),
            Some(format!("value{}", i).into_bytes())
        );
    }
}

#[test]
fn test_repair_keeps_newest_version() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(temp.path(), small_options()).unwrap();
        for round in 0..3 {
            for i in 0..200 {
                engine
                    .put(format!("key{:03}", i).as_bytes(), format!("round{}", round).as_bytes())
                    .unwrap();
            }
        }
        engine.delete(b"key007").unwrap();
        engine.close().unwrap();
    }
    remove_manifest(temp.path());

    repair_database(temp.path(), &small_options()).unwrap();

    let engine = Engine::open(temp.path(), small_options()).unwrap();
    assert_eq!(engine.get(b"key000").unwrap(), Some(b"round2".to_vec()));
    assert_eq!(engine.get(b"key199").unwrap(), Some(b"round2".to_vec()));
    assert_eq!(engine.get(b"key007").unwrap(), None);
}

#[test]
fn test_repair_archives_old_logs_and_manifests() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(temp.path(), small_options()).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.close().unwrap();
    }

    // Repairing a healthy database is allowed and loses nothing
    let stats = repair_database(temp.path(), &small_options()).unwrap();
    assert!(stats.logs_converted >= 1);

    let lost = temp.path().join("lost");
    assert!(lost.is_dir());
    assert!(fs::read_dir(&lost).unwrap().count() >= 2);
    assert!(files_with_extension(temp.path(), "log").is_empty());

    let engine = Engine::open(temp.path(), small_options()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_repair_empty_directory() {
    let temp = TempDir::new().unwrap();

    let stats = repair_database(temp.path(), &small_options()).unwrap();
    assert_eq!(stats, Default::default());

    let engine = Engine::open(temp.path(), small_options()).unwrap();
    assert_eq!(engine.get(b"anything").unwrap(), None);
}

// =============================================================================
// Damaged Table Tests
// =============================================================================

fn build_compacted_db(dir: &Path) -> usize {
    let engine = Engine::open(dir, small_options()).unwrap();
    for i in 0..600 {
        engine.put(format!("key{:04}", i).as_bytes(), b"payload").unwrap();
    }
    engine.compact_range(None, None).unwrap();
    engine.close().unwrap();
    files_with_extension(dir, "ldb").len()
}

#[test]
fn test_damaged_table_is_dropped() {
    let temp = TempDir::new().unwrap();
    let tables = build_compacted_db(temp.path());
    assert!(tables >= 1);

    let victim = files_with_extension(temp.path(), "ldb")[0].clone();
    corrupt_file(&victim, 20);
    remove_manifest(temp.path());

    let stats = repair_database(temp.path(), &small_options()).unwrap();
    assert_eq!(stats.tables_dropped, 1);
    assert!(!victim.exists());
    assert!(temp.path().join("lost").join(victim.file_name().unwrap()).exists());

    // Whatever survived opens cleanly
    let engine = Engine::open(temp.path(), small_options()).unwrap();
    let mut iter = engine.iter(&Default::default());
    iter.seek_to_first();
    while iter.valid() {
        iter.next();
    }
    iter.status().unwrap();
}

#[test]
fn test_paranoid_repair_fails_on_damaged_table() {
    let temp = TempDir::new().unwrap();
    build_compacted_db(temp.path());

    let victim = files_with_extension(temp.path(), "ldb")[0].clone();
    corrupt_file(&victim, 20);
    remove_manifest(temp.path());

    let options = Options::builder().paranoid_checks(true).build();
    let err = repair_database(temp.path(), &options).unwrap_err();
    assert!(err.is_corruption());
    assert!(victim.exists());
}

#[test]
fn test_failed_paranoid_repair_leaves_directory_untouched() {
    let temp = TempDir::new().unwrap();
    build_compacted_db(temp.path());
    {
        let engine = Engine::open(temp.path(), small_options()).unwrap();
        engine.put(b"tail", b"only-in-log").unwrap();
        engine.close().unwrap();
    }
    fs::write(temp.path().join("000900.ldb"), vec![0xab; 4096]).unwrap();
    let logs_before = files_with_extension(temp.path(), "log");
    let tables_before = files_with_extension(temp.path(), "ldb");

    let options = Options::builder().paranoid_checks(true).build();
    let err = repair_database(temp.path(), &options).unwrap_err();
    assert!(err.is_corruption());

    assert_eq!(files_with_extension(temp.path(), "log"), logs_before);
    assert_eq!(files_with_extension(temp.path(), "ldb"), tables_before);
    assert!(!temp.path().join("lost").exists());

    // The old manifest and log still describe the database
    let engine = Engine::open(temp.path(), small_options()).unwrap();
    assert_eq!(engine.get(b"tail").unwrap(), Some(b"only-in-log".to_vec()));
    assert_eq!(engine.get(b"key0042").unwrap(), Some(b"payload".to_vec()));
}

#[test]
fn test_repair_writes_new_manifest_before_archiving() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(temp.path(), small_options()).unwrap();
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }
    let current_before = fs::read_to_string(temp.path().join("CURRENT")).unwrap();

    repair_database(temp.path(), &small_options()).unwrap();

    // The new manifest gets a fresh number, so the old one is archived intact
    let current_after = fs::read_to_string(temp.path().join("CURRENT")).unwrap();
    assert_ne!(current_before.trim(), current_after.trim());
    assert!(temp.path().join(current_after.trim()).exists());
    assert!(temp.path().join("lost").join(current_before.trim()).exists());
}
