//! Compaction Tests
//!
//! Tests verify:
//! - Manual compaction empties level 0 and keeps data intact
//! - Tombstones and shadowed values are dropped at the bottom level
//! - Background compaction keeps level 0 bounded under heavy writes
//! - Introspection properties reflect the level layout
//! - Obsolete table files are removed
//! - A flush that keeps failing stops further writes

use std::path::Path;

use stratakv::{Engine, Options, Range, StrataError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const NUM_LEVELS: usize = 7;

fn open_small(dir: &Path) -> Engine {
    let options = Options::builder()
        .create_if_missing(true)
        .write_buffer_size(4 * 1024)
        .block_size(512)
        .max_file_size(16 * 1024)
        .build();
    Engine::open(dir, options).unwrap()
}

fn total_files(engine: &Engine) -> usize {
    (0..NUM_LEVELS).map(|level| engine.num_files_at_level(level)).sum()
}

fn table_files_on_disk(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "ldb")
        })
        .count()
}

fn fill(engine: &Engine, count: usize, value: &str) {
    for i in 0..count {
        engine.put(format!("key{:05}", i).as_bytes(), value.as_bytes()).unwrap();
    }
}

// =============================================================================
// Manual Compaction Tests
// =============================================================================

#[test]
fn test_compact_range_moves_data_out_of_level_zero() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    fill(&engine, 1000, "some value that takes space");

    engine.compact_range(None, None).unwrap();

    assert_eq!(engine.num_files_at_level(0), 0);
    assert!(total_files(&engine) > 0);
    for i in (0..1000).step_by(13) {
        assert_eq!(
            engine.get(format!("key{:05}", i).as_bytes()).unwrap(),
            Some(b"some value that takes space".to_vec())
        );
    }
}

#[test]
fn test_compact_range_on_empty_database() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());

    engine.compact_range(None, None).unwrap();
    assert_eq!(total_files(&engine), 0);
}

#[test]
fn test_compact_subrange() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    fill(&engine, 600, "v");

    engine.compact_range(Some(b"key00100"), Some(b"key00200")).unwrap();

    for i in (0..600).step_by(11) {
        assert!(engine.get(format!("key{:05}", i).as_bytes()).unwrap().is_some());
    }
}

#[test]
fn test_deleted_data_is_reclaimed() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    fill(&engine, 800, "to be deleted");
    engine.compact_range(None, None).unwrap();
    assert!(total_files(&engine) > 0);

    for i in 0..800 {
        engine.delete(format!("key{:05}", i).as_bytes()).unwrap();
    }
    engine.compact_range(None, None).unwrap();

    assert_eq!(total_files(&engine), 0);
    assert_eq!(engine.approximate_sizes(&[Range::new(b"", b"\xff")]), vec![0]);
    assert_eq!(engine.get(b"key00042").unwrap(), None);
}

#[test]
fn test_overwrites_collapse_to_latest() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    for round in 0..5 {
        fill(&engine, 300, &format!("round{}", round));
    }

    engine.compact_range(None, None).unwrap();

    for i in (0..300).step_by(17) {
        assert_eq!(
            engine.get(format!("key{:05}", i).as_bytes()).unwrap(),
            Some(b"round4".to_vec())
        );
    }
    let sizes = engine.approximate_sizes(&[Range::new(b"key", b"kez")]);
    // Five rounds of data would take noticeably more room than one
    assert!(sizes[0] < 300 * 5 * 20, "compacted size {}", sizes[0]);
}

// =============================================================================
// Background Compaction Tests
// =============================================================================

#[test]
fn test_level_zero_stays_bounded_under_load() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());

    for i in 0..6000 {
        engine
            .put(format!("load{:06}", (i * 7919) % 6000).as_bytes(), &[b'x'; 50])
            .unwrap();
    }

    assert!(engine.num_files_at_level(0) <= 12);
    for i in (0..6000).step_by(101) {
        assert!(engine.get(format!("load{:06}", i).as_bytes()).unwrap().is_some());
    }
}

#[test]
fn test_data_intact_after_compaction_and_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_small(temp.path());
        fill(&engine, 1500, "persisted");
        engine.compact_range(None, None).unwrap();
        engine.close().unwrap();
    }

    let engine = open_small(temp.path());
    assert_eq!(engine.num_files_at_level(0), 0);
    for i in (0..1500).step_by(29) {
        assert_eq!(
            engine.get(format!("key{:05}", i).as_bytes()).unwrap(),
            Some(b"persisted".to_vec())
        );
    }
}

// =============================================================================
// Property Tests
// =============================================================================

#[test]
fn test_num_files_property_matches_levels() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    fill(&engine, 1000, "property");
    engine.compact_range(None, None).unwrap();

    for level in 0..NUM_LEVELS {
        let property = engine
            .property(&format!("leveldb.num-files-at-level{}", level))
            .unwrap();
        assert_eq!(property, engine.num_files_at_level(level).to_string());
    }
    assert_eq!(engine.property("leveldb.num-files-at-level7"), None);
    assert_eq!(engine.property("leveldb.num-files-at-levelx"), None);
}

#[test]
fn test_stats_and_sstables_properties() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    fill(&engine, 500, "stats");
    engine.compact_range(None, None).unwrap();

    let stats = engine.property("leveldb.stats").unwrap();
    assert!(stats.contains("Level"));
    assert!(stats.lines().count() > 3);

    let sstables = engine.property("leveldb.sstables").unwrap();
    assert!(sstables.contains("level"));

    // A point read pulls a block into the cache
    assert!(engine.get(b"key00001").unwrap().is_some());

    let memory: usize = engine
        .property("leveldb.approximate-memory-usage")
        .unwrap()
        .parse()
        .unwrap();
    assert!(memory > 0);
}

#[test]
fn test_unknown_properties() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    assert_eq!(engine.property("nosuchprop"), None);
    assert_eq!(engine.property("leveldb.nosuchprop"), None);
}

// =============================================================================
// File Lifecycle Tests
// =============================================================================

#[test]
fn test_obsolete_tables_are_deleted() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    fill(&engine, 2000, "first pass");
    fill(&engine, 2000, "second pass");
    engine.compact_range(None, None).unwrap();
    let live = total_files(&engine);
    engine.close().unwrap();

    assert_eq!(table_files_on_disk(temp.path()), live);
}

// =============================================================================
// Background Failure Tests
// =============================================================================

/// Highest file number used in `dir`.
fn max_file_number(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| {
            let name = e.unwrap().file_name().to_string_lossy().to_string();
            let digits: String = name
                .trim_start_matches("MANIFEST-")
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        })
        .max()
        .unwrap_or(0)
}

#[test]
fn test_failing_flush_becomes_sticky_error() {
    let temp = TempDir::new().unwrap();
    let engine = open_small(temp.path());
    engine.put(b"before", b"ok").unwrap();

    // Directories squatting on the next table names make every flush fail
    let next = max_file_number(temp.path()) + 1;
    for number in next..next + 64 {
        std::fs::create_dir(temp.path().join(format!("{:06}.ldb", number))).unwrap();
    }

    let mut failure = None;
    for i in 0..20_000 {
        if let Err(e) = engine.put(format!("key{:06}", i).as_bytes(), &[b'x'; 64]) {
            failure = Some(e);
            break;
        }
    }
    assert!(matches!(failure, Some(StrataError::Background(_))), "{:?}", failure);

    // Later writes keep failing; reads still work
    assert!(matches!(engine.put(b"after", b"v"), Err(StrataError::Background(_))));
    assert!(matches!(engine.delete(b"before"), Err(StrataError::Background(_))));
    assert_eq!(engine.get(b"before").unwrap(), Some(b"ok".to_vec()));
    assert_eq!(total_files(&engine), 0);
}
