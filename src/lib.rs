//! # StrataKV
//!
//! An embedded, ordered key-value storage engine with:
//! - Write-Ahead Logging (WAL) for durability
//! - Atomic write batches sharing one sequence number
//! - Snapshots and bidirectional ordered iteration
//! - Leveled compaction on a background thread
//! - Repair from logs and tables when the manifest is lost
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │          (Single Writer / Multi Reader, snapshots)           │
//! └──────┬───────────────────────┬──────────────────────┬───────┘
//!        │ write                 │ read                 │ flush / compact
//!        ▼                       ▼                      ▼
//!   ┌─────────┐  apply   ┌─────────────┐        ┌──────────────┐
//!   │   WAL   │ ───────▶ │  MemTable   │ ─────▶ │  Background  │
//!   │(Append) │          │ (+ frozen)  │        │    worker    │
//!   └─────────┘          └──────┬──────┘        └──────┬───────┘
//!                               │                      │ VersionEdit
//!                               ▼                      ▼
//!                        ┌─────────────┐        ┌──────────────┐
//!                        │  Sorted     │ ◀───── │  VersionSet  │
//!                        │  tables L0-6│        │  (MANIFEST)  │
//!                        └─────────────┘        └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stratakv::{Engine, Options, WriteBatch, WriteOptions};
//!
//! let options = Options::builder().create_if_missing(true).build();
//! let db = Engine::open("/tmp/stratakv-demo", options)?;
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"box", b"c").delete(b"bar");
//! db.write(&WriteOptions::default(), batch)?;
//!
//! assert_eq!(db.get(b"box")?, Some(b"c".to_vec()));
//! db.close()?;
//! # Ok::<(), stratakv::StrataError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod coding;
pub mod comparator;
pub mod key;
pub mod batch;
pub mod filename;
pub mod snapshot;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod iterator;
pub mod version;
pub mod compaction;
pub mod engine;
pub mod repair;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StrataError};
pub use config::{Compression, Options, OptionsBuilder, ReadOptions, WriteOptions};
pub use comparator::{BytewiseComparator, Comparator};
pub use batch::{BatchHandler, WriteBatch};
pub use snapshot::Snapshot;
pub use storage::BlockCache;
pub use iterator::DbIterator;
pub use engine::{destroy_database, Engine, Range};
pub use repair::{repair_database, RepairStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
