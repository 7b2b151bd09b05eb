//! Version Module
//!
//! Tracks which tables make up the database.
//!
//! ## Responsibilities
//! - `Version`: immutable per-level file lists, point lookups across tables
//! - `VersionEdit`: the delta persisted for every flush or compaction
//! - `VersionSet`: the manifest, file-number allocation, the sequence
//!   watermark and the set of files still referenced by live versions
//!
//! ## Levels
//! ```text
//! L0   overlapping tables, straight from memory-table flushes
//! L1   disjoint, ~10 MiB
//! L2   disjoint, ~100 MiB
//! ...
//! L6   disjoint, ~1 TiB
//! ```

mod edit;
mod set;
#[allow(clippy::module_inception)]
mod version;

use std::sync::Arc;

pub use edit::{FileMetaData, VersionEdit};
pub use set::VersionSet;
pub(crate) use set::write_fresh_manifest;
pub use version::Version;
pub(crate) use version::{concatenating_iterator, file_user_largest, file_user_smallest};

pub const NUM_LEVELS: usize = 7;

/// Level-0 file count that triggers a compaction
pub const L0_COMPACTION_TRIGGER: usize = 4;

/// Level-0 file count at which each write is delayed by 1 ms
pub const L0_SLOWDOWN_WRITES_TRIGGER: usize = 8;

/// Level-0 file count at which writes wait for compaction
pub const L0_STOP_WRITES_TRIGGER: usize = 12;

/// Deepest level a flushed memory table may be placed in directly
pub const MAX_MEM_COMPACT_LEVEL: usize = 2;

/// Size target of a level (levels 0 and 1 share 10 MiB).
pub fn max_bytes_for_level(level: usize) -> f64 {
    let mut result = 10.0 * 1024.0 * 1024.0;
    for _ in 1..level {
        result *= 10.0;
    }
    result
}

/// Stop building a compaction output once it overlaps this much of the
/// grandparent level.
pub fn max_grandparent_overlap_bytes(max_file_size: usize) -> u64 {
    10 * max_file_size as u64
}

/// Upper bound on input bytes when a compaction grows its level-N inputs.
pub fn expanded_compaction_byte_size_limit(max_file_size: usize) -> u64 {
    25 * max_file_size as u64
}

pub fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().map(|f| f.file_size).sum()
}
