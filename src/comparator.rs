//! Key ordering
//!
//! A `Comparator` is the single source of truth for key order: the memory
//! table, block layout, table index and compaction all consult it. Its name is
//! persisted in the manifest so a database cannot be reopened under a
//! different order.

use std::cmp::Ordering;
use std::sync::Arc;

/// A total order over user keys, injected at open time.
pub trait Comparator: Send + Sync {
    /// Stable identifier recorded in the manifest.
    fn name(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Shorten `start` to any key in `[start, limit)`. Used to keep index
    /// blocks small; leaving `start` unchanged is always correct.
    fn find_shortest_separator(&self, _start: &mut Vec<u8>, _limit: &[u8]) {}

    /// Shorten `key` to any key `>= key`.
    fn find_short_successor(&self, _key: &mut Vec<u8>) {}
}

/// Lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl BytewiseComparator {
    pub fn shared() -> Arc<dyn Comparator> {
        Arc::new(BytewiseComparator)
    }
}

impl Comparator for BytewiseComparator {
    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let min_len = start.len().min(limit.len());
        let diff = start
            .iter()
            .zip(limit.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(min_len);

        if diff >= min_len {
            // One is a prefix of the other
            return;
        }

        let byte = start[diff];
        if byte < 0xff && byte + 1 < limit[diff] {
            start[diff] += 1;
            start.truncate(diff + 1);
            debug_assert!(self.compare(start, limit) == Ordering::Less);
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        if let Some(i) = key.iter().position(|&b| b != 0xff) {
            key[i] += 1;
            key.truncate(i + 1);
        }
        // All 0xff: leave as is
    }
}
