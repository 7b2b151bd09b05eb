//! Iterator Module
//!
//! Positional cursors over internal keys, shared by every layer of the read
//! path.
//!
//! ## Layers
//! ```text
//!   DbIterator            user keys, visibility by sequence ceiling
//!        │
//!   MergingIterator       k-way merge in internal-key order
//!     ├── MemTableIterator (active, immutable)
//!     ├── TwoLevelIterator per level-0 table
//!     └── TwoLevelIterator per level ≥ 1 (file list → table)
//! ```

mod db_iter;
mod merge;
mod two_level;

pub use db_iter::DbIterator;
pub use merge::MergingIterator;
pub use two_level::{BlockFunction, TwoLevelIterator};

use crate::error::{Result, StrataError};

/// Cursor over a sorted sequence of internal key/value pairs.
///
/// `key`/`value` may only be called while `valid()` is true. Implementations
/// report I/O or corruption problems through `status()` rather than panicking.
pub trait InternalIterator: Send {
    fn valid(&self) -> bool;
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    /// Position at the first entry with key ≥ target
    fn seek(&mut self, target: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn status(&self) -> Result<()>;
}

/// Iterator with no entries, optionally carrying an error.
pub struct EmptyIterator {
    error: Option<StrataError>,
}

impl EmptyIterator {
    pub fn with_error(error: StrataError) -> Self {
        Self { error: Some(error) }
    }
}

impl InternalIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }
    fn seek_to_first(&mut self) {}
    fn seek_to_last(&mut self) {}
    fn seek(&mut self, _target: &[u8]) {}
    fn next(&mut self) {}
    fn prev(&mut self) {}
    fn key(&self) -> &[u8] {
        &[]
    }
    fn value(&self) -> &[u8] {
        &[]
    }
    fn status(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
