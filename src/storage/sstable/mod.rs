//! Sorted table (SSTable) Module
//!
//! Immutable on-disk sorted key-value storage, keyed by internal key.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Block 0 .. N                                       │
//! │   prefix-compressed entries + restart array             │
//! │   trailer: [type: u8][masked crc32: u32]                │
//! ├─────────────────────────────────────────────────────────┤
//! │ Filter Block (bloom over user keys, optional)           │
//! ├─────────────────────────────────────────────────────────┤
//! │ Metaindex Block   "filter.<name>" → handle              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block       separator key → data block handle     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (48 bytes)                                       │
//! │   metaindex handle | index handle | padding | magic u64 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Block entry:
//! ```text
//! [shared: varint32][non_shared: varint32][value_len: varint32]
//! [key delta: non_shared bytes][value: value_len bytes]
//! ```

mod block;
mod builder;
mod filter;
mod format;
mod reader;

pub use block::{Block, BlockBuilder, BlockIter};
pub use builder::TableBuilder;
pub use filter::{BloomFilterBuilder, bloom_may_contain};
pub use format::{BlockHandle, Footer, BLOCK_TRAILER_SIZE, FOOTER_SIZE, TABLE_MAGIC};
pub use reader::Table;

/// Metaindex key under which the bloom filter block is registered
pub(crate) const FILTER_META_KEY: &[u8] = b"filter.stratakv.BloomFilter";
