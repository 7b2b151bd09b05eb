//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append one record per write batch before the memory table is touched
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for replay ordering
//! - Crash recovery and replay
//!
//! The same record framing is used for manifest files, whose payloads are
//! version edits instead of WAL entries.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Payload (Len)   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Payload (Len)   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! CRC covers the length field and the payload.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{frame_record, Operation, WalEntry, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::{ReadOutcome, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
