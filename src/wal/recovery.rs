//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::path::Path;

use tracing::warn;

use crate::error::Result;

use super::{ReadOutcome, WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries encountered (replay stops at the first)
    pub entries_corrupted: u64,

    /// Highest sequence number among recovered entries
    pub last_sequence: u64,

    /// Whether the log ended with a torn or damaged record
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries in order
    /// 2. Stop at the first torn or corrupted record
    /// 3. Return the valid prefix together with statistics
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = Self::replay(path, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok((entries, result))
    }

    /// Stream entries to `apply` without buffering them.
    pub fn replay<F>(path: &Path, mut apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let mut reader = WalReader::open(path)?;
        let mut result = RecoveryResult::default();

        loop {
            match reader.read_record()? {
                ReadOutcome::Record(payload) => match WalEntry::deserialize(&payload) {
                    Ok(entry) => {
                        result.entries_recovered += 1;
                        result.last_sequence = result.last_sequence.max(entry.sequence);
                        apply(entry)?;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "undecodable WAL entry");
                        result.entries_corrupted += 1;
                        result.was_truncated = true;
                        break;
                    }
                },
                ReadOutcome::Eof => break,
                ReadOutcome::Truncated => {
                    result.was_truncated = true;
                    break;
                }
                ReadOutcome::Corrupted { offset, reason } => {
                    warn!(path = %path.display(), offset, %reason, "corrupted WAL record");
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::replay(path, |_| Ok(()))
    }
}
