//! WAL Writer
//!
//! Handles appending records to a log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::entry::frame_record;
use super::WalEntry;

/// Appends framed records to a log file.
///
/// Two layers of buffering:
///   `BufWriter::flush()` → Rust buffer → OS page cache (done on every append)
///   `File::sync_data()`  → OS page cache → physical disk (done by `sync`)
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
}

impl WalWriter {
    /// Create a new, empty log file (truncating any existing file).
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset: 0,
        })
    }

    /// Append a batch entry.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let payload = entry.encode_payload()?;
        self.add_record(&payload)
    }

    /// Append an opaque payload. The record reaches the OS before returning.
    pub fn add_record(&mut self, payload: &[u8]) -> Result<()> {
        let record = frame_record(payload);
        self.writer.write_all(&record)?;
        self.writer.flush()?;
        self.offset += record.len() as u64;
        Ok(())
    }

    /// Force everything written so far to durable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Bytes written so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
