//! WAL Reader
//!
//! Reads framed records back, classifying how a log ends.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{Result, StrataError};

use super::{WalEntry, HEADER_SIZE};

/// Upper bound on a single record; anything larger is treated as garbage.
const MAX_RECORD_SIZE: usize = 1 << 30;

/// Result of reading one record.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete record whose checksum matched
    Record(Vec<u8>),
    /// Clean end of file
    Eof,
    /// The file ends inside a record (torn write)
    Truncated,
    /// A complete record failed its checksum
    Corrupted { offset: u64, reason: String },
}

/// Reads records from a log file
pub struct WalReader {
    reader: BufReader<File>,
    offset: u64,
    done: bool,
}

impl WalReader {
    /// Open a log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
            done: false,
        })
    }

    /// Offset of the next unread record
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record. After anything other than `Record`, every later
    /// call returns `Eof`: without a trustworthy length the reader cannot
    /// resynchronise.
    pub fn read_record(&mut self) -> Result<ReadOutcome> {
        if self.done {
            return Ok(ReadOutcome::Eof);
        }

        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(self.finish(ReadOutcome::Eof)),
            n if n < HEADER_SIZE => return Ok(self.finish(ReadOutcome::Truncated)),
            _ => {}
        }

        let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let len_bytes = [header[4], header[5], header[6], header[7]];
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_RECORD_SIZE {
            let offset = self.offset;
            return Ok(self.finish(ReadOutcome::Corrupted {
                offset,
                reason: format!("record length {} exceeds limit", len),
            }));
        }

        let mut payload = vec![0u8; len];
        if read_full(&mut self.reader, &mut payload)? < len {
            return Ok(self.finish(ReadOutcome::Truncated));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_bytes);
        hasher.update(&payload);
        if hasher.finalize() != stored_crc {
            let offset = self.offset;
            return Ok(self.finish(ReadOutcome::Corrupted {
                offset,
                reason: "checksum mismatch".to_string(),
            }));
        }

        self.offset += (HEADER_SIZE + len) as u64;
        Ok(ReadOutcome::Record(payload))
    }

    /// Read the next entry, failing on any damage.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_record()? {
            ReadOutcome::Record(payload) => WalEntry::deserialize(&payload).map(Some),
            ReadOutcome::Eof => Ok(None),
            ReadOutcome::Truncated => Err(StrataError::corruption(format!(
                "log truncated at offset {}",
                self.offset
            ))),
            ReadOutcome::Corrupted { offset, reason } => Err(StrataError::corruption(format!(
                "log record at offset {}: {}",
                offset, reason
            ))),
        }
    }

    /// Iterate over all entries until the end or the first damaged record
    pub fn entries(self) -> WalIterator {
        WalIterator { reader: self }
    }

    fn finish(&mut self, outcome: ReadOutcome) -> ReadOutcome {
        self.done = true;
        outcome
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_entry().transpose()
    }
}

/// Fill `buf` as far as the file allows, returning the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
