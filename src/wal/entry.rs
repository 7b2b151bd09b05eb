//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and the record framing.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 8;

/// A single entry in the WAL: one committed write batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Sequence number shared by every operation of the batch
    pub sequence: u64,

    /// The operations, in batch order
    pub operations: Vec<Operation>,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

impl WalEntry {
    pub fn new(sequence: u64, operations: Vec<Operation>) -> Self {
        Self {
            sequence,
            operations,
        }
    }

    /// Encode the entry as a complete framed record.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(frame_record(&self.encode_payload()?))
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a record payload (framing already stripped and verified).
    pub fn deserialize(payload: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(payload)?)
    }
}

/// Frame a payload: `[crc32(len ++ payload)][len][payload]`.
pub fn frame_record(payload: &[u8]) -> Vec<u8> {
    let len_bytes = (payload.len() as u32).to_le_bytes();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len_bytes);
    hasher.update(payload);
    let crc = hasher.finalize();

    let mut record = Vec::with_capacity(HEADER_SIZE + payload.len());
    record.extend_from_slice(&crc.to_le_bytes());
    record.extend_from_slice(&len_bytes);
    record.extend_from_slice(payload);
    record
}
