//! Prefix-compressed blocks
//!
//! Keys share a prefix with their predecessor except at restart points,
//! which store the full key and are indexed by a trailing array of
//! `u32` offsets so a seek can binary-search them.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::{BufMut, Bytes};

use crate::coding::{decode_fixed32, get_varint32, put_varint32};
use crate::comparator::Comparator;
use crate::error::{Result, StrataError};
use crate::iterator::InternalIterator;

// =============================================================================
// Builder
// =============================================================================

pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    restart_interval: usize,
    /// Entries since the last restart
    counter: usize,
    last_key: Vec<u8>,
    finished: bool,
}

impl BlockBuilder {
    pub fn new(restart_interval: usize) -> Self {
        Self {
            buffer: Vec::new(),
            restarts: vec![0],
            restart_interval: restart_interval.max(1),
            counter: 0,
            last_key: Vec::new(),
            finished: false,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.finished = false;
    }

    /// Keys must arrive in strictly increasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);

        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key)
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
    }

    /// Append the restart array and return the finished block contents.
    pub fn finish(&mut self) -> &[u8] {
        if !self.finished {
            for &restart in &self.restarts {
                self.buffer.put_u32_le(restart);
            }
            self.buffer.put_u32_le(self.restarts.len() as u32);
            self.finished = true;
        }
        &self.buffer
    }

    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }
}

// =============================================================================
// Block
// =============================================================================

/// Decoded block contents. Cloning shares the underlying buffer.
#[derive(Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: usize,
}

impl Block {
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(StrataError::corruption("block too small"));
        }
        let num_restarts = decode_fixed32(&data[data.len() - 4..]) as usize;
        let max_restarts = (data.len() - 4) / 4;
        if num_restarts > max_restarts {
            return Err(StrataError::corruption("bad restart count in block"));
        }
        let restart_offset = data.len() - (1 + num_restarts) * 4;
        Ok(Self {
            data,
            restart_offset,
            num_restarts,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn iter(&self, cmp: Arc<dyn Comparator>) -> BlockIter {
        BlockIter {
            block: self.clone(),
            cmp,
            current: self.restart_offset,
            restart_index: self.num_restarts,
            key: Vec::new(),
            value: (0, 0),
            error: None,
        }
    }

    fn restart_point(&self, index: usize) -> usize {
        let pos = self.restart_offset + index * 4;
        decode_fixed32(&self.data[pos..pos + 4]) as usize
    }
}

/// Decode the entry header at `offset`: `(shared, non_shared, value_len, header_len)`.
fn decode_entry(data: &[u8], offset: usize, limit: usize) -> Option<(usize, usize, usize, usize)> {
    let src = data.get(offset..limit)?;
    let (shared, n1) = get_varint32(src)?;
    let (non_shared, n2) = get_varint32(&src[n1..])?;
    let (value_len, n3) = get_varint32(&src[n1 + n2..])?;
    let header = n1 + n2 + n3;
    if src.len() - header < non_shared as usize + value_len as usize {
        return None;
    }
    Some((shared as usize, non_shared as usize, value_len as usize, header))
}

// =============================================================================
// Iterator
// =============================================================================

/// Bidirectional cursor over one block
pub struct BlockIter {
    block: Block,
    cmp: Arc<dyn Comparator>,
    /// Offset of the current entry; `restart_offset` when invalid
    current: usize,
    /// Restart block containing `current`
    restart_index: usize,
    key: Vec<u8>,
    /// `(offset, len)` of the current value
    value: (usize, usize),
    error: Option<StrataError>,
}

impl BlockIter {
    fn next_entry_offset(&self) -> usize {
        self.value.0 + self.value.1
    }

    fn mark_invalid(&mut self) {
        self.current = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
    }

    fn corruption(&mut self) {
        self.mark_invalid();
        self.key.clear();
        if self.error.is_none() {
            self.error = Some(StrataError::corruption("bad entry in block"));
        }
    }

    fn seek_to_restart_point(&mut self, index: usize) {
        self.key.clear();
        self.restart_index = index;
        let offset = self.block.restart_point(index);
        self.value = (offset, 0);
    }

    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_entry_offset();
        let limit = self.block.restart_offset;
        if self.current >= limit {
            self.mark_invalid();
            return false;
        }

        let Some((shared, non_shared, value_len, header)) =
            decode_entry(&self.block.data, self.current, limit)
        else {
            self.corruption();
            return false;
        };
        if self.key.len() < shared {
            self.corruption();
            return false;
        }

        let key_start = self.current + header;
        self.key.truncate(shared);
        self.key
            .extend_from_slice(&self.block.data[key_start..key_start + non_shared]);
        self.value = (key_start + non_shared, value_len);

        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        true
    }
}

impl InternalIterator for BlockIter {
    fn valid(&self) -> bool {
        self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.mark_invalid();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.mark_invalid();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.next_entry_offset() < self.block.restart_offset {}
    }

    fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.mark_invalid();
            return;
        }

        // Last restart point whose key is < target
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let offset = self.block.restart_point(mid);
            let decoded = decode_entry(&self.block.data, offset, self.block.restart_offset);
            let Some((0, non_shared, _, header)) = decoded else {
                self.corruption();
                return;
            };
            let key_start = offset + header;
            let mid_key = &self.block.data[key_start..key_start + non_shared];
            if self.cmp.compare(mid_key, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.cmp.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        self.parse_next_key();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        let original = self.current;
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                self.mark_invalid();
                return;
            }
            self.restart_index -= 1;
        }
        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key() && self.next_entry_offset() < original {}
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        &self.block.data[self.value.0..self.value.0 + self.value.1]
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
