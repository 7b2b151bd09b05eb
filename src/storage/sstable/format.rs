//! Block handles, the footer, and raw block I/O.

use bytes::Bytes;

use crate::coding::{get_varint64, put_varint64, MAX_VARINT64_LEN};
use crate::config::Compression;
use crate::error::{Result, StrataError};
use crate::storage::RandomAccessFile;

/// `[compression type: u8][masked crc32: u32]` after every block
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Two padded handles plus the magic number
pub const FOOTER_SIZE: usize = 2 * BlockHandle::MAX_ENCODED_LEN + 8;

pub const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Checksums stored on disk are masked so that data containing
/// embedded checksums does not checksum to itself.
pub fn mask_crc(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

pub fn unmask_crc(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// CRC over block contents followed by the compression type byte
pub fn block_checksum(contents: &[u8], block_type: u8) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(contents);
    hasher.update(&[block_type]);
    mask_crc(hasher.finalize())
}

/// Location of a block inside a table file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    /// Size excluding the trailer
    pub size: u64,
}

impl BlockHandle {
    pub const MAX_ENCODED_LEN: usize = 2 * MAX_VARINT64_LEN;

    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(Self::MAX_ENCODED_LEN);
        self.encode_to(&mut dst);
        dst
    }

    /// Decode from the front of `src`, returning the bytes consumed.
    pub fn decode_from(src: &[u8]) -> Result<(Self, usize)> {
        let (offset, n1) =
            get_varint64(src).ok_or_else(|| StrataError::corruption("bad block handle"))?;
        let (size, n2) =
            get_varint64(&src[n1..]).ok_or_else(|| StrataError::corruption("bad block handle"))?;
        Ok((Self { offset, size }, n1 + n2))
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        Self::decode_from(src).map(|(handle, _)| handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub metaindex: BlockHandle,
    pub index: BlockHandle,
}

impl Footer {
    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(FOOTER_SIZE);
        self.metaindex.encode_to(&mut dst);
        self.index.encode_to(&mut dst);
        dst.resize(2 * BlockHandle::MAX_ENCODED_LEN, 0);
        dst.extend_from_slice(&TABLE_MAGIC.to_le_bytes());
        dst
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < FOOTER_SIZE {
            return Err(StrataError::corruption("table footer too short"));
        }
        let magic_pos = src.len() - 8;
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&src[magic_pos..]);
        if u64::from_le_bytes(magic) != TABLE_MAGIC {
            return Err(StrataError::corruption("not a sorted table (bad magic number)"));
        }
        let body = &src[src.len() - FOOTER_SIZE..];
        let (metaindex, n) = BlockHandle::decode_from(body)?;
        let (index, _) = BlockHandle::decode_from(&body[n..])?;
        Ok(Self { metaindex, index })
    }
}

/// Read one block, check its trailer and undo compression.
pub fn read_block(file: &RandomAccessFile, handle: &BlockHandle, verify_checksums: bool) -> Result<Bytes> {
    let size = handle.size as usize;
    let raw = file.read_at(handle.offset, size + BLOCK_TRAILER_SIZE)?;
    let (contents, trailer) = raw.split_at(size);
    let block_type = trailer[0];

    if verify_checksums {
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&trailer[1..5]);
        if u32::from_le_bytes(stored) != block_checksum(contents, block_type) {
            return Err(StrataError::corruption(format!(
                "block checksum mismatch in {} at offset {}",
                file.path().display(),
                handle.offset
            )));
        }
    }

    match Compression::from_u8(block_type) {
        Some(Compression::None) => {
            let mut raw = raw;
            raw.truncate(size);
            Ok(Bytes::from(raw))
        }
        Some(Compression::Lz4) => lz4::block::decompress(contents, None)
            .map(Bytes::from)
            .map_err(|e| StrataError::corruption(format!("corrupted compressed block contents: {}", e))),
        None => Err(StrataError::corruption(format!("bad block type {}", block_type))),
    }
}
