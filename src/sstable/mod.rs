//! # Sorted String Table (SST) Module
//!
//! Immutable, block-structured, on-disk tables of key-ordered records.
//!
//! ## On-disk layout
//!
//! ```text
//! {block}*                      # each block zero-padded to BlockSize
//! block_count : u64 big-endian
//! { start_len : u8, start_bytes,
//!   end_len   : u8, end_bytes,
//!   used_bytes: i64 big-endian,
//!   offset    : i64 big-endian } × block_count
//! meta_start_offset : i64 big-endian   # last 8 bytes of the file
//! ```
//!
//! Records inside a block are `[key_len:1][key][value_len:1][value]`.
//! Keys are never empty, so a zero length byte can only be block padding;
//! a zero *value* length is a tombstone.
//!
//! ## Invariants
//!
//! - Within an SST, block start keys strictly increase and block ranges
//!   never overlap: the last key of block *i* orders before the first key
//!   of block *i+1*.
//! - A key appears at most once per SST.
//! - Files are immutable after the trailer is written; readers share the
//!   descriptors freely and open their own handles.
//!
//! ## Sub-modules
//!
//! - [`flush`] — the level-flush writer that builds SST files.
//! - [`iterator`] — bounded and unbounded cursors over a single file.
//! - [`cached`] — a level-wide cursor that fetches blocks through the
//!   shared block cache.
//! - [`manager`] — per-level SST sets, point lookup, iterator
//!   composition, and the flush/compaction pipeline.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub(crate) mod cached;
pub(crate) mod flush;
pub mod iterator;
pub mod manager;

pub use iterator::{SstIterator, SstUnboundedIterator};
pub use manager::SstManager;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use tracing::error;

use crate::bloom::BloomFilter;
use crate::cache::Shardable;
use crate::comparator::compare;
use crate::error::StoreError;
use crate::iterator::{Pair, PairIterator};

/// Bytes of record framing: one length byte for the key, one for the
/// value.
pub(crate) const RECORD_OVERHEAD: i64 = 2;

/// On-disk size of a record.
pub(crate) fn record_length(pair: &Pair) -> i64 {
    pair.key.len() as i64 + pair.value.len() as i64 + RECORD_OVERHEAD
}

// ------------------------------------------------------------------------------------------------
// Block descriptors
// ------------------------------------------------------------------------------------------------

/// Descriptor of one fixed-size block within an SST.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    /// First key stored in the block (inclusive).
    pub(crate) start: Vec<u8>,
    /// Last key stored in the block (inclusive).
    pub(crate) end: Vec<u8>,
    /// Bytes of real records; the rest of the block is zero padding.
    pub(crate) used_bytes: i64,
    /// Byte offset of the block within the file.
    pub(crate) offset: i64,
}

/// Cache key of a decoded block: the owning file plus the block offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BlockKey {
    file: Arc<str>,
    offset: i64,
}

impl Shardable for BlockKey {
    fn shard(&self, shard_count: usize) -> usize {
        self.offset as usize % shard_count
    }
}

// ------------------------------------------------------------------------------------------------
// Record decoding
// ------------------------------------------------------------------------------------------------

/// Decodes the record at `pos`, returning the pair and the position just
/// past it. Returns `None` at the end of the buffer or on padding (zero
/// key length).
pub(crate) fn decode_record(buf: &[u8], pos: usize) -> Option<(Pair, usize)> {
    let key_len = *buf.get(pos)? as usize;
    if key_len == 0 {
        return None;
    }
    let key_end = pos + 1 + key_len;
    let key = buf.get(pos + 1..key_end)?;
    let value_len = *buf.get(key_end)? as usize;
    let value_end = key_end + 1 + value_len;
    let value = buf.get(key_end + 1..value_end)?;
    Some((Pair::new(key.to_vec(), value.to_vec()), value_end))
}

// ------------------------------------------------------------------------------------------------
// I/O helpers
// ------------------------------------------------------------------------------------------------

fn read_u8(file: &mut File) -> Result<u8, StoreError> {
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_i64(file: &mut File) -> Result<i64, StoreError> {
    let mut bytes = [0u8; 8];
    file.read_exact(&mut bytes)?;
    Ok(i64::from_be_bytes(bytes))
}

// ------------------------------------------------------------------------------------------------
// Sst
// ------------------------------------------------------------------------------------------------

/// An opened SST: the file path, its ordered block descriptors, and the
/// offset where the block index begins.
pub struct Sst {
    pub(crate) file: Arc<str>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) meta_offset: i64,
}

impl Sst {
    /// Opens an SST file, reading the trailer and block index.
    pub fn open(path: &str) -> Result<Sst, StoreError> {
        let mut file = File::open(path).map_err(|e| {
            error!(path, %e, "failed to open SST file");
            StoreError::from(e)
        })?;

        file.seek(SeekFrom::End(-8))?;
        let meta_offset = read_i64(&mut file)?;

        file.seek(SeekFrom::Start(meta_offset as u64))?;
        let block_count = read_i64(&mut file)?;
        let mut blocks = Vec::with_capacity(block_count.max(0) as usize);
        for _ in 0..block_count {
            let start_len = read_u8(&mut file)?;
            let mut start = vec![0u8; start_len as usize];
            file.read_exact(&mut start)?;
            let end_len = read_u8(&mut file)?;
            let mut end = vec![0u8; end_len as usize];
            file.read_exact(&mut end)?;
            let used_bytes = read_i64(&mut file)?;
            let offset = read_i64(&mut file)?;
            blocks.push(Block {
                start,
                end,
                used_bytes,
                offset,
            });
        }

        Ok(Sst {
            file: Arc::from(path),
            blocks,
            meta_offset,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &str {
        &self.file
    }

    /// Finds the block whose key range contains `key`, if any.
    pub(crate) fn get_block(&self, key: &[u8]) -> Option<&Block> {
        self.blocks.iter().find(|block| {
            compare(key, &block.start) != Ordering::Less
                && compare(key, &block.end) != Ordering::Greater
        })
    }

    /// Reads exactly the used bytes of `block` from disk. A shorter read
    /// is reported as [`StoreError::BlockUnderflow`].
    pub(crate) fn read_block(&self, block: &Block) -> Result<Bytes, StoreError> {
        let mut file = File::open(self.path())?;
        file.seek(SeekFrom::Start(block.offset as u64)).map_err(|e| {
            error!(path = %self.file, block_offset = block.offset, %e, "failed to seek to block");
            StoreError::from(e)
        })?;

        let mut buf = vec![0u8; block.used_bytes.max(0) as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < buf.len() {
            error!(
                path = %self.file,
                block_offset = block.offset,
                block_used_bytes = block.used_bytes,
                bytes_read = filled,
                "failed to read block"
            );
            return Err(StoreError::BlockUnderflow {
                expected: block.used_bytes,
                actual: filled as i64,
            });
        }

        Ok(Bytes::from(buf))
    }

    /// Cache key for one of this SST's blocks.
    pub(crate) fn block_key(&self, block: &Block) -> BlockKey {
        BlockKey {
            file: Arc::clone(&self.file),
            offset: block.offset,
        }
    }

    /// Builds a bloom filter over every key in this SST.
    pub(crate) fn populate_bloom_filter(&self, bits: u32) -> Result<BloomFilter, StoreError> {
        let mut filter = BloomFilter::new(bits);
        let mut iter = self.unbounded_iterator()?;
        while iter.next()? {
            if let Some(pair) = iter.get()? {
                filter.insert(&pair.key);
            }
        }
        iter.close()?;
        Ok(filter)
    }
}
