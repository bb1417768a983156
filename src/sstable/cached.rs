//! Level-wide cursor that fetches blocks through the shared block cache.
//!
//! Steps through a level's SSTs in order and, within each SST, through its
//! blocks in order; every block is obtained via the level's cache with the
//! SST's own `read_block` as the miss provider. The bounded form skips
//! SSTs and blocks whose key range falls outside `[start, end]`, seeks to
//! the first record at or past `start` in its starting block, and stops
//! once a key passes `end` or the level runs out.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use crate::cache::ShardedLruCache;
use crate::comparator::compare;
use crate::error::StoreError;
use crate::iterator::{Pair, PairIterator};
use crate::sstable::{decode_record, BlockKey, Sst};

/// A cursor over one level, reading through the level's block cache.
pub(crate) struct CachedLevelIterator {
    end: Option<Vec<u8>>,
    cache: Arc<ShardedLruCache<BlockKey>>,
    ssts: Vec<Arc<Sst>>,
    sst_index: usize,
    block_index: usize,
    buf: Bytes,
    pos: usize,
    pending_first: Option<Pair>,
    current: Option<Pair>,
    closed: bool,
}

impl CachedLevelIterator {
    /// Opens a cursor over the level's full key range.
    pub(crate) fn unbounded(
        cache: Arc<ShardedLruCache<BlockKey>>,
        ssts: Vec<Arc<Sst>>,
    ) -> Result<Self, StoreError> {
        let mut iter = Self {
            end: None,
            cache,
            ssts,
            sst_index: 0,
            block_index: 0,
            buf: Bytes::new(),
            pos: 0,
            pending_first: None,
            current: None,
            closed: false,
        };
        if iter.ssts.is_empty() || iter.ssts[0].blocks.is_empty() {
            iter.closed = true;
        } else {
            iter.load_block()?;
        }
        Ok(iter)
    }

    /// Opens a cursor over `[start, end]`, both bounds inclusive.
    pub(crate) fn bounded(
        start: &[u8],
        end: &[u8],
        cache: Arc<ShardedLruCache<BlockKey>>,
        ssts: Vec<Arc<Sst>>,
    ) -> Result<Self, StoreError> {
        let mut iter = Self {
            end: Some(end.to_vec()),
            cache,
            ssts,
            sst_index: 0,
            block_index: 0,
            buf: Bytes::new(),
            pos: 0,
            pending_first: None,
            current: None,
            closed: false,
        };

        // Locate the first block whose range intersects [start, end]:
        // blocks wholly before `start` are skipped, and a block starting
        // past `end` means the level holds nothing in range.
        let mut found = false;
        'scan: for (sst_index, sst) in iter.ssts.iter().enumerate() {
            for (block_index, block) in sst.blocks.iter().enumerate() {
                if compare(&block.start, end) == Ordering::Greater {
                    break 'scan;
                }
                if compare(&block.end, start) == Ordering::Less {
                    continue;
                }
                iter.sst_index = sst_index;
                iter.block_index = block_index;
                found = true;
                break 'scan;
            }
        }
        if !found {
            iter.closed = true;
            return Ok(iter);
        }

        // Position on the first record at or past `start`.
        iter.load_block()?;
        loop {
            match decode_record(&iter.buf, iter.pos) {
                None => {
                    // All keys in this block order before `start`.
                    iter.closed = true;
                    return Ok(iter);
                }
                Some((pair, next_pos)) => {
                    iter.pos = next_pos;
                    if compare(&pair.key, start) != Ordering::Less {
                        iter.pending_first = Some(pair);
                        return Ok(iter);
                    }
                }
            }
        }
    }

    /// Fetches the block at the current SST/block indexes through the
    /// cache.
    fn load_block(&mut self) -> Result<(), StoreError> {
        let sst = Arc::clone(&self.ssts[self.sst_index]);
        let block = sst.blocks[self.block_index].clone();
        let key = sst.block_key(&block);
        self.buf = self
            .cache
            .get(key, move |_| sst.read_block(&block))?;
        self.pos = 0;
        Ok(())
    }

    /// Moves to the next block, crossing into the next SST when the
    /// current one is exhausted. Returns `false` when the level is done.
    fn advance_block(&mut self) -> Result<bool, StoreError> {
        loop {
            if self.block_index + 1 < self.ssts[self.sst_index].blocks.len() {
                self.block_index += 1;
            } else if self.sst_index + 1 < self.ssts.len() {
                self.sst_index += 1;
                self.block_index = 0;
                if self.ssts[self.sst_index].blocks.is_empty() {
                    continue;
                }
            } else {
                return Ok(false);
            }
            self.load_block()?;
            return Ok(true);
        }
    }
}

impl PairIterator for CachedLevelIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }

        let pair = match self.pending_first.take() {
            Some(pair) => pair,
            None => loop {
                match decode_record(&self.buf, self.pos) {
                    Some((pair, next_pos)) => {
                        self.pos = next_pos;
                        break pair;
                    }
                    None => {
                        if !self.advance_block()? {
                            self.closed = true;
                            self.current = None;
                            return Ok(false);
                        }
                    }
                }
            },
        };

        if let Some(end) = &self.end {
            if compare(&pair.key, end) == Ordering::Greater {
                self.closed = true;
                self.current = None;
                return Ok(false);
            }
        }
        self.current = Some(pair);
        Ok(true)
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.current.clone())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}
