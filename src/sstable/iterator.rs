//! Bounded and unbounded cursors over a single SST file.
//!
//! Both cursors own their file handle and release it in `close`. The
//! unbounded cursor reads one whole block at a time and decodes from the
//! in-memory buffer, honoring each block's used-byte count so padding is
//! never yielded. The bounded cursor reads record-by-record, hopping over
//! padding to the next block's offset, and stops at the block index.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::comparator::compare;
use crate::error::StoreError;
use crate::iterator::{Pair, PairIterator};
use crate::sstable::{decode_record, Block, Sst};

// ------------------------------------------------------------------------------------------------
// Shared block reading
// ------------------------------------------------------------------------------------------------

/// Reads exactly the used bytes of `block`, reporting a short read as
/// [`StoreError::BlockUnderflow`].
fn read_block_bytes(file: &mut File, block: &Block) -> Result<Vec<u8>, StoreError> {
    file.seek(SeekFrom::Start(block.offset as u64))?;
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
        return Err(StoreError::BlockUnderflow {
            expected: block.used_bytes,
            actual: filled as i64,
        });
    }
    Ok(buf)
}

// ------------------------------------------------------------------------------------------------
// Unbounded cursor
// ------------------------------------------------------------------------------------------------

/// A cursor over every record of an SST, block by block.
pub struct SstUnboundedIterator {
    file: Option<File>,
    blocks: Vec<Block>,
    block_index: usize,
    buf: Vec<u8>,
    pos: usize,
    current: Option<Pair>,
}

impl Sst {
    /// Opens a cursor over the whole file.
    pub fn unbounded_iterator(&self) -> Result<SstUnboundedIterator, StoreError> {
        let mut file = File::open(self.path())?;
        let buf = match self.blocks.first() {
            Some(block) => read_block_bytes(&mut file, block)?,
            None => Vec::new(),
        };
        Ok(SstUnboundedIterator {
            file: Some(file),
            blocks: self.blocks.clone(),
            block_index: 0,
            buf,
            pos: 0,
            current: None,
        })
    }
}

impl PairIterator for SstUnboundedIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        let Some(file) = self.file.as_mut() else {
            return Err(StoreError::IteratorClosed);
        };

        if self.pos >= self.buf.len() {
            if self.block_index + 1 >= self.blocks.len() {
                return Ok(false);
            }
            self.block_index += 1;
            self.buf = read_block_bytes(file, &self.blocks[self.block_index])?;
            self.pos = 0;
        }

        match decode_record(&self.buf, self.pos) {
            Some((pair, next_pos)) => {
                self.pos = next_pos;
                self.current = Some(pair);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        if self.file.is_none() {
            return Err(StoreError::IteratorClosed);
        }
        Ok(self.current.clone())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.file = None;
        self.current = None;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Bounded cursor
// ------------------------------------------------------------------------------------------------

/// A cursor over `[start, end]` (both inclusive) within one SST.
///
/// Construction seeks to the block containing `start` and positions on
/// the first record at or past it; that record is reported by the first
/// `next`.
pub struct SstIterator {
    reader: Option<BufReader<File>>,
    blocks: Vec<Block>,
    meta_offset: i64,
    end: Vec<u8>,
    /// Absolute position within the data region.
    pos: i64,
    pending_first: Option<Pair>,
    init: bool,
    done: bool,
    current: Option<Pair>,
}

impl Sst {
    /// Opens a cursor over `[start, end]`, both bounds inclusive.
    pub fn iterator(&self, start: &[u8], end: &[u8]) -> Result<SstIterator, StoreError> {
        let reader = BufReader::new(File::open(self.path())?);
        let mut iter = SstIterator {
            reader: Some(reader),
            blocks: self.blocks.clone(),
            meta_offset: self.meta_offset,
            end: end.to_vec(),
            pos: 0,
            pending_first: None,
            init: false,
            done: false,
            current: None,
        };

        // The candidate block is the first whose range reaches `start`;
        // earlier blocks hold only smaller keys.
        let candidate = iter
            .blocks
            .iter()
            .position(|block| compare(&block.end, start) != Ordering::Less);
        match candidate {
            None => iter.done = true,
            Some(index) => {
                let offset = iter.blocks[index].offset;
                iter.seek_to(offset)?;
                loop {
                    match iter.read_record()? {
                        None => {
                            iter.done = true;
                            break;
                        }
                        Some(pair) => {
                            if compare(&pair.key, start) != Ordering::Less {
                                iter.pending_first = Some(pair);
                                break;
                            }
                        }
                    }
                }
            }
        }
        Ok(iter)
    }
}

impl SstIterator {
    fn seek_to(&mut self, offset: i64) -> Result<(), StoreError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StoreError::Internal("bounded SST cursor lost its file".into()))?;
        reader.seek(SeekFrom::Start(offset as u64))?;
        self.pos = offset;
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), StoreError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StoreError::Internal("bounded SST cursor lost its file".into()))?;
        reader.read_exact(buf)?;
        self.pos += buf.len() as i64;
        Ok(())
    }

    /// Decodes the next record, hopping over padding into the following
    /// block. Returns `None` once the data region is exhausted.
    fn read_record(&mut self) -> Result<Option<Pair>, StoreError> {
        loop {
            if self.pos >= self.meta_offset {
                return Ok(None);
            }
            let mut len = [0u8; 1];
            self.fill(&mut len)?;
            if len[0] == 0 {
                // Padding: the rest of this block holds no records.
                let next_offset = self
                    .blocks
                    .iter()
                    .find(|block| block.offset >= self.pos)
                    .map(|block| block.offset);
                match next_offset {
                    Some(offset) => {
                        self.seek_to(offset)?;
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            let mut key = vec![0u8; len[0] as usize];
            self.fill(&mut key)?;
            self.fill(&mut len)?;
            let mut value = vec![0u8; len[0] as usize];
            self.fill(&mut value)?;
            return Ok(Some(Pair::new(key, value)));
        }
    }
}

impl PairIterator for SstIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        if self.done {
            return Ok(false);
        }

        let pair = if !self.init {
            self.init = true;
            match self.pending_first.take() {
                Some(pair) => pair,
                None => {
                    self.done = true;
                    return Ok(false);
                }
            }
        } else {
            match self.read_record()? {
                Some(pair) => pair,
                None => {
                    self.done = true;
                    self.current = None;
                    return Ok(false);
                }
            }
        };

        if compare(&pair.key, &self.end) == Ordering::Greater {
            self.done = true;
            self.current = None;
            return Ok(false);
        }
        self.current = Some(pair);
        Ok(true)
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        Ok(self.current.clone())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.reader = None;
        self.current = None;
        self.done = true;
        Ok(())
    }
}
