//! Level-flush writer: streams key-ordered pairs into block-aligned SST
//! files for one level.
//!
//! The writer rolls to a new block whenever the next record would overflow
//! the level's block size, zero-padding the remainder so every block
//! occupies exactly `block_size` bytes on disk, and rolls to a new file
//! whenever the next record would overflow the level's SST size. Closing a
//! file appends the block index and the trailing metadata offset.
//!
//! Callers must probe [`LevelFlush::will_accept`] before each
//! [`LevelFlush::accept`]; a rejected pair belongs to the next level down
//! and the flush must be closed without it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rand::Rng;
use tracing::debug;

use crate::config::LevelParams;
use crate::error::StoreError;
use crate::iterator::Pair;
use crate::sstable::{record_length, Block, Sst};

// ------------------------------------------------------------------------------------------------
// File naming
// ------------------------------------------------------------------------------------------------

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Creates a new SST file under `dir` with a random hyphenated hex name.
fn new_sst_file(dir: &str) -> Result<(File, String), StoreError> {
    let bytes: [u8; 16] = rand::rng().random();
    let name = format!(
        "{}-{}-{}-{}-{}.sst",
        hex(&bytes[0..4]),
        hex(&bytes[4..6]),
        hex(&bytes[6..8]),
        hex(&bytes[8..10]),
        hex(&bytes[10..16]),
    );
    let path = Path::new(dir).join(name);
    let path = path.to_string_lossy().into_owned();
    let file = File::create(&path)?;
    Ok((file, path))
}

// ------------------------------------------------------------------------------------------------
// Metadata
// ------------------------------------------------------------------------------------------------

/// Appends the block index and the trailing metadata offset.
fn write_meta(
    writer: &mut BufWriter<File>,
    meta_start: i64,
    blocks: &[Block],
) -> Result<(), StoreError> {
    writer.write_all(&(blocks.len() as i64).to_be_bytes())?;
    for block in blocks {
        writer.write_all(&[block.start.len() as u8])?;
        writer.write_all(&block.start)?;
        writer.write_all(&[block.end.len() as u8])?;
        writer.write_all(&block.end)?;
        writer.write_all(&block.used_bytes.to_be_bytes())?;
        writer.write_all(&block.offset.to_be_bytes())?;
    }
    writer.write_all(&meta_start.to_be_bytes())?;
    writer.flush()?;
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// LevelFlush
// ------------------------------------------------------------------------------------------------

/// Streams accepted pairs into one level's SST files.
pub(crate) struct LevelFlush {
    dir: String,
    level: LevelParams,
    writer: Option<BufWriter<File>>,
    path: Option<String>,
    blocks: Vec<Block>,
    ssts: Vec<Sst>,
    previous_key: Vec<u8>,
    bytes_written: i64,
    current_block_size: i64,
    total_bytes_written: i64,
    /// Byte cap across all files of this flush; `None` for the sink.
    max_size: Option<i64>,
}

impl LevelFlush {
    pub(crate) fn new(dir: &str, level: LevelParams, max_size: Option<i64>) -> Self {
        Self {
            dir: dir.to_string(),
            level,
            writer: None,
            path: None,
            blocks: Vec::new(),
            ssts: Vec::new(),
            previous_key: Vec::new(),
            bytes_written: 0,
            current_block_size: 0,
            total_bytes_written: 0,
            max_size,
        }
    }

    /// Whether the level will accept `pair` without exceeding its byte
    /// cap. When this returns `false` the caller must close the flush
    /// without accepting the pair.
    pub(crate) fn will_accept(&self, pair: &Pair) -> bool {
        match self.max_size {
            None => true,
            Some(max) => self.total_bytes_written + record_length(pair) <= max,
        }
    }

    /// Accepts a pair into the level. Pairs must arrive in ascending key
    /// order.
    pub(crate) fn accept(&mut self, pair: Pair) -> Result<(), StoreError> {
        let additional = record_length(&pair);

        // Roll the file when the record would push it past the SST size.
        if self.writer.is_some() && self.bytes_written + additional > self.level.sst_size {
            self.finalize_file()?;
        }

        if self.writer.is_none() {
            let (file, path) = new_sst_file(&self.dir)?;
            self.writer = Some(BufWriter::new(file));
            self.path = Some(path);
            self.blocks = vec![Block {
                start: pair.key.clone(),
                end: Vec::new(),
                used_bytes: 0,
                offset: 0,
            }];
            self.bytes_written = 0;
            self.current_block_size = 0;
        } else if self.current_block_size + additional > self.level.block_size {
            // Roll the block when the record would overflow it.
            self.close_block()?;
            self.blocks.push(Block {
                start: pair.key.clone(),
                end: Vec::new(),
                used_bytes: 0,
                offset: self.bytes_written,
            });
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::Internal("level flush lost its writer".into()))?;
        writer.write_all(&[pair.key.len() as u8])?;
        writer.write_all(&pair.key)?;
        writer.write_all(&[pair.value.len() as u8])?;
        writer.write_all(&pair.value)?;

        self.bytes_written += additional;
        self.current_block_size += additional;
        self.total_bytes_written += additional;
        self.previous_key = pair.key;
        Ok(())
    }

    /// Closes any open file and returns every SST this flush produced, in
    /// write order.
    pub(crate) fn close(mut self) -> Result<Vec<Sst>, StoreError> {
        if self.writer.is_some() {
            self.finalize_file()?;
        }
        Ok(self.ssts)
    }

    /// Seals the current block: record its end key and used bytes, then
    /// zero-pad to the configured block size.
    fn close_block(&mut self) -> Result<(), StoreError> {
        let remaining = self.level.block_size - self.current_block_size;
        if remaining > 0 {
            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| StoreError::Internal("level flush lost its writer".into()))?;
            writer.write_all(&vec![0u8; remaining as usize])?;
        }
        self.bytes_written += remaining;
        self.total_bytes_written += remaining;

        let last = self
            .blocks
            .last_mut()
            .ok_or_else(|| StoreError::Internal("level flush has no open block".into()))?;
        last.end = self.previous_key.clone();
        last.used_bytes = self.current_block_size;
        self.current_block_size = 0;
        Ok(())
    }

    /// Seals the current block, appends the index and trailer, and closes
    /// the file, recording the finished SST.
    fn finalize_file(&mut self) -> Result<(), StoreError> {
        self.close_block()?;
        let meta_offset = self.bytes_written;

        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| StoreError::Internal("level flush lost its writer".into()))?;
        write_meta(&mut writer, meta_offset, &self.blocks)?;
        drop(writer);

        let path = self
            .path
            .take()
            .ok_or_else(|| StoreError::Internal("level flush lost its file path".into()))?;
        debug!(
            path = %path,
            blocks = self.blocks.len(),
            bytes = meta_offset,
            "sealed SST file"
        );
        self.ssts.push(Sst {
            file: path.into(),
            blocks: std::mem::take(&mut self.blocks),
            meta_offset,
        });
        Ok(())
    }
}
