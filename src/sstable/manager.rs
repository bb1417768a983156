//! # SST Manager
//!
//! Owns the on-disk side of the store: one [`SstLevel`] per manifest
//! level, each with its SST set, per-SST bloom filters, and a shared
//! block cache. Serves point lookups, composes per-level cursors into
//! range scans, and runs the flush/compaction pipeline that moves
//! memtable contents down through the levels.
//!
//! ## Level discipline
//!
//! - The authoritative value for a key is the one from the lowest level
//!   in which it appears; point lookups probe levels in order and stop at
//!   the first hit (tombstones included — the engine interprets them).
//! - Within a non-sink level, SST key ranges are disjoint and ordered.
//! - Each configured level `i` holds at most `sst_size · maximum_sst_files`
//!   bytes; a flush feeds a level until that cap and cascades the
//!   remainder into level `i+1`, ending at the uncapped sink.
//! - Tombstones survive every cascade except the final pass into the
//!   sink, where nothing deeper can be masked and they are dropped for
//!   good.
//!
//! The pipeline rewrites every level it touches and then records the new
//! layout in a fresh manifest; only after the manifest is written does
//! the new manager become visible to readers. Superseded SST files are
//! left on disk unreferenced.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bloom::BloomFilter;
use crate::cache::ShardedLruCache;
use crate::config::{LevelParams, Options};
use crate::error::StoreError;
use crate::iterator::{EmptyIterator, MergedIterator, Pair, PairIterator};
use crate::manifest::{self, Manifest};
use crate::memtable::Memtable;
use crate::sstable::cached::CachedLevelIterator;
use crate::sstable::flush::LevelFlush;
use crate::sstable::{decode_record, BlockKey, Sst};

// ------------------------------------------------------------------------------------------------
// SstLevel
// ------------------------------------------------------------------------------------------------

/// One level's resident state: its SSTs in order, a bloom filter per SST,
/// and the level's block cache.
struct SstLevel {
    ssts: Vec<Arc<Sst>>,
    blooms: Vec<BloomFilter>,
    cache: Arc<ShardedLruCache<BlockKey>>,
}

// ------------------------------------------------------------------------------------------------
// SstManager
// ------------------------------------------------------------------------------------------------

/// The set of levels currently committed by the manifest.
pub struct SstManager {
    levels: Vec<SstLevel>,
    options: Options,
    manifest: Manifest,
}

impl SstManager {
    /// Opens every SST the manifest references, building each level's
    /// block cache and bloom filters. Level `i` takes its parameters from
    /// the configured level `i`, or from the sink once past them.
    pub fn open(manifest: Manifest, options: &Options) -> Result<SstManager, StoreError> {
        let mut levels = Vec::with_capacity(manifest.levels.len());
        for (index, paths) in manifest.levels.iter().enumerate() {
            let params = options.level_params(index);
            let cache = Arc::new(ShardedLruCache::new(
                params.block_cache_shards,
                params.block_cache_size,
            ));
            let mut ssts = Vec::with_capacity(paths.len());
            let mut blooms = Vec::with_capacity(paths.len());
            for path in paths {
                let sst = Sst::open(path)?;
                blooms.push(sst.populate_bloom_filter(params.bloom_filter_size)?);
                ssts.push(Arc::new(sst));
            }
            levels.push(SstLevel { ssts, blooms, cache });
        }

        debug!(
            version = manifest.version,
            levels = levels.len(),
            "opened SST manager"
        );
        Ok(SstManager {
            levels,
            options: options.clone(),
            manifest,
        })
    }

    /// Manifest version this manager was opened from.
    pub fn manifest_version(&self) -> u64 {
        self.manifest.version
    }

    /// Point lookup through the levels, shallowest first.
    ///
    /// A tombstone hit is returned as-is (an empty value); interpreting it
    /// is the engine's job.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        for level in &self.levels {
            for (sst, bloom) in level.ssts.iter().zip(&level.blooms) {
                if !bloom.test(key) {
                    continue;
                }
                let Some(block) = sst.get_block(key) else {
                    continue;
                };
                let sst_for_read = Arc::clone(sst);
                let block_for_read = block.clone();
                let buf = level.cache.get(sst.block_key(block), move |_| {
                    sst_for_read.read_block(&block_for_read)
                })?;

                let mut pos = 0;
                while let Some((pair, next_pos)) = decode_record(&buf, pos) {
                    if pair.key == key {
                        return Ok(Some(pair.value));
                    }
                    pos = next_pos;
                }
            }
        }
        Ok(None)
    }

    /// A merged cursor over `[start, end]` across all levels, shallower
    /// levels taking priority. Deletions are hidden.
    pub fn iterator(&self, start: &[u8], end: &[u8]) -> Result<MergedIterator, StoreError> {
        let mut sources: Vec<Box<dyn PairIterator>> = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            sources.push(Box::new(CachedLevelIterator::bounded(
                start,
                end,
                Arc::clone(&level.cache),
                level.ssts.clone(),
            )?));
        }
        Ok(MergedIterator::new(sources, false))
    }

    /// A full-range cursor over level `index`, or an empty cursor when
    /// the level does not exist yet.
    fn level_iterator(&self, index: usize) -> Result<Box<dyn PairIterator>, StoreError> {
        match self.levels.get(index) {
            Some(level) => Ok(Box::new(CachedLevelIterator::unbounded(
                Arc::clone(&level.cache),
                level.ssts.clone(),
            )?)),
            None => Ok(Box::new(EmptyIterator)),
        }
    }

    /// Runs the cascading flush pipeline over `memtables` (most recent
    /// first) and returns a manager reflecting the new committed state.
    ///
    /// Each configured level is rewritten as the merge of the incoming
    /// stream with its current contents, capped at its byte budget; the
    /// overflow cascades downward. The final pass into the sink drops
    /// tombstones. On success a new manifest is written and re-opened.
    pub fn flush(&self, memtables: &[Arc<Memtable>]) -> Result<SstManager, StoreError> {
        if memtables.is_empty() {
            return Err(StoreError::EmptyFlush);
        }
        info!(
            memtables = memtables.len(),
            version = self.manifest.version,
            "flush started"
        );

        let mut sources: Vec<Box<dyn PairIterator>> = Vec::with_capacity(memtables.len());
        for memtable in memtables {
            sources.push(Box::new(memtable.unbounded_iterator()?));
        }
        let mut running: Box<dyn PairIterator> = Box::new(MergedIterator::new(sources, true));
        let mut pending: Option<Pair> = None;
        let mut new_levels: Vec<Vec<Sst>> = Vec::new();

        // Cascade through the configured levels, tombstones retained.
        for index in 0..self.options.levels.len() {
            let params = self.options.level_params(index);
            let cap = params.byte_cap();
            let source = PushbackIterator::new(pending.take(), running);
            let sources: Vec<Box<dyn PairIterator>> =
                vec![Box::new(source), self.level_iterator(index)?];
            let merged = MergedIterator::new(sources, true);
            let (ssts, overflow, merged) =
                fill_level(&self.options.path, params, cap, merged, false)?;
            new_levels.push(ssts);
            pending = overflow;
            running = Box::new(merged);
        }

        // Final pass into the sink: no cap, and tombstones are dropped for
        // good. The merge still carries them so they win over the sink's
        // older values and consume those duplicates; only the output
        // discards them.
        let sink_index = self.options.levels.len();
        let params = self.options.level_params(sink_index);
        let source = PushbackIterator::new(pending.take(), running);
        let sources: Vec<Box<dyn PairIterator>> =
            vec![Box::new(source), self.level_iterator(sink_index)?];
        let merged = MergedIterator::new(sources, true);
        let (ssts, _, mut merged) = fill_level(&self.options.path, params, None, merged, true)?;
        new_levels.push(ssts);
        merged.close()?;

        // Commit: write manifest <version + 1>, then re-open the most
        // recent manifest so the version numbering stays normalized.
        let paths: Vec<Vec<String>> = new_levels
            .iter()
            .map(|level| level.iter().map(|sst| sst.path().to_string()).collect())
            .collect();
        let next_version = self.manifest.version + 1;
        manifest::write_manifest(
            &manifest::manifest_path(&self.options.path, next_version),
            &paths,
        )?;
        let manifest = manifest::most_recent_manifest(&self.options.path)?
            .ok_or_else(|| StoreError::Internal("manifest vanished after write".into()))?;

        info!(version = manifest.version, "flush finished");
        SstManager::open(manifest, &self.options)
    }
}

/// Feeds `merged` into a level flush until the byte cap rejects a pair or
/// the stream ends. Returns the level's SSTs, the rejected pair (which
/// belongs to the next level down), and the iterator for further
/// cascading. With `drop_tombstones`, deletion markers are consumed
/// without being written (the sink pass).
fn fill_level(
    dir: &str,
    params: LevelParams,
    cap: Option<i64>,
    mut merged: MergedIterator,
    drop_tombstones: bool,
) -> Result<(Vec<Sst>, Option<Pair>, MergedIterator), StoreError> {
    let mut flush = LevelFlush::new(dir, params, cap);
    let mut overflow = None;
    while merged.next()? {
        let Some(pair) = merged.get()? else {
            break;
        };
        if drop_tombstones && pair.is_tombstone() {
            continue;
        }
        if flush.will_accept(&pair) {
            flush.accept(pair)?;
        } else {
            overflow = Some(pair);
            break;
        }
    }
    Ok((flush.close()?, overflow, merged))
}

// ------------------------------------------------------------------------------------------------
// PushbackIterator
// ------------------------------------------------------------------------------------------------

/// Re-offers a pair that a level's byte cap rejected ahead of the rest of
/// its stream. The pair was the smallest key not yet written, so yielding
/// it first keeps the stream sorted.
struct PushbackIterator {
    head: Option<Pair>,
    inner: Box<dyn PairIterator>,
    current: Option<Pair>,
}

impl PushbackIterator {
    fn new(head: Option<Pair>, inner: Box<dyn PairIterator>) -> Self {
        Self {
            head,
            inner,
            current: None,
        }
    }
}

impl PairIterator for PushbackIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        if let Some(head) = self.head.take() {
            self.current = Some(head);
            return Ok(true);
        }
        if self.inner.next()? {
            self.current = self.inner.get()?;
            Ok(self.current.is_some())
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        Ok(self.current.clone())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.head = None;
        self.current = None;
        self.inner.close()
    }
}
