use tempfile::TempDir;

use crate::config::{LevelOptions, LevelParams, Options, SinkOptions};
use crate::iterator::Pair;
use crate::sstable::flush::LevelFlush;
use crate::sstable::Sst;

/// Level parameters for direct `LevelFlush` tests.
pub(crate) fn params(block_size: i64, sst_size: i64) -> LevelParams {
    LevelParams {
        block_size,
        block_cache_size: block_size * 64,
        block_cache_shards: 2,
        sst_size,
        bloom_filter_size: 1024,
        maximum_sst_files: Some(4),
    }
}

/// Writes `pairs` (already key-ordered) through a level flush with no
/// byte cap, returning the produced SSTs.
pub(crate) fn write_ssts(dir: &str, params: LevelParams, pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<Sst> {
    let mut flush = LevelFlush::new(dir, params, None);
    for (key, value) in pairs {
        flush
            .accept(Pair::new(key.clone(), value.clone()))
            .expect("accept");
    }
    flush.close().expect("close")
}

pub(crate) fn dir_str(dir: &TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

/// One-byte keys and values `0..count`, in order.
pub(crate) fn byte_pairs(count: u8) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count).map(|i| (vec![i], vec![i])).collect()
}

/// Options rooted at `dir` with one configured level and a sink, sized
/// for small tests: ten-byte blocks (two one-byte records each).
pub(crate) fn small_options(dir: &str, level_sst_size: i64, level_max_files: usize) -> Options {
    Options {
        levels: vec![LevelOptions {
            block_size: 10,
            block_cache_size: 1024,
            block_cache_shards: 2,
            sst_size: level_sst_size,
            maximum_sst_files: level_max_files,
            bloom_filter_size: 1024,
        }],
        sink: SinkOptions {
            block_size: 10,
            block_cache_size: 1024,
            block_cache_shards: 2,
            sst_size: 1 << 16,
            bloom_filter_size: 1024,
        },
        path: dir.to_string(),
        memtable_maximum_size: 1 << 16,
        key_maximum_size: 8,
        value_maximum_size: 8,
    }
}
