//! # Configuration
//!
//! The options contract the engine consumes. Loading options from a file
//! or environment is the embedding application's job; this module defines
//! the struct, per-level parameter resolution, and validation.
//!
//! Validation reports *every* violation, not just the first, so a caller
//! can surface a complete diagnosis of a bad configuration.

use thiserror::Error;

/// Configuration for one non-terminal level of the store.
///
/// All sizes are in bytes except `bloom_filter_size`, which is in bits.
#[derive(Debug, Clone)]
pub struct LevelOptions {
    pub block_size: i64,
    pub block_cache_size: i64,
    pub block_cache_shards: usize,
    pub sst_size: i64,
    pub maximum_sst_files: usize,
    pub bloom_filter_size: u32,
}

/// Configuration for the sink, the terminal level.
///
/// The sink has no `maximum_sst_files`: it is uncapped, since there is no
/// deeper level to cascade into.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub block_size: i64,
    pub block_cache_size: i64,
    pub block_cache_shards: usize,
    pub sst_size: i64,
    pub bloom_filter_size: u32,
}

/// Options for a store instance. All sizes are specified in bytes.
#[derive(Debug, Clone)]
pub struct Options {
    /// Ordered non-terminal level configurations; may be empty.
    pub levels: Vec<LevelOptions>,
    /// The terminal level.
    pub sink: SinkOptions,
    /// Directory holding SST files and manifests.
    pub path: String,
    /// Active-memtable byte threshold that triggers a flush.
    pub memtable_maximum_size: i64,
    /// Largest accepted key, in bytes. At most 255: keys are written with
    /// a single-byte length prefix.
    pub key_maximum_size: usize,
    /// Largest accepted value, in bytes. At most 255, as for keys.
    pub value_maximum_size: usize,
}

/// A single validation violation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} {value} must be greater than 0")]
    NonPositive { field: &'static str, value: i64 },

    #[error("{field} {value} must not be greater than 255")]
    ExceedsLengthPrefix { field: &'static str, value: usize },

    #[error("KeyMaximumSize {key_max} is larger than {scope}'s BlockSize {block_size}")]
    KeyLargerThanBlock {
        scope: &'static str,
        key_max: usize,
        block_size: i64,
    },

    #[error("ValueMaximumSize {value_max} is larger than {scope}'s BlockSize {block_size}")]
    ValueLargerThanBlock {
        scope: &'static str,
        value_max: usize,
        block_size: i64,
    },

    #[error("BlockSize {block_size} is larger than {scope}'s BlockCacheSize {cache_size}")]
    BlockLargerThanCache {
        scope: &'static str,
        block_size: i64,
        cache_size: i64,
    },

    #[error("{scope}'s BloomFilterSize must be greater than 0")]
    BloomFilterEmpty { scope: &'static str },

    #[error("{scope}'s BlockCacheShards must be greater than 0")]
    NoCacheShards { scope: &'static str },

    #[error("MaximumSSTFiles must be greater than 0 for every level")]
    NoMaximumSstFiles,
}

/// The parameters of one level as seen by the SST layer, with the level /
/// sink distinction resolved away.
#[derive(Debug, Clone)]
pub(crate) struct LevelParams {
    pub(crate) block_size: i64,
    pub(crate) block_cache_size: i64,
    pub(crate) block_cache_shards: usize,
    pub(crate) sst_size: i64,
    pub(crate) bloom_filter_size: u32,
    pub(crate) maximum_sst_files: Option<usize>,
}

impl LevelParams {
    /// Total byte cap of the level, or `None` for the uncapped sink.
    pub(crate) fn byte_cap(&self) -> Option<i64> {
        self.maximum_sst_files
            .map(|files| self.sst_size * files as i64)
    }
}

impl Options {
    /// Resolves the parameters of level `index`. Indexes beyond the
    /// configured levels refer to the sink.
    pub(crate) fn level_params(&self, index: usize) -> LevelParams {
        match self.levels.get(index) {
            Some(level) => LevelParams {
                block_size: level.block_size,
                block_cache_size: level.block_cache_size,
                block_cache_shards: level.block_cache_shards,
                sst_size: level.sst_size,
                bloom_filter_size: level.bloom_filter_size,
                maximum_sst_files: Some(level.maximum_sst_files),
            },
            None => LevelParams {
                block_size: self.sink.block_size,
                block_cache_size: self.sink.block_cache_size,
                block_cache_shards: self.sink.block_cache_shards,
                sst_size: self.sink.sst_size,
                bloom_filter_size: self.sink.bloom_filter_size,
                maximum_sst_files: None,
            },
        }
    }

    /// Checks every field, returning the full list of violations. An
    /// empty list means the options are usable.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.memtable_maximum_size < 1 {
            errors.push(ConfigError::NonPositive {
                field: "MemtableMaximumSize",
                value: self.memtable_maximum_size,
            });
        }
        if self.key_maximum_size < 1 {
            errors.push(ConfigError::NonPositive {
                field: "KeyMaximumSize",
                value: self.key_maximum_size as i64,
            });
        } else if self.key_maximum_size > 255 {
            errors.push(ConfigError::ExceedsLengthPrefix {
                field: "KeyMaximumSize",
                value: self.key_maximum_size,
            });
        }
        if self.value_maximum_size < 1 {
            errors.push(ConfigError::NonPositive {
                field: "ValueMaximumSize",
                value: self.value_maximum_size as i64,
            });
        } else if self.value_maximum_size > 255 {
            errors.push(ConfigError::ExceedsLengthPrefix {
                field: "ValueMaximumSize",
                value: self.value_maximum_size,
            });
        }

        for level in &self.levels {
            self.validate_shared(
                "a level",
                level.block_size,
                level.block_cache_size,
                level.block_cache_shards,
                level.bloom_filter_size,
                &mut errors,
            );
            if level.maximum_sst_files < 1 {
                errors.push(ConfigError::NoMaximumSstFiles);
            }
        }
        self.validate_shared(
            "the sink",
            self.sink.block_size,
            self.sink.block_cache_size,
            self.sink.block_cache_shards,
            self.sink.bloom_filter_size,
            &mut errors,
        );

        errors
    }

    fn validate_shared(
        &self,
        scope: &'static str,
        block_size: i64,
        cache_size: i64,
        cache_shards: usize,
        bloom_bits: u32,
        errors: &mut Vec<ConfigError>,
    ) {
        if block_size < self.key_maximum_size as i64 {
            errors.push(ConfigError::KeyLargerThanBlock {
                scope,
                key_max: self.key_maximum_size,
                block_size,
            });
        }
        if block_size < self.value_maximum_size as i64 {
            errors.push(ConfigError::ValueLargerThanBlock {
                scope,
                value_max: self.value_maximum_size,
                block_size,
            });
        }
        if block_size > cache_size {
            errors.push(ConfigError::BlockLargerThanCache {
                scope,
                block_size,
                cache_size,
            });
        }
        if cache_shards < 1 {
            errors.push(ConfigError::NoCacheShards { scope });
        }
        if bloom_bits < 1 {
            errors.push(ConfigError::BloomFilterEmpty { scope });
        }
    }
}
