//! Crate-wide error type.
//!
//! Every storage subsystem composes through the shared [`PairIterator`]
//! trait, so they all surface the same error enum. Underlying I/O errors
//! are wrapped verbatim.
//!
//! [`PairIterator`]: crate::iterator::PairIterator

use std::io;

use thiserror::Error;

/// Errors surfaced by the storage engine and its subsystems.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation invoked after the store was shut down.
    #[error("store is closed")]
    Closed,

    /// A key must contain at least one byte.
    #[error("key must not be empty")]
    KeyEmpty,

    /// A value must contain at least one byte.
    #[error("value must not be empty")]
    ValueEmpty,

    /// Key exceeds the configured maximum size.
    #[error("key length {size} exceeds the maximum key size {max}")]
    KeyTooLarge { size: usize, max: usize },

    /// Value exceeds the configured maximum size.
    #[error("value length {size} exceeds the maximum value size {max}")]
    ValueTooLarge { size: usize, max: usize },

    /// Iterator start bound must contain at least one byte.
    #[error("start must not be empty")]
    StartEmpty,

    /// Iterator end bound must contain at least one byte.
    #[error("end must not be empty")]
    EndEmpty,

    /// Iterator bounds are inverted or equal.
    #[error("start must be less than end")]
    StartNotLessThanEnd,

    /// A cache key routed itself to a shard that does not exist.
    #[error("shard {shard} out of range for {shards} shards")]
    ShardOutOfRange { shard: usize, shards: usize },

    /// An SST block read returned fewer bytes than its descriptor declares.
    #[error("block read returned {actual} bytes, expected {expected}")]
    BlockUnderflow { expected: i64, actual: i64 },

    /// `next`/`get` after `close` on an SST file iterator.
    #[error("iterator is closed")]
    IteratorClosed,

    /// `get` invoked on a merged iterator before the first `next`.
    #[error("get invoked before next")]
    GetBeforeNext,

    /// Flush invoked with no source memtables.
    #[error("unable to flush without a source")]
    EmptyFlush,

    /// Configuration rejected by validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
