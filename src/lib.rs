//! # stratadb
//!
//! An embeddable, persistent, ordered key-value store built on a
//! **log-structured merge-tree (LSM)**. Arbitrary byte-string keys and
//! values, point lookups, inclusive range iteration, and deletion, with
//! data persisted across process lifetimes in a layered on-disk format.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Lsmt                             │
//! │  ┌────────────┐  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   Active   │  │   Inactive   │  │   SST levels    │  │
//! │  │  memtable  │  │  memtables   │  │ L0 … Ln → sink  │  │
//! │  └─────┬──────┘  └──────┬───────┘  └────────┬────────┘  │
//! │        │ seal on size   │ flush             │           │
//! │        └────────►       └─────────►         │           │
//! │                                             │           │
//! │  per level: SSTs + bloom filters + block cache          │
//! │  manifest<N>: the committed level layout                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes land in the active memtable, a persistent red-black tree whose
//! roots are cheap snapshots. When it outgrows its threshold it is sealed
//! and a background flush cascades its contents through the configured
//! levels into the uncapped sink, rewriting the manifest on completion.
//! Reads probe the layers newest-first and stop at the first answer;
//! deletion tombstones mask older values in deeper layers. Range scans
//! merge one cursor per layer through a priority-ordered merging
//! iterator.
//!
//! Durability is provided **at flush time**: writes that have not been
//! flushed are lost on a crash. There is no write-ahead log.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | The [`Lsmt`] facade — write, delete, get, iterate, close |
//! | [`memtable`] | Persistent red-black tree write buffer |
//! | [`sstable`] | Immutable block-structured tables, flush pipeline, levels |
//! | [`manifest`] | Versioned record of the committed level layout |
//! | [`iterator`] | The cursor protocol and the merging iterator |
//! | [`cache`] | Sharded LRU block cache with a byte budget |
//! | [`bloom`] | Per-SST bloom filters |
//! | [`config`] | The [`Options`] contract and its validation |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratadb::{LevelOptions, Lsmt, Options, SinkOptions};
//!
//! let options = Options {
//!     levels: vec![LevelOptions {
//!         block_size: 4096,
//!         block_cache_size: 1 << 20,
//!         block_cache_shards: 4,
//!         sst_size: 1 << 22,
//!         maximum_sst_files: 4,
//!         bloom_filter_size: 1 << 16,
//!     }],
//!     sink: SinkOptions {
//!         block_size: 4096,
//!         block_cache_size: 1 << 20,
//!         block_cache_shards: 4,
//!         sst_size: 1 << 24,
//!         bloom_filter_size: 1 << 18,
//!     },
//!     path: "/tmp/stratadb".to_string(),
//!     memtable_maximum_size: 1 << 22,
//!     key_maximum_size: 64,
//!     value_maximum_size: 255,
//! };
//!
//! let store = Lsmt::open(options)?;
//!
//! store.write(b"hello".to_vec(), b"world".to_vec())?;
//! assert_eq!(store.get(b"hello")?, Some(b"world".to_vec()));
//!
//! store.delete(b"hello".to_vec())?;
//! assert_eq!(store.get(b"hello")?, None);
//!
//! store.close()?;
//! # Ok::<(), stratadb::StoreError>(())
//! ```

pub mod bloom;
pub mod cache;
pub mod comparator;
pub mod config;
pub mod engine;
pub mod error;
pub mod iterator;
pub mod manifest;
pub mod memtable;
pub mod semaphore;
pub mod sstable;

pub use config::{LevelOptions, Options, SinkOptions};
pub use engine::Lsmt;
pub use error::StoreError;
pub use iterator::{Pair, PairIterator, TOMBSTONE};
