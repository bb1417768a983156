//! # Iterator Framework
//!
//! The merging-iterator framework that ties the storage layers together.
//! Every cursor in the store — memtable, SST file, cached level — speaks
//! the same three-method protocol, and [`MergedIterator`] composes any
//! number of them into a single ordered, deduplicated stream.
//!
//! ## Protocol
//!
//! - `next()` advances the cursor and reports whether a pair is available.
//! - `get()` returns the pair selected by the last successful `next()`.
//! - `close()` releases underlying resources; terminal.
//!
//! ## Merge Semantics
//!
//! Sources are passed in priority order: when two or more sources hold the
//! same key, the pair from the lowest-index source wins and the duplicates
//! are consumed silently. Each key is emitted exactly once, assuming each
//! key appears at most once per source.
//!
//! Tombstones (empty values) are skipped transparently when the merged
//! iterator is constructed with `return_tombstone = false`; each source is
//! advanced past its tombstone pairs before taking part in the merge.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::fmt;

use crate::comparator::compare;
use crate::error::StoreError;

// ------------------------------------------------------------------------------------------------
// Pair and tombstone
// ------------------------------------------------------------------------------------------------

/// The tombstone sentinel: an empty value denoting a deletion.
///
/// Public writes reject empty values, so the sentinel can never collide
/// with user data.
pub const TOMBSTONE: &[u8] = &[];

/// A key/value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Pair {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Whether this pair carries the deletion sentinel.
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }
}

// ------------------------------------------------------------------------------------------------
// Iterator trait
// ------------------------------------------------------------------------------------------------

/// The cursor protocol shared by all storage layers.
///
/// Implementations yield pairs in ascending key order. `next` must be
/// called before the first `get`.
pub trait PairIterator: Send {
    /// Advances the cursor. Returns `true` while a pair is available.
    fn next(&mut self) -> Result<bool, StoreError>;

    /// Returns the pair selected by the last successful `next`.
    fn get(&self) -> Result<Option<Pair>, StoreError>;

    /// Releases underlying resources. Terminal.
    fn close(&mut self) -> Result<(), StoreError>;
}

// ------------------------------------------------------------------------------------------------
// EmptyIterator
// ------------------------------------------------------------------------------------------------

/// An iterator over nothing, used when composing levels that do not exist.
pub struct EmptyIterator;

impl PairIterator for EmptyIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        Ok(None)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// MergedIterator
// ------------------------------------------------------------------------------------------------

/// Cursor state of a [`MergedIterator`].
enum Cursor {
    /// `next` has not been called yet.
    Init,
    /// `close` has been called.
    Closed,
    /// Index of the source that produced the last returned pair.
    At(usize),
}

/// A priority-ordered multi-way merge over ordered sources.
///
/// See the module documentation for the merge and tombstone semantics.
pub struct MergedIterator {
    sources: Vec<Box<dyn PairIterator>>,
    peek: Vec<Option<Pair>>,
    cursor: Cursor,
    return_tombstone: bool,
}

impl MergedIterator {
    /// Creates a merged iterator from sources in priority order (index 0
    /// wins ties). `return_tombstone` controls whether deletion markers
    /// are surfaced or skipped.
    pub fn new(sources: Vec<Box<dyn PairIterator>>, return_tombstone: bool) -> Self {
        let peek = sources.iter().map(|_| None).collect();
        Self {
            sources,
            peek,
            cursor: Cursor::Init,
            return_tombstone,
        }
    }

    /// Advances source `index` and refreshes its peeked pair, skipping
    /// tombstones when configured to.
    fn advance(&mut self, index: usize) -> Result<(), StoreError> {
        if !self.sources[index].next()? {
            self.peek[index] = None;
            return Ok(());
        }

        let mut pair = self.sources[index].get()?;
        if !self.return_tombstone {
            while let Some(p) = &pair {
                if !p.is_tombstone() {
                    break;
                }
                if self.sources[index].next()? {
                    pair = self.sources[index].get()?;
                } else {
                    self.peek[index] = None;
                    return Ok(());
                }
            }
        }
        self.peek[index] = pair;
        Ok(())
    }
}

impl PairIterator for MergedIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        match self.cursor {
            Cursor::Closed => return Ok(false),
            Cursor::Init => {
                for index in 0..self.sources.len() {
                    self.advance(index)?;
                }
            }
            Cursor::At(index) => self.advance(index)?,
        }

        // Select the minimum key across all peeked pairs, consuming the
        // duplicate from every lower-priority source that holds it.
        let mut min: Option<(usize, Vec<u8>)> = None;
        for index in 0..self.peek.len() {
            let key = match &self.peek[index] {
                Some(pair) => pair.key.clone(),
                None => continue,
            };
            match &min {
                None => min = Some((index, key)),
                Some((_, min_key)) => match compare(&key, min_key) {
                    Ordering::Less => min = Some((index, key)),
                    Ordering::Equal => self.advance(index)?,
                    Ordering::Greater => {}
                },
            }
        }

        match min {
            Some((index, _)) => {
                self.cursor = Cursor::At(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        match self.cursor {
            Cursor::Init => Err(StoreError::GetBeforeNext),
            Cursor::Closed => Ok(None),
            Cursor::At(index) => Ok(self.peek[index].clone()),
        }
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let mut last_error = None;
        for (index, source) in self.sources.iter_mut().enumerate() {
            if let Err(e) = source.close() {
                last_error = Some(e);
            }
            self.peek[index] = None;
        }
        self.cursor = Cursor::Closed;
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Tracing helper
// ------------------------------------------------------------------------------------------------

/// Renders a byte key as hex for tracing output, truncating long keys.
pub(crate) struct HexKey<'a>(pub &'a [u8]);

impl fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 32 {
            for byte in self.0 {
                write!(f, "{byte:02x}")?;
            }
        } else {
            for byte in &self.0[..16] {
                write!(f, "{byte:02x}")?;
            }
            write!(f, "...[{} bytes]", self.0.len())?;
        }
        Ok(())
    }
}
