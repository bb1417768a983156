//! # Engine Facade
//!
//! The public face of the store: [`Lsmt`] ties the active memtable, the
//! frozen (inactive) memtables awaiting flush, and the [`SstManager`]
//! into one write/delete/get/iterator/close surface.
//!
//! ## Read path
//!
//! Layers are consulted newest-first: active memtable, then each inactive
//! memtable (most recent first), then the SST levels. The first layer
//! that knows the key answers; a tombstone answer means absent and stops
//! the probe.
//!
//! ## Write path and flush
//!
//! Writes land in the active memtable and never touch disk. When the
//! active memtable's byte total passes `memtable_maximum_size` *and* the
//! single flush permit is free, the engine swaps in a fresh memtable,
//! queues the old one on the inactive list, and runs the flush pipeline
//! on a background thread. Readers that captured the old memtable keep a
//! consistent snapshot throughout.
//!
//! Durability is provided at flush time only: writes that have not been
//! flushed are lost on a crash. `close` waits out any in-flight flush and
//! then flushes every non-empty memtable synchronously.
//!
//! ## Threading contract
//!
//! The engine expects a single writer. Concurrent `write`/`delete`
//! callers are not serialized against each other; readers are always
//! safe, and a single writer may run alongside any number of readers.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use crossbeam::utils::Backoff;
use tracing::{error, info, trace, warn};

use crate::config::Options;
use crate::error::StoreError;
use crate::iterator::{HexKey, MergedIterator, PairIterator, TOMBSTONE};
use crate::manifest::{self, Manifest};
use crate::memtable::{Memtable, MemtableGet};
use crate::semaphore::Semaphore;
use crate::sstable::SstManager;

// ------------------------------------------------------------------------------------------------
// Engine state
// ------------------------------------------------------------------------------------------------

struct LsmtInner {
    /// The memtable accepting writes. Swapped for a fresh one when a
    /// flush begins.
    active: Arc<Memtable>,
    /// Sealed memtables being flushed, most recent first.
    inactive: Vec<Arc<Memtable>>,
    /// The committed on-disk state.
    manager: Arc<SstManager>,
}

/// The storage engine facade.
pub struct Lsmt {
    options: Options,
    inner: Arc<RwLock<LsmtInner>>,
    flush_permit: Arc<Semaphore>,
    closed: AtomicBool,
}

impl Lsmt {
    /// Opens a store rooted at `options.path`, creating the directory if
    /// needed and loading the most recent manifest.
    pub fn open(options: Options) -> Result<Lsmt, StoreError> {
        let violations = options.validate();
        if !violations.is_empty() {
            let joined = violations
                .iter()
                .map(|violation| violation.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StoreError::InvalidOptions(joined));
        }

        fs::create_dir_all(&options.path)?;
        let manifest =
            manifest::most_recent_manifest(&options.path)?.unwrap_or_else(Manifest::empty);
        let version = manifest.version;
        let manager = SstManager::open(manifest, &options)?;

        info!(path = %options.path, manifest_version = version, "opened store");
        Ok(Lsmt {
            options,
            inner: Arc::new(RwLock::new(LsmtInner {
                active: Arc::new(Memtable::new()),
                inactive: Vec::new(),
                manager: Arc::new(manager),
            })),
            flush_permit: Arc::new(Semaphore::new(1)),
            closed: AtomicBool::new(false),
        })
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, LsmtInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Internal("engine lock poisoned".into()))
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, LsmtInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Internal("engine lock poisoned".into()))
    }

    fn validate_key(&self, key: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::KeyEmpty);
        }
        if key.len() > self.options.key_maximum_size {
            return Err(StoreError::KeyTooLarge {
                size: key.len(),
                max: self.options.key_maximum_size,
            });
        }
        Ok(())
    }

    /// Writes a pair into the store.
    pub fn write(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        self.validate_key(&key)?;
        if value.is_empty() {
            return Err(StoreError::ValueEmpty);
        }
        if value.len() > self.options.value_maximum_size {
            return Err(StoreError::ValueTooLarge {
                size: value.len(),
                max: self.options.value_maximum_size,
            });
        }

        let active = Arc::clone(&self.read_inner()?.active);
        active.write(key, value)?;
        self.maybe_flush()
    }

    /// Deletes a key by writing the tombstone sentinel over it.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        self.validate_key(&key)?;

        trace!(key = %HexKey(&key), "delete");
        let active = Arc::clone(&self.read_inner()?.active);
        active.write(key, TOMBSTONE.to_vec())?;
        self.maybe_flush()
    }

    /// Looks up the newest value for `key`. A tombstone in any layer
    /// means absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let (active, inactive, manager) = {
            let inner = self.read_inner()?;
            (
                Arc::clone(&inner.active),
                inner.inactive.clone(),
                Arc::clone(&inner.manager),
            )
        };

        match active.get(key)? {
            MemtableGet::Found(value) => return Ok(Some(value)),
            MemtableGet::Tombstone => return Ok(None),
            MemtableGet::NotFound => {}
        }
        for memtable in &inactive {
            match memtable.get(key)? {
                MemtableGet::Found(value) => return Ok(Some(value)),
                MemtableGet::Tombstone => return Ok(None),
                MemtableGet::NotFound => {}
            }
        }
        match manager.get(key)? {
            Some(value) if value == TOMBSTONE => Ok(None),
            other => Ok(other),
        }
    }

    /// A merged cursor over `[start, end]`, both bounds inclusive, across
    /// every layer at the moment of the call. Deletions are hidden.
    pub fn iterator(&self, start: &[u8], end: &[u8]) -> Result<MergedIterator, StoreError> {
        if start.is_empty() {
            return Err(StoreError::StartEmpty);
        }
        if end.is_empty() {
            return Err(StoreError::EndEmpty);
        }
        if start >= end {
            return Err(StoreError::StartNotLessThanEnd);
        }

        let (active, inactive, manager) = {
            let inner = self.read_inner()?;
            (
                Arc::clone(&inner.active),
                inner.inactive.clone(),
                Arc::clone(&inner.manager),
            )
        };

        let mut sources: Vec<Box<dyn PairIterator>> = Vec::with_capacity(inactive.len() + 2);
        sources.push(Box::new(active.iterator(start, end)?));
        for memtable in &inactive {
            sources.push(Box::new(memtable.iterator(start, end)?));
        }
        sources.push(Box::new(manager.iterator(start, end)?));
        Ok(MergedIterator::new(sources, false))
    }

    /// Checks the flush trigger: active memtable past its size threshold
    /// and the flush permit free. On trigger, seals the active memtable
    /// and flushes in the background.
    fn maybe_flush(&self) -> Result<(), StoreError> {
        {
            let inner = self.read_inner()?;
            if inner.active.bytes()? <= self.options.memtable_maximum_size {
                return Ok(());
            }
        }
        if !self.flush_permit.try_lock() {
            return Ok(());
        }

        // Permit held: seal the active memtable and hand the inactive
        // list to a background flush.
        let (memtables, manager) = {
            let mut inner = match self.inner.write() {
                Ok(inner) => inner,
                Err(_) => {
                    self.flush_permit.unlock();
                    return Err(StoreError::Internal("engine lock poisoned".into()));
                }
            };
            let sealed = std::mem::replace(&mut inner.active, Arc::new(Memtable::new()));
            inner.inactive.insert(0, sealed);
            (inner.inactive.clone(), Arc::clone(&inner.manager))
        };

        let inner = Arc::clone(&self.inner);
        let permit = Arc::clone(&self.flush_permit);
        thread::spawn(move || {
            match manager.flush(&memtables) {
                Ok(new_manager) => match inner.write() {
                    Ok(mut inner) => {
                        inner.manager = Arc::new(new_manager);
                        inner.inactive.clear();
                    }
                    Err(_) => error!("engine lock poisoned; flushed state not installed"),
                },
                Err(e) => {
                    // The previous manifest and SSTs are untouched; the
                    // sealed memtables stay queued for the next attempt.
                    error!(%e, "background flush failed");
                }
            }
            permit.unlock();
        });
        Ok(())
    }

    /// Shuts the store down: rejects further writes, waits out any
    /// in-flight flush, and synchronously flushes every non-empty
    /// memtable.
    pub fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);

        let backoff = Backoff::new();
        while !self.flush_permit.idle() {
            backoff.snooze();
        }

        let (memtables, manager) = {
            let inner = self.read_inner()?;
            let mut memtables = Vec::with_capacity(inner.inactive.len() + 1);
            memtables.push(Arc::clone(&inner.active));
            memtables.extend(inner.inactive.iter().cloned());
            (memtables, Arc::clone(&inner.manager))
        };
        let memtables: Vec<_> = memtables
            .into_iter()
            .filter(|memtable| memtable.bytes().map(|b| b > 0).unwrap_or(false))
            .collect();
        if memtables.is_empty() {
            info!("closed store with nothing to flush");
            return Ok(());
        }

        let flushed = manager.flush(&memtables);
        match flushed {
            Ok(new_manager) => {
                let mut inner = self.write_inner()?;
                inner.manager = Arc::new(new_manager);
                inner.inactive.clear();
                inner.active = Arc::new(Memtable::new());
                info!("closed store");
                Ok(())
            }
            Err(e) => {
                warn!(%e, "flush on close failed");
                Err(e)
            }
        }
    }
}
