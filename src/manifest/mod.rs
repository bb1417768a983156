//! # Manifest Module
//!
//! The durable record of the current level layout. A manifest file named
//! `manifest<version>` lives in the data directory; the file with the
//! numerically greatest version reflects committed state, and each flush
//! writes `manifest<version + 1>` before the new layout becomes visible.
//!
//! ## On-disk layout
//!
//! ```text
//! level_count : u32 big-endian
//! { sst_count : u32 big-endian,
//!   { path_len : u8, path_bytes } × sst_count
//! } × level_count
//! ```
//!
//! Superseded manifests (and the SST files only they reference) are left
//! in place; they are never read again once a greater version exists.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::StoreError;

/// File-name prefix of every manifest in the data directory.
pub const MANIFEST_PREFIX: &str = "manifest";

/// A parsed manifest: the version from its file name and, per level, the
/// SST paths in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: u64,
    pub levels: Vec<Vec<String>>,
}

impl Manifest {
    /// The state of a store that has never flushed: version zero, no
    /// levels.
    pub fn empty() -> Self {
        Self {
            version: 0,
            levels: Vec::new(),
        }
    }
}

/// Path of the manifest with the given version inside `dir`.
pub(crate) fn manifest_path(dir: &str, version: u64) -> String {
    Path::new(dir)
        .join(format!("{MANIFEST_PREFIX}{version}"))
        .to_string_lossy()
        .into_owned()
}

/// Finds and parses the manifest with the numerically greatest version in
/// `dir`. Returns `None` when no manifest exists.
pub fn most_recent_manifest(dir: &str) -> Result<Option<Manifest>, StoreError> {
    let mut most_recent: Option<u64> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(suffix) = name.strip_prefix(MANIFEST_PREFIX) else {
            continue;
        };
        let Ok(version) = suffix.parse::<u64>() else {
            continue;
        };
        if most_recent.is_none_or(|current| version > current) {
            most_recent = Some(version);
        }
    }

    match most_recent {
        None => Ok(None),
        Some(version) => {
            let levels = open_manifest(&manifest_path(dir, version))?;
            debug!(version, levels = levels.len(), "opened manifest");
            Ok(Some(Manifest { version, levels }))
        }
    }
}

/// Parses a manifest file into per-level SST path lists.
pub fn open_manifest(path: &str) -> Result<Vec<Vec<String>>, StoreError> {
    let mut file = File::open(path)?;

    let mut u32_buf = [0u8; 4];
    file.read_exact(&mut u32_buf)?;
    let level_count = u32::from_be_bytes(u32_buf);

    let mut levels = Vec::with_capacity(level_count as usize);
    for _ in 0..level_count {
        file.read_exact(&mut u32_buf)?;
        let sst_count = u32::from_be_bytes(u32_buf);
        let mut paths = Vec::with_capacity(sst_count as usize);
        for _ in 0..sst_count {
            let mut len = [0u8; 1];
            file.read_exact(&mut len)?;
            let mut path_bytes = vec![0u8; len[0] as usize];
            file.read_exact(&mut path_bytes)?;
            let path = String::from_utf8(path_bytes)
                .map_err(|_| StoreError::Internal("manifest holds a non-UTF-8 path".into()))?;
            paths.push(path);
        }
        levels.push(paths);
    }

    Ok(levels)
}

/// Writes a manifest file listing the given per-level SST paths.
pub fn write_manifest(path: &str, levels: &[Vec<String>]) -> Result<(), StoreError> {
    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_all(&(levels.len() as u32).to_be_bytes())?;
    for level in levels {
        writer.write_all(&(level.len() as u32).to_be_bytes())?;
        for sst_path in level {
            if sst_path.len() > u8::MAX as usize {
                return Err(StoreError::Internal(format!(
                    "sst path is too long for the manifest: {sst_path}"
                )));
            }
            writer.write_all(&[sst_path.len() as u8])?;
            writer.write_all(sst_path.as_bytes())?;
        }
    }
    writer.flush()?;

    info!(path, levels = levels.len(), "wrote manifest");
    Ok(())
}
