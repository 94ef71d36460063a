//! Side-car index file
//!
//! Durable snapshot of an [`IdMultimap`] kept next to the storage it indexes.
//! It is only a cache: when it is missing, damaged or stale, the owner rebuilds it
//! from the primary storage.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┬───────────┐
//! │ bincode { magic, version, covered_records,   │ CRC32 (4) │
//! │           entries: [(key, value)] }          │ LE        │
//! └──────────────────────────────────────────────┴───────────┘
//! ```
//! Written to `<path>.tmp` and renamed over `<path>`, so a crash leaves either the old
//! snapshot or the new one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::map::IdMultimap;

const SIDECAR_MAGIC: u32 = u32::from_be_bytes(*b"VIDX");
const SIDECAR_VERSION: u32 = 1;
const CRC_SIZE: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct SidecarFile {
    magic: u32,
    version: u32,
    covered_records: u64,
    entries: Vec<(u32, u32)>,
}

/// A loaded snapshot
#[derive(Debug)]
pub struct SidecarSnapshot {
    /// Records count of the primary storage when the snapshot was taken
    pub covered_records: u64,
    pub map: IdMultimap,
}

/// Result of trying to load a side-car file
#[derive(Debug)]
pub enum SidecarLoad {
    Loaded(SidecarSnapshot),
    Missing,
    Empty,
    /// Checksum, decode, magic or version failure
    Invalid(String),
}

/// Handle on a side-car file path
#[derive(Debug, Clone)]
pub struct SidecarIndex {
    path: PathBuf,
}

impl SidecarIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SidecarLoad> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SidecarLoad::Missing),
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Ok(SidecarLoad::Empty);
        }
        if bytes.len() < CRC_SIZE {
            return Ok(SidecarLoad::Invalid(format!(
                "{} bytes is too short for a checksum",
                bytes.len()
            )));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - CRC_SIZE);
        let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed_crc = crc32fast::hash(body);
        if stored_crc != computed_crc {
            return Ok(SidecarLoad::Invalid(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let file: SidecarFile = match bincode::deserialize(body) {
            Ok(file) => file,
            Err(e) => return Ok(SidecarLoad::Invalid(format!("decode failed: {}", e))),
        };
        if file.magic != SIDECAR_MAGIC {
            return Ok(SidecarLoad::Invalid(format!("bad magic {:#x}", file.magic)));
        }
        if file.version != SIDECAR_VERSION {
            return Ok(SidecarLoad::Invalid(format!(
                "version {} is not supported",
                file.version
            )));
        }

        let mut map = IdMultimap::with_capacity(file.entries.len());
        for (key, value) in file.entries {
            if map.put(key, value).is_err() {
                return Ok(SidecarLoad::Invalid(format!(
                    "entry ({}, {}) uses a reserved value",
                    key, value
                )));
            }
        }

        Ok(SidecarLoad::Loaded(SidecarSnapshot {
            covered_records: file.covered_records,
            map,
        }))
    }

    /// Write a snapshot of `map`, covering `covered_records` records of the primary storage
    pub fn save(&self, map: &IdMultimap, covered_records: u64) -> Result<()> {
        let file = SidecarFile {
            magic: SIDECAR_MAGIC,
            version: SIDECAR_VERSION,
            covered_records,
            entries: map.entries().collect(),
        };

        let mut bytes = bincode::serialize(&file)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let tmp_path = self.tmp_path();
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            entries = file.entries.len(),
            covered_records,
            "side-car index saved"
        );
        Ok(())
    }

    /// `<file name>.tmp` next to the side-car, so side-cars sharing a stem never collide
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Delete the file if it exists
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
