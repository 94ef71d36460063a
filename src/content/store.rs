//! Content-addressable store
//!
//! Deduplicates payloads by SHA-256 on top of any [`RecordStorage`]. A side-car
//! multimap from hash prefix to record ids finds candidates; full hashes stored in
//! the records confirm them.

use std::path::Path;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::ContentConfig;
use crate::error::{abandon_open, Result, StoreError};
use crate::log::AppendLog;
use crate::multimap::{IdMultimap, SidecarIndex, SidecarLoad};
use crate::record_storage::RecordStorage;

use super::hash::{probe_key, ContentHash, HASH_SIZE};

/// hash(32) + signed size(4)
pub const CONTENT_HEADER_SIZE: usize = HASH_SIZE + 4;

/// Content store over a primary storage `S` (an append-only log by default)
///
/// ## Concurrency:
/// - `store_lock`: serializes `store_record` and `rebuild_index`, so a payload is
///   never stored twice by racing callers
/// - `index`: RwLock; lookups share it, inserts and rebuilds take it exclusively
pub struct ContentStore<S: RecordStorage = AppendLog> {
    storage: S,
    index: RwLock<IdMultimap>,
    sidecar: SidecarIndex,
    store_lock: Mutex<()>,
    compression_threshold: usize,
    compression_level: i32,
}

impl ContentStore<AppendLog> {
    /// Open a content store backed by a log at `data_path`, indexed by `index_path`
    pub fn open(data_path: &Path, index_path: &Path, config: ContentConfig) -> Result<Self> {
        let log = AppendLog::open(data_path, config.log)?;
        Self::with_storage(log, index_path, config)
    }
}

impl<S: RecordStorage> ContentStore<S> {
    /// Wrap an already opened storage
    ///
    /// The side-car index is trusted only if it covers exactly the records the storage
    /// holds; otherwise it's rebuilt by a full scan.
    pub fn with_storage(storage: S, index_path: &Path, config: ContentConfig) -> Result<Self> {
        let sidecar = SidecarIndex::new(index_path);
        let records = storage.records_count();

        let loaded = match sidecar.load() {
            Ok(loaded) => loaded,
            Err(e) => return abandon_open(e, [storage.close()]),
        };
        let (index, stale_reason) = match loaded {
            SidecarLoad::Loaded(snapshot) if snapshot.covered_records == records => {
                (Some(snapshot.map), None)
            }
            SidecarLoad::Loaded(snapshot) => (
                None,
                Some(format!(
                    "covers {} records, storage has {}",
                    snapshot.covered_records, records
                )),
            ),
            SidecarLoad::Missing => (None, Some("missing".to_string())),
            SidecarLoad::Empty => (None, Some("empty".to_string())),
            SidecarLoad::Invalid(reason) => (None, Some(reason)),
        };

        let store = Self {
            storage,
            index: RwLock::new(index.unwrap_or_default()),
            sidecar,
            store_lock: Mutex::new(()),
            compression_threshold: config.compression_threshold,
            compression_level: config.compression_level,
        };

        if let Some(reason) = stale_reason {
            if records > 0 || reason != "missing" {
                tracing::warn!(
                    path = %store.sidecar.path().display(),
                    reason = %reason,
                    "side-car index unusable; rebuilding"
                );
            }
            if let Err(e) = store.rebuild_index() {
                return abandon_open(e, [store.storage.close()]);
            }
        }

        Ok(store)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Store `bytes`, or return the id of an identical payload stored before
    pub fn store_record(&self, bytes: &[u8]) -> Result<u32> {
        let hash = ContentHash::of(bytes);
        let _store = self.store_lock.lock();

        if let Some(id) = self.find(&hash)? {
            return Ok(id);
        }

        let record = self.encode(&hash, bytes)?;
        let id = self.storage.append(&record)?;
        let id = u32::try_from(id).map_err(|_| {
            StoreError::Capacity(format!("record id {} does not fit 32 bits", id))
        })?;

        self.index.write().put(hash.probe_key(), id)?;
        Ok(id)
    }

    fn encode(&self, hash: &ContentHash, bytes: &[u8]) -> Result<Vec<u8>> {
        let size = i32::try_from(bytes.len()).map_err(|_| {
            StoreError::Capacity(format!("payload of {} bytes is too large", bytes.len()))
        })?;

        let (signed_size, payload) = if bytes.len() > self.compression_threshold {
            let compressed = zstd::bulk::compress(bytes, self.compression_level)?;
            (-size, compressed)
        } else {
            (size, bytes.to_vec())
        };

        let mut record = Vec::with_capacity(CONTENT_HEADER_SIZE + payload.len());
        record.extend_from_slice(hash.as_bytes());
        record.extend_from_slice(&signed_size.to_le_bytes());
        record.extend_from_slice(&payload);
        Ok(record)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Full (decompressed) content of record `id`
    pub fn read_stream(&self, id: u32) -> Result<Bytes> {
        self.storage.read(id as u64, |record| decode(id, record))?
    }

    /// Hash stored in record `id`
    pub fn content_hash(&self, id: u32) -> Result<ContentHash> {
        self.storage.read(id as u64, |record| {
            split_record(id, record).and_then(|(hash, _, _)| ContentHash::from_slice(hash))
        })?
    }

    /// Id of the record holding content with `hash`
    pub fn find(&self, hash: &ContentHash) -> Result<Option<u32>> {
        let mut failure = None;
        let found = self.index.read().lookup(hash.probe_key(), |id| {
            let stored = self
                .storage
                .read(id as u64, |record| record.get(..HASH_SIZE) == Some(&hash.as_bytes()[..]));
            match stored {
                Ok(matches) => matches,
                Err(e) => {
                    failure = Some(e);
                    true
                }
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }

    /// Verify record `id`
    ///
    /// Structure is always checked. Unless `fast_check`, the payload is also decompressed
    /// and rehashed.
    pub fn check_record(&self, id: u32, fast_check: bool) -> Result<()> {
        let result = self.storage.read(id as u64, |record| {
            let (stored_hash, signed_size, payload) = split_record(id, record)?;
            if signed_size >= 0 && payload.len() != signed_size as usize {
                return Err(StoreError::Corruption(format!(
                    "record {}: size field {} but {} payload bytes",
                    id,
                    signed_size,
                    payload.len()
                )));
            }
            if signed_size < 0 && payload.is_empty() {
                return Err(StoreError::Corruption(format!(
                    "record {}: compressed record without payload",
                    id
                )));
            }
            if fast_check {
                return Ok(());
            }

            let content = decode(id, record)?;
            let actual = ContentHash::of(&content);
            if actual.as_bytes()[..] != stored_hash[..] {
                return Err(StoreError::Corruption(format!(
                    "record {}: content hash {} does not match stored {}",
                    id,
                    actual,
                    hex(stored_hash)
                )));
            }
            Ok(())
        })?;

        if let Err(e) = &result {
            if e.is_corruption() {
                tracing::error!(id, error = %e, "content record failed check");
            }
        }
        result
    }

    pub fn records_count(&self) -> u64 {
        self.storage.records_count()
    }

    /// Entries in the in-memory index
    pub fn index_len(&self) -> usize {
        self.index.read().len()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // =========================================================================
    // Index maintenance
    // =========================================================================

    /// Rebuild the hash index from a full scan of the storage and save it
    pub fn rebuild_index(&self) -> Result<()> {
        let _store = self.store_lock.lock();

        let covered = self.storage.records_count();
        let mut map = IdMultimap::with_capacity(covered as usize);
        let mut failure = None;

        self.storage.for_each_record(|id, record| {
            let step = match (record.get(..HASH_SIZE), u32::try_from(id)) {
                (Some(hash), Ok(id)) => {
                    let mut prefix = [0u8; HASH_SIZE];
                    prefix.copy_from_slice(hash);
                    map.put(probe_key(&prefix), id).map(|_| ())
                }
                (None, _) => Err(StoreError::Corruption(format!(
                    "record {} is shorter than a content header",
                    id
                ))),
                (_, Err(_)) => Err(StoreError::Capacity(format!(
                    "record id {} does not fit 32 bits",
                    id
                ))),
            };
            match step {
                Ok(()) => true,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e);
        }

        self.sidecar.save(&map, covered)?;
        tracing::info!(
            path = %self.sidecar.path().display(),
            entries = map.len(),
            "content index rebuilt"
        );
        *self.index.write() = map;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush the storage and save the side-car index
    pub fn flush(&self, fsync: bool) -> Result<()> {
        let _store = self.store_lock.lock();
        self.storage.flush(fsync)?;
        self.sidecar
            .save(&self.index.read(), self.storage.records_count())
    }

    pub fn close(self) -> Result<()> {
        self.flush(true)?;
        self.storage.close()
    }

    pub fn close_and_remove(self) -> Result<()> {
        self.sidecar.remove()?;
        self.storage.close_and_remove()
    }
}

impl<S: RecordStorage + std::fmt::Debug> std::fmt::Debug for ContentStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("storage", &self.storage)
            .field("sidecar", &self.sidecar.path())
            .field("compression_threshold", &self.compression_threshold)
            .finish()
    }
}

/// `(hash, signed_size, payload)`
fn split_record(id: u32, record: &[u8]) -> Result<(&[u8], i32, &[u8])> {
    if record.len() < CONTENT_HEADER_SIZE {
        return Err(StoreError::Corruption(format!(
            "record {}: {} bytes is shorter than the content header",
            id,
            record.len()
        )));
    }
    let (hash, rest) = record.split_at(HASH_SIZE);
    let (size, payload) = rest.split_at(4);
    let signed_size = i32::from_le_bytes([size[0], size[1], size[2], size[3]]);
    Ok((hash, signed_size, payload))
}

fn decode(id: u32, record: &[u8]) -> Result<Bytes> {
    let (_, signed_size, payload) = split_record(id, record)?;

    if signed_size >= 0 {
        if payload.len() != signed_size as usize {
            return Err(StoreError::Corruption(format!(
                "record {}: size field {} but {} payload bytes",
                id,
                signed_size,
                payload.len()
            )));
        }
        return Ok(Bytes::copy_from_slice(payload));
    }

    let original_size = signed_size.unsigned_abs() as usize;
    let content = zstd::bulk::decompress(payload, original_size).map_err(|e| {
        StoreError::Corruption(format!("record {}: decompression failed: {}", id, e))
    })?;
    if content.len() != original_size {
        return Err(StoreError::Corruption(format!(
            "record {}: decompressed to {} bytes, expected {}",
            id,
            content.len(),
            original_size
        )));
    }
    Ok(Bytes::from(content))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
