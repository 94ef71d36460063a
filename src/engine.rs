//! Engine Module
//!
//! Opens the storages a VFS cache needs in one data directory and manages them together.
//!
//! ## Responsibilities
//! - Create the data directory and lay out the storage files
//! - Open the content store, the names enumerator and the attributes blob store
//! - Flush and close them as a unit

use std::fs;
use std::path::Path;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::content::ContentStore;
use crate::enumerator::DurableEnumerator;
use crate::error::{abandon_open, Result};

/// The storages behind a VFS cache
///
/// ## Concurrency Model
/// Every storage is internally synchronized, so the engine is shared by reference
/// (`&CacheEngine` / `Arc<CacheEngine>`) without an outer lock:
/// - **Contents**: stores serialized by the content store, reads lock-free
/// - **Names**: lookups under a read lock, new names under the write lock
/// - **Attributes**: per-record stripe locks
pub struct CacheEngine {
    config: Config,

    /// File contents, deduplicated by hash
    contents: ContentStore,

    /// File names interned to ids
    names: DurableEnumerator<String>,

    /// Per-file attribute records, rewritten in place
    attributes: BlobStore,
}

impl CacheEngine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const CONTENTS_FILENAME: &'static str = "contents.log";
    pub const CONTENTS_INDEX_FILENAME: &'static str = "contents.hashidx";
    pub const NAMES_FILENAME: &'static str = "names.log";
    pub const ATTRIBUTES_FILENAME: &'static str = "attributes.blob";

    /// Open or create every storage under `config.data_dir`
    ///
    /// An unclean previous shutdown is handled per `RecoveryPolicy` of each storage.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let dir = &config.data_dir;

        let contents = ContentStore::open(
            &dir.join(Self::CONTENTS_FILENAME),
            &dir.join(Self::CONTENTS_INDEX_FILENAME),
            config.content,
        )?;
        let names = match DurableEnumerator::open(&dir.join(Self::NAMES_FILENAME), config.log) {
            Ok(names) => names,
            Err(e) => return abandon_open(e, [contents.close()]),
        };
        let attributes = match BlobStore::open(&dir.join(Self::ATTRIBUTES_FILENAME), &config.blob) {
            Ok(attributes) => attributes,
            Err(e) => return abandon_open(e, [contents.close(), names.close()]),
        };

        tracing::info!(
            data_dir = %dir.display(),
            contents = contents.records_count(),
            names = names.records_count(),
            attributes = attributes.live_records_count(),
            "cache engine opened"
        );

        Ok(Self {
            config,
            contents,
            names,
            attributes,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    pub fn contents(&self) -> &ContentStore {
        &self.contents
    }

    pub fn names(&self) -> &DurableEnumerator<String> {
        &self.names
    }

    pub fn attributes(&self) -> &BlobStore {
        &self.attributes
    }

    /// Flush every storage; `fsync` forces data to disk
    pub fn flush(&self, fsync: bool) -> Result<()> {
        self.contents.flush(fsync)?;
        self.names.flush(fsync)?;
        self.attributes.flush(fsync)
    }

    /// Close every storage, marking each safely closed
    ///
    /// All three are closed even if one fails; the first error is returned.
    pub fn close(self) -> Result<()> {
        let data_dir = self.config.data_dir.clone();
        let results = [
            self.contents.close(),
            self.names.close(),
            self.attributes.close(),
        ];
        tracing::info!(data_dir = %data_dir.display(), "cache engine closed");
        results.into_iter().collect()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("data_dir", &self.config.data_dir)
            .field("contents", &self.contents)
            .field("names", &self.names)
            .field("attributes", &self.attributes)
            .finish()
    }
}
