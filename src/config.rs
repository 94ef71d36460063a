//! Configuration for vfscache
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::sync::Arc;

use crate::blob::{DataLengthPlusFixedPercentStrategy, SpaceAllocationStrategy};

/// Default page size for mapped files (4 MB)
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024 * 1024;

/// Payloads larger than this are compressed by the content store
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 8 * 1024;

/// Main configuration for a vfscache instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── contents.log       (content records)
    ///     ├── contents.hashidx   (side-car hash index, rebuildable)
    ///     ├── names.log          (enumerated names)
    ///     └── attributes.blob    (relocatable attribute records)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Per-Storage Configuration
    // -------------------------------------------------------------------------
    /// Append-only log used by the names enumerator
    pub log: LogConfig,

    /// Blob store used for attributes
    pub blob: BlobConfig,

    /// Content-addressable store
    pub content: ContentConfig,
}

/// What to do when a storage is opened without the "safely closed" status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Refuse to open (`StoreError::NotClosedProperly`)
    #[default]
    Fail,

    /// Open anyway: drop unfinished records, recount statistics, report it
    Recover,
}

/// Append-only log configuration
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Page size in bytes; a record (with its 4-byte header) must fit in one page
    pub page_size: usize,

    /// Behavior on unclean reopen
    pub recovery: RecoveryPolicy,
}

/// Blob store configuration
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Page size in bytes; a record (with its 8-byte header) must fit in one page
    pub page_size: usize,

    /// Behavior on unclean reopen
    pub recovery: RecoveryPolicy,

    /// How much capacity to reserve for a record, given its length
    pub strategy: Arc<dyn SpaceAllocationStrategy>,
}

/// Content-addressable store configuration
#[derive(Debug, Clone, Copy)]
pub struct ContentConfig {
    /// Log holding the content records
    pub log: LogConfig,

    /// Payloads longer than this are stored zstd-compressed
    pub compression_threshold: usize,

    /// zstd compression level
    pub compression_level: i32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            recovery: RecoveryPolicy::Fail,
        }
    }
}

impl LogConfig {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            recovery: RecoveryPolicy::Fail,
            strategy: Arc::new(DataLengthPlusFixedPercentStrategy::default()),
        }
    }
}

impl BlobConfig {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn strategy(mut self, strategy: impl SpaceAllocationStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_level: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./vfscache_data"),
            log: LogConfig::default(),
            blob: BlobConfig::default(),
            content: ContentConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the page size for every mapped file
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.log.page_size = page_size;
        self.config.blob.page_size = page_size;
        self.config.content.log.page_size = page_size;
        self
    }

    /// Set the unclean-reopen policy for every storage
    pub fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.config.log.recovery = recovery;
        self.config.blob.recovery = recovery;
        self.config.content.log.recovery = recovery;
        self
    }

    /// Set the blob store allocation strategy
    pub fn blob_strategy(mut self, strategy: impl SpaceAllocationStrategy + 'static) -> Self {
        self.config.blob.strategy = Arc::new(strategy);
        self
    }

    /// Set the content compression threshold (in bytes)
    pub fn compression_threshold(mut self, threshold: usize) -> Self {
        self.config.content.compression_threshold = threshold;
        self
    }

    /// Set the zstd compression level
    pub fn compression_level(mut self, level: i32) -> Self {
        self.config.content.compression_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
