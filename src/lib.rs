//! # vfscache
//!
//! An embedded, persistent storage engine for a virtual-file-system cache:
//! - Append-only log over memory-mapped pages, with lock-free appends
//! - Relocatable blob store: records grow in place or move behind forwarding pointers
//! - Content-addressable store deduplicating payloads by SHA-256
//! - Durable value enumerator interning names to stable ids
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CacheEngine                            │
//! │           (one data directory, flush/close as a unit)        │
//! └──────────┬───────────────────┬──────────────────┬───────────┘
//!            │                   │                  │
//!            ▼                   ▼                  ▼
//!   ┌────────────────┐  ┌─────────────────┐  ┌─────────────┐
//!   │ ContentStore   │  │DurableEnumerator│  │  BlobStore  │
//!   │ (sha256 dedup) │  │  (interning)    │  │ (move/redir)│
//!   └───┬────────┬───┘  └───┬─────────┬───┘  └──────┬──────┘
//!       │        │          │         │             │
//!       │        ▼          │         ▼             │
//!       │  ┌────────────┐   │   ┌────────────┐      │
//!       │  │ IdMultimap │   │   │ IdMultimap │      │
//!       │  │ + side-car │   │   │ (replayed) │      │
//!       │  └────────────┘   │   └────────────┘      │
//!       ▼                   ▼                       │
//!   ┌─────────────────────────────┐                 │
//!   │         AppendLog           │                 │
//!   │  (CAS allocate + commit)    │                 │
//!   └──────────────┬──────────────┘                 │
//!                  │                                │
//!                  ▼                                ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │                 PagedFile (memmap2 pages)                │
//!   └─────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod blob;
pub mod content;
pub mod engine;
pub mod enumerator;
pub mod log;
pub mod multimap;
pub mod paged;
pub mod record_storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use blob::BlobStore;
pub use config::{Config, RecoveryPolicy};
pub use content::{ContentHash, ContentStore};
pub use engine::CacheEngine;
pub use enumerator::DurableEnumerator;
pub use error::{Result, StoreError};
pub use log::AppendLog;
pub use record_storage::RecordStorage;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of vfscache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
