//! Relocatable Blob Store Module
//!
//! Variable-size records with spare capacity, updated in place when they fit and moved
//! (leaving a forwarding pointer) when they don't.
//!
//! ## Responsibilities
//! - Capacity decided by a pluggable [`SpaceAllocationStrategy`]
//! - In-place update, move-on-overflow with redirect chains
//! - Tombstones (delete never follows redirects)
//! - Live/relocated/deleted statistics persisted in the header
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes)                                            │
//! │ version(4) status(4) allocated(4) relocated(4) deleted(4)    │
//! │ dataFormat(4) livePayload(8) liveCapacity(8) nextRecord(8)   │
//! │ reserved(16)                                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record (8-aligned, id = offset / 8 + 1)                      │
//! │ ┌──────────┬────────────┬──────────────┬───────────────────┐ │
//! │ │ cap (2)  │ length (2) │ redirect (4) │ payload[cap]      │ │
//! │ └──────────┴────────────┴──────────────┴───────────────────┘ │
//! │ length: 0..=0xFFFC live, 0xFFFF padding,                     │
//! │         0xFFFE moved, 0xFFFD deleted                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod header;
mod record;
mod store;
mod strategy;

pub use header::{BlobStats, HEADER_SIZE, STORAGE_VERSION_CURRENT};
pub use record::{
    RecordHeader, RecordState, MAX_CAPACITY, MAX_LENGTH, OFFSET_BUCKET, RECORD_HEADER_SIZE,
};
pub use store::{BlobRecoveryReport, BlobStore, MAX_REDIRECT_HOPS};
pub use strategy::{
    DataLengthPlusFixedPercentStrategy, SpaceAllocationStrategy, WriterDecidesStrategy,
};
