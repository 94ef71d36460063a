//! Content-Addressable Store Module
//!
//! Stores each distinct payload once, keyed by its SHA-256.
//!
//! ## Responsibilities
//! - Deduplication by full hash, candidates found through a hash-prefix multimap
//! - zstd compression of payloads above a size threshold
//! - Integrity checks (structure, optional rehash)
//! - Side-car index persistence and rebuild
//!
//! ## Record Format
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────────────────┐
//! │ sha256 (32)  │ signed size (4)  │ payload                      │
//! │              │ LE; < 0 means    │ raw, or zstd frame when the  │
//! │              │ zstd, |size| =   │ size is negative             │
//! │              │ original length  │                              │
//! └──────────────┴──────────────────┴──────────────────────────────┘
//! ```

mod hash;
mod store;

pub use hash::{probe_key, ContentHash, HASH_SIZE, ZERO_KEY_SUBSTITUTE};
pub use store::{ContentStore, CONTENT_HEADER_SIZE};
