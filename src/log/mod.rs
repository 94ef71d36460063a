//! Append-Only Log Module
//!
//! Variable-length records appended lock-free to a paged mapped file.
//!
//! ## Responsibilities
//! - Lock-free space allocation (CAS on the allocation cursor)
//! - Commit cursor that only passes finalized records
//! - Page-boundary avoidance through padding records
//! - Id ↔ offset mapping (`id = offset - HEADER_SIZE + 1`, 0 is NULL)
//! - Unclean-close detection and recovery
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (88 bytes, native byte order)                     │
//! │ implVersion(4) externalVersion(4) allocated(8)           │
//! │ committed(8) magic(4) pageSize(4) records(8) status(4)   │
//! │ user fields (11 × 4, owned by the client)                │
//! ├──────────────────────────────────────────────────────────┤
//! │ Record  ┌────────────┬──────────────────┐                │
//! │         │ length (4) │ payload          │  4-aligned     │
//! │         └────────────┴──────────────────┘                │
//! │ ...                                                      │
//! │ Padding ┌────────────┐  length = -(bytes to page end)    │
//! │         │ -N     (4) │                                   │
//! ├─────────┴────────────┴───────────────── page boundary ───┤
//! │ Record ...                                               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! `length > 0` data, `< 0` padding, `0` not yet finalized.

mod append_log;
mod header;
mod record;
mod recovery;

pub use append_log::AppendLog;
pub use header::{CURRENT_IMPL_VERSION, HEADER_SIZE, MAGIC, USER_HEADER_FIELDS};
pub use record::{record_size, RECORD_HEADER_SIZE};
pub use recovery::RecoveryReport;
