//! Log recovery
//!
//! Runs when a log is reopened without the safely-closed status and the policy is
//! `RecoveryPolicy::Recover`.
//!
//! ## Steps
//! 1. Walk `[committed, allocated)` and keep the run of finalized records
//! 2. Zero everything from the end of that run to the end of the file
//! 3. Move both cursors to the end of the run
//! 4. Recount data records from the start of the log

use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::paged::PagedFile;

use super::header::{LogHeader, HEADER_SIZE};
use super::record::walk_finalized;

/// What recovery found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Commit cursor stored in the header at open
    pub committed_before: u64,

    /// Allocation cursor stored in the header at open
    pub allocated_before: u64,

    /// Both cursors after recovery
    pub recovered_to: u64,

    /// Finalized records past the old commit cursor that were kept
    pub records_salvaged: u64,

    /// Allocated bytes dropped (unfinished records and everything after them)
    pub bytes_discarded: u64,

    /// Data records in the log after recovery
    pub records_count: u64,
}

pub(crate) fn recover(file: &PagedFile, header: &LogHeader) -> Result<RecoveryReport> {
    let committed_before = header.committed().load(Ordering::SeqCst).max(HEADER_SIZE as i64) as u64;
    let allocated_before = header.allocated().load(Ordering::SeqCst).max(committed_before as i64) as u64;

    let salvaged = walk_finalized(file, committed_before, allocated_before)?;
    let recovered_to = salvaged.end;

    file.zeroize_from(recovered_to)?;
    header.committed().store(recovered_to as i64, Ordering::SeqCst);
    header.allocated().store(recovered_to as i64, Ordering::SeqCst);

    let full = walk_finalized(file, HEADER_SIZE as u64, recovered_to)?;
    header
        .records_count()
        .store(full.data_records as i64, Ordering::SeqCst);

    let report = RecoveryReport {
        committed_before,
        allocated_before,
        recovered_to,
        records_salvaged: salvaged.data_records,
        bytes_discarded: allocated_before - recovered_to,
        records_count: full.data_records,
    };

    tracing::warn!(
        path = %file.path().display(),
        committed_before,
        allocated_before,
        recovered_to,
        salvaged = report.records_salvaged,
        discarded_bytes = report.bytes_discarded,
        "log was not closed properly; recovered"
    );

    Ok(report)
}
