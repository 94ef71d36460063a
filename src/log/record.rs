//! Log record layout
//!
//! `{length:i32, payload}`; the record occupies `round_up_4(|length|)` bytes.

use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::paged::placement::round_up;
use crate::paged::PagedFile;

use super::header::HEADER_SIZE;

/// Size of the length field preceding each payload
pub const RECORD_HEADER_SIZE: usize = 4;

/// Record start alignment
pub const RECORD_ALIGNMENT: u64 = 4;

/// Decoded length field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Not written yet (or not finalized)
    Unwritten,

    /// Data record; `total` counts the header and the payload
    Data { total: usize },

    /// Filler up to the end of a page
    Padding { total: usize },
}

impl RecordKind {
    pub fn from_length(length: i32) -> Self {
        match length {
            0 => RecordKind::Unwritten,
            len if len > 0 => RecordKind::Data {
                total: len as usize,
            },
            len => RecordKind::Padding {
                total: len.unsigned_abs() as usize,
            },
        }
    }

    /// Bytes from this record's start to the next record's start
    pub fn footprint(&self) -> u64 {
        match *self {
            RecordKind::Unwritten => 0,
            RecordKind::Data { total } | RecordKind::Padding { total } => {
                round_up(total as u64, RECORD_ALIGNMENT)
            }
        }
    }
}

/// Bytes a payload of `payload_len` takes up, header and alignment included
pub fn record_size(payload_len: usize) -> usize {
    round_up((RECORD_HEADER_SIZE + payload_len) as u64, RECORD_ALIGNMENT) as usize
}

pub fn offset_to_id(offset: u64) -> u64 {
    offset - HEADER_SIZE as u64 + 1
}

/// `None` for 0 (NULL) and for ids that can't be a record start
pub fn id_to_offset(id: u64) -> Option<u64> {
    if id == 0 {
        return None;
    }
    let offset = (id - 1).checked_add(HEADER_SIZE as u64)?;
    if offset % RECORD_ALIGNMENT != 0 {
        return None;
    }
    Some(offset)
}

/// Length field of the record at `offset`
pub(crate) fn load_length(file: &PagedFile, offset: u64) -> Result<i32> {
    let page = file.page_by_offset(offset)?;
    Ok(page
        .atomic_i32(file.to_offset_in_page(offset))
        .load(Ordering::SeqCst))
}

/// Outcome of walking finalized records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FinalizedRun {
    /// First offset past the run
    pub end: u64,

    /// Data records inside the run
    pub data_records: u64,
}

/// Walk forward from `from` over finalized records, never past `limit`.
///
/// Stops at the first unwritten record, or at a length that would run past `limit`
/// or across a page boundary.
pub(crate) fn walk_finalized(file: &PagedFile, from: u64, limit: u64) -> Result<FinalizedRun> {
    let page_size = file.page_size() as u64;
    let mut cursor = from;
    let mut data_records = 0;

    while cursor < limit {
        let kind = RecordKind::from_length(load_length(file, cursor)?);
        let footprint = kind.footprint();
        if footprint == 0 {
            break;
        }

        let next = cursor + footprint;
        let page_end = (cursor / page_size + 1) * page_size;
        if next > limit || next > page_end {
            break;
        }

        if matches!(kind, RecordKind::Data { .. }) {
            data_records += 1;
        }
        cursor = next;
    }

    Ok(FinalizedRun {
        end: cursor,
        data_records,
    })
}
