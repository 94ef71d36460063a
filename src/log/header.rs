//! Log header
//!
//! The first `HEADER_SIZE` bytes of a log file. Fields are in native byte order and
//! accessed in place: the cursors and the record count are atomics over the mapping.
//! With small pages the header spans several pages; no field ever straddles two
//! (fields are naturally aligned and page sizes are multiples of 8).

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::paged::{Page, PagedFile};

/// Header size in bytes; the first record starts here
pub const HEADER_SIZE: usize = 88;

/// Layout version written by this crate
pub const CURRENT_IMPL_VERSION: i32 = 2;

/// "VLOG"
pub const MAGIC: i32 = i32::from_be_bytes(*b"VLOG");

pub(crate) const STATUS_CLOSED: i32 = 0;
pub(crate) const STATUS_OPENED: i32 = 1;

const IMPL_VERSION_OFFSET: usize = 0;
const EXTERNAL_VERSION_OFFSET: usize = 4;
const NEXT_ALLOCATED_OFFSET: usize = 8;
const NEXT_COMMITTED_OFFSET: usize = 16;
const MAGIC_OFFSET: usize = 24;
const PAGE_SIZE_OFFSET: usize = 28;
const RECORDS_COUNT_OFFSET: usize = 32;
const STATUS_OFFSET: usize = 40;
const FIRST_USER_FIELD_OFFSET: usize = STATUS_OFFSET + 4;

/// Number of client-owned i32 slots left in the header after the fixed fields
pub const USER_HEADER_FIELDS: usize = (HEADER_SIZE - FIRST_USER_FIELD_OFFSET) / 4;

/// In-place view over the mapped header
pub(crate) struct LogHeader {
    pages: Vec<Arc<Page>>,
    page_size: usize,
}

impl LogHeader {
    /// Map every page the header touches
    pub fn map(file: &PagedFile) -> Result<Self> {
        let page_size = file.page_size();
        let last_page = (HEADER_SIZE - 1) / page_size;
        let pages = (0..=last_page)
            .map(|index| file.page_by_offset((index * page_size) as u64))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pages, page_size })
    }

    fn locate(&self, offset: usize) -> (&Page, usize) {
        (&self.pages[offset / self.page_size], offset % self.page_size)
    }

    fn i32_cell(&self, offset: usize) -> &AtomicI32 {
        let (page, at) = self.locate(offset);
        page.atomic_i32(at)
    }

    fn i64_cell(&self, offset: usize) -> &AtomicI64 {
        let (page, at) = self.locate(offset);
        page.atomic_i64(at)
    }

    /// A freshly created (or zero-extended) file has no magic yet
    pub fn is_blank(&self) -> bool {
        self.magic() == 0 && self.impl_version() == 0 && self.allocated().load(Ordering::SeqCst) == 0
    }

    /// Write the initial header for an empty log
    pub fn initialize(&self) {
        self.i32_cell(IMPL_VERSION_OFFSET)
            .store(CURRENT_IMPL_VERSION, Ordering::Relaxed);
        self.i32_cell(MAGIC_OFFSET).store(MAGIC, Ordering::Relaxed);
        self.i32_cell(PAGE_SIZE_OFFSET)
            .store(self.page_size as i32, Ordering::Relaxed);
        self.records_count().store(0, Ordering::Relaxed);
        self.committed().store(HEADER_SIZE as i64, Ordering::SeqCst);
        self.allocated().store(HEADER_SIZE as i64, Ordering::SeqCst);
    }

    pub fn impl_version(&self) -> i32 {
        self.i32_cell(IMPL_VERSION_OFFSET).load(Ordering::Relaxed)
    }

    pub fn magic(&self) -> i32 {
        self.i32_cell(MAGIC_OFFSET).load(Ordering::Relaxed)
    }

    pub fn stored_page_size(&self) -> i32 {
        self.i32_cell(PAGE_SIZE_OFFSET).load(Ordering::Relaxed)
    }

    pub fn external_version(&self) -> i32 {
        self.i32_cell(EXTERNAL_VERSION_OFFSET).load(Ordering::Acquire)
    }

    pub fn set_external_version(&self, version: i32) {
        self.i32_cell(EXTERNAL_VERSION_OFFSET)
            .store(version, Ordering::Release);
    }

    pub fn status(&self) -> i32 {
        self.i32_cell(STATUS_OFFSET).load(Ordering::Acquire)
    }

    pub fn set_status(&self, status: i32) {
        self.i32_cell(STATUS_OFFSET).store(status, Ordering::Release);
    }

    /// Client-owned slot `field`; callers check it against `USER_HEADER_FIELDS`
    pub fn user_field(&self, field: usize) -> &AtomicI32 {
        debug_assert!(field < USER_HEADER_FIELDS);
        self.i32_cell(FIRST_USER_FIELD_OFFSET + field * 4)
    }

    /// Allocation cursor: first byte not yet handed to a writer
    pub fn allocated(&self) -> &AtomicI64 {
        self.i64_cell(NEXT_ALLOCATED_OFFSET)
    }

    /// Commit cursor: every record below it is finalized and visible
    pub fn committed(&self) -> &AtomicI64 {
        self.i64_cell(NEXT_COMMITTED_OFFSET)
    }

    /// Number of committed data records (padding excluded)
    pub fn records_count(&self) -> &AtomicI64 {
        self.i64_cell(RECORDS_COUNT_OFFSET)
    }
}
