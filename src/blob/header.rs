//! Blob store header (first 64 bytes of page 0)

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::paged::{Page, PagedFile};

pub const HEADER_SIZE: usize = 64;

pub const STORAGE_VERSION_CURRENT: i32 = 2;

pub(crate) const STATUS_OPENED: i32 = 0;
pub(crate) const STATUS_SAFELY_CLOSED: i32 = 1;

const VERSION_OFFSET: usize = 0;
const STATUS_OFFSET: usize = 4;
const RECORDS_ALLOCATED_OFFSET: usize = 8;
const RECORDS_RELOCATED_OFFSET: usize = 12;
const RECORDS_DELETED_OFFSET: usize = 16;
const DATA_FORMAT_VERSION_OFFSET: usize = 20;
const LIVE_PAYLOAD_OFFSET: usize = 24;
const LIVE_CAPACITY_OFFSET: usize = 32;
const NEXT_RECORD_OFFSET: usize = 40;

/// Persisted statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobStats {
    pub records_allocated: u32,
    pub records_relocated: u32,
    pub records_deleted: u32,
    pub live_payload_bytes: u64,
    pub live_capacity_bytes: u64,
}

impl BlobStats {
    /// Records neither deleted nor moved
    pub fn live_records(&self) -> u32 {
        self.records_allocated
            .saturating_sub(self.records_deleted)
            .saturating_sub(self.records_relocated)
    }
}

pub(crate) struct BlobHeader {
    page: Arc<Page>,
}

impl BlobHeader {
    pub fn map(file: &PagedFile) -> Result<Self> {
        Ok(Self {
            page: file.page_by_offset(0)?,
        })
    }

    pub fn is_blank(&self) -> bool {
        self.version() == 0 && self.next_record().load(Ordering::Acquire) == 0
    }

    pub fn initialize(&self) {
        self.page.write_i32(VERSION_OFFSET, STORAGE_VERSION_CURRENT);
        self.store_stats(&BlobStats::default());
        self.page.write_i32(DATA_FORMAT_VERSION_OFFSET, 0);
        self.next_record()
            .store(HEADER_SIZE as i64, Ordering::Release);
    }

    pub fn version(&self) -> i32 {
        self.page.read_i32(VERSION_OFFSET)
    }

    pub fn status(&self) -> i32 {
        self.page.read_i32(STATUS_OFFSET)
    }

    pub fn set_status(&self, status: i32) {
        self.page.write_i32(STATUS_OFFSET, status);
    }

    pub fn data_format_version(&self) -> i32 {
        self.page.read_i32(DATA_FORMAT_VERSION_OFFSET)
    }

    pub fn set_data_format_version(&self, version: i32) {
        self.page.write_i32(DATA_FORMAT_VERSION_OFFSET, version);
    }

    /// Offset of the next record to allocate; published after the record is written
    pub fn next_record(&self) -> &AtomicI64 {
        self.page.atomic_i64(NEXT_RECORD_OFFSET)
    }

    pub fn load_stats(&self) -> BlobStats {
        BlobStats {
            records_allocated: self.page.read_i32(RECORDS_ALLOCATED_OFFSET) as u32,
            records_relocated: self.page.read_i32(RECORDS_RELOCATED_OFFSET) as u32,
            records_deleted: self.page.read_i32(RECORDS_DELETED_OFFSET) as u32,
            live_payload_bytes: self.page.read_i64(LIVE_PAYLOAD_OFFSET) as u64,
            live_capacity_bytes: self.page.read_i64(LIVE_CAPACITY_OFFSET) as u64,
        }
    }

    pub fn store_stats(&self, stats: &BlobStats) {
        self.page
            .write_i32(RECORDS_ALLOCATED_OFFSET, stats.records_allocated as i32);
        self.page
            .write_i32(RECORDS_RELOCATED_OFFSET, stats.records_relocated as i32);
        self.page
            .write_i32(RECORDS_DELETED_OFFSET, stats.records_deleted as i32);
        self.page
            .write_i64(LIVE_PAYLOAD_OFFSET, stats.live_payload_bytes as i64);
        self.page
            .write_i64(LIVE_CAPACITY_OFFSET, stats.live_capacity_bytes as i64);
    }
}
