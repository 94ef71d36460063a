//! Relocatable blob store
//!
//! Records have a capacity fixed at allocation. A write that still fits is done in place;
//! one that doesn't moves the content to a new record and leaves a forwarding pointer
//! behind, so old ids keep resolving.

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::{Mutex, RwLock};

use crate::config::{BlobConfig, RecoveryPolicy};
use crate::error::{Result, StoreError};
use crate::paged::placement::round_up;
use crate::paged::{place, Page, PagedFile, Placement};
use crate::record_storage::RecordStorage;

use super::header::{
    BlobHeader, BlobStats, HEADER_SIZE, STATUS_OPENED, STATUS_SAFELY_CLOSED,
    STORAGE_VERSION_CURRENT,
};
use super::record::{
    self, id_to_offset, offset_to_id, RecordHeader, RecordState, DELETED_MARK, MAX_CAPACITY,
    MOVED_MARK, OFFSET_BUCKET, RECORD_HEADER_SIZE,
};
use super::strategy::SpaceAllocationStrategy;

const STRIPES: usize = 16;
const STRIPE_MASK: u64 = STRIPES as u64 - 1;

/// Redirect chains longer than this are treated as corrupted
pub const MAX_REDIRECT_HOPS: usize = 1024;

/// Statistics before and after an unclean-open recount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRecoveryReport {
    pub stats_before: BlobStats,
    pub stats_after: BlobStats,
}

/// Blob store over a paged mapped file
///
/// ## Concurrency:
/// - `allocation`: Mutex held while a new record is placed and written; the next-record
///   offset is published (Release) only once the record is complete
/// - `stripes`: 16 RwLocks keyed by `id & 15`; reads take the read side, updates and
///   deletes the write side of the record's stripe
/// - Lock order is stripe, then allocation (relocation holds the old record's stripe
///   while allocating the new one)
pub struct BlobStore {
    file: PagedFile,
    header: BlobHeader,
    page_size: usize,
    strategy: Arc<dyn SpaceAllocationStrategy>,

    allocation: Mutex<()>,
    stripes: Vec<CachePadded<RwLock<()>>>,

    records_allocated: AtomicU32,
    records_relocated: AtomicU32,
    records_deleted: AtomicU32,
    live_payload_bytes: AtomicI64,
    live_capacity_bytes: AtomicI64,

    closed_properly: bool,
    recovery_report: Option<BlobRecoveryReport>,
}

impl BlobStore {
    /// Open or create a blob store at `path`
    pub fn open(path: &Path, config: &BlobConfig) -> Result<Self> {
        if config.page_size < HEADER_SIZE {
            return Err(StoreError::InvalidArgument(format!(
                "page_size(={}) must hold the {}-byte header",
                config.page_size, HEADER_SIZE
            )));
        }

        let file = PagedFile::open(path, config.page_size)?;
        let header = BlobHeader::map(&file)?;

        let mut closed_properly = true;
        let mut recovery_report = None;

        if header.is_blank() {
            header.initialize();
        } else {
            if header.version() != STORAGE_VERSION_CURRENT {
                return Err(StoreError::Format(format!(
                    "blob store version {} is not supported (current {})",
                    header.version(),
                    STORAGE_VERSION_CURRENT
                )));
            }
            let next = header.next_record().load(Ordering::Acquire);
            if next < HEADER_SIZE as i64 || next as u64 % OFFSET_BUCKET != 0 {
                return Err(StoreError::Format(format!(
                    "next record offset {} is invalid",
                    next
                )));
            }

            if header.status() != STATUS_SAFELY_CLOSED {
                closed_properly = false;
                match config.recovery {
                    RecoveryPolicy::Fail => {
                        tracing::warn!(path = %path.display(), "blob store was not closed properly");
                        return Err(StoreError::NotClosedProperly {
                            path: path.to_path_buf(),
                        });
                    }
                    RecoveryPolicy::Recover => {
                        let stats_before = header.load_stats();
                        let stats_after = recount(&file, next as u64)?;
                        header.store_stats(&stats_after);
                        tracing::warn!(
                            path = %path.display(),
                            ?stats_before,
                            ?stats_after,
                            "blob store was not closed properly; statistics recounted"
                        );
                        recovery_report = Some(BlobRecoveryReport {
                            stats_before,
                            stats_after,
                        });
                    }
                }
            }
        }

        header.set_status(STATUS_OPENED);
        let stats = header.load_stats();

        tracing::info!(
            path = %path.display(),
            page_size = config.page_size,
            live_records = stats.live_records(),
            "blob store opened"
        );

        Ok(Self {
            file,
            header,
            page_size: config.page_size,
            strategy: Arc::clone(&config.strategy),
            allocation: Mutex::new(()),
            stripes: (0..STRIPES)
                .map(|_| CachePadded::new(RwLock::new(())))
                .collect(),
            records_allocated: AtomicU32::new(stats.records_allocated),
            records_relocated: AtomicU32::new(stats.records_relocated),
            records_deleted: AtomicU32::new(stats.records_deleted),
            live_payload_bytes: AtomicI64::new(stats.live_payload_bytes as i64),
            live_capacity_bytes: AtomicI64::new(stats.live_capacity_bytes as i64),
            closed_properly,
            recovery_report,
        })
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Allocate a new record filled by `writer`
    ///
    /// The writer gets an empty buffer pre-sized to the strategy's default capacity.
    pub fn write_new_record<W>(&self, writer: W) -> Result<u64>
    where
        W: FnOnce(&mut Vec<u8>),
    {
        let mut buffer = Vec::with_capacity(self.strategy.default_capacity());
        writer(&mut buffer);
        let capacity = self.capacity_for(&buffer)?;
        self.allocate_record(&buffer, capacity)
    }

    /// Rewrite the record `id` resolves to
    ///
    /// The writer gets the current payload and edits it. Returns the id now holding the
    /// content: the resolved id if it still fits, a new id if the record had to move.
    pub fn write_to_record<W>(&self, id: u64, writer: W) -> Result<u64>
    where
        W: FnOnce(&mut Vec<u8>),
    {
        let mut current = id;
        for hop in 0..MAX_REDIRECT_HOPS {
            let (page, at) = self.record_slot(current)?;
            let _guard = self.stripe(current).write();
            let header = RecordHeader::read(&page, at);

            let length = match header.state {
                RecordState::Live { length } => length,
                state => {
                    current = self.next_hop(id, current, hop, state)?;
                    continue;
                }
            };

            let mut buffer =
                Vec::with_capacity(header.capacity.max(self.strategy.default_capacity()));
            buffer.extend_from_slice(record::payload(&page, at, length));
            writer(&mut buffer);

            if buffer.len() <= header.capacity {
                record::rewrite_payload(&page, at, &buffer);
                self.live_payload_bytes
                    .fetch_add(buffer.len() as i64 - length as i64, Ordering::Relaxed);
                return Ok(current);
            }

            let capacity = self.capacity_for(&buffer)?;
            let new_id = self.allocate_record(&buffer, capacity)?;
            record::mark(&page, at, MOVED_MARK, new_id);

            self.records_relocated.fetch_add(1, Ordering::Relaxed);
            self.live_payload_bytes
                .fetch_sub(length as i64, Ordering::Relaxed);
            self.live_capacity_bytes
                .fetch_sub(header.capacity as i64, Ordering::Relaxed);

            tracing::debug!(from = current, to = new_id, length = buffer.len(), "record relocated");
            return Ok(new_id);
        }

        Err(self.chain_too_long(id))
    }

    /// Delete record `id` itself; redirects are not followed
    ///
    /// A moved record keeps its forwarding pointer, so older ids chained through it
    /// still resolve.
    pub fn delete_record(&self, id: u64) -> Result<()> {
        let (page, at) = self.record_slot(id)?;
        let _guard = self.stripe(id).write();
        let header = RecordHeader::read(&page, at);

        match header.state {
            RecordState::Live { length } => {
                record::mark(&page, at, DELETED_MARK, 0);
                self.records_deleted.fetch_add(1, Ordering::Relaxed);
                self.live_payload_bytes
                    .fetch_sub(length as i64, Ordering::Relaxed);
                self.live_capacity_bytes
                    .fetch_sub(header.capacity as i64, Ordering::Relaxed);
                Ok(())
            }
            RecordState::Moved { to } => {
                record::mark(&page, at, DELETED_MARK, to);
                self.records_relocated.fetch_sub(1, Ordering::Relaxed);
                self.records_deleted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            RecordState::Deleted { .. } => Err(StoreError::IllegalState(format!(
                "record {} is already deleted",
                id
            ))),
            RecordState::Padding => Err(StoreError::IllegalState(format!(
                "id {} is a padding record",
                id
            ))),
        }
    }

    /// Capacity for `payload`, as the strategy advises
    fn capacity_for(&self, payload: &Vec<u8>) -> Result<usize> {
        let length = payload.len();
        let max = self.max_payload_supported();
        if length > max {
            return Err(StoreError::Capacity(format!(
                "payload of {} bytes exceeds the maximum of {}",
                length, max
            )));
        }

        let capacity = self.strategy.capacity(length, payload.capacity());
        if capacity < length {
            return Err(StoreError::Capacity(format!(
                "{:?} returned capacity {} < length {}",
                self.strategy, capacity, length
            )));
        }
        Ok(capacity.min(max))
    }

    /// Place and write a new live record; returns its id
    fn allocate_record(&self, payload: &[u8], capacity: usize) -> Result<u64> {
        let _allocation = self.allocation.lock();

        let size = round_up((RECORD_HEADER_SIZE + capacity) as u64, OFFSET_BUCKET) as usize;
        if size > self.page_size {
            return Err(StoreError::Capacity(format!(
                "record of {} bytes exceeds page size {}",
                size, self.page_size
            )));
        }

        let next = self.header.next_record();
        loop {
            let current = next.load(Ordering::Acquire) as u64;
            match place(current, size, self.page_size, RECORD_HEADER_SIZE) {
                Placement::Fits { offset, .. } => {
                    let id = offset_to_id(offset);
                    if id > i32::MAX as u64 {
                        return Err(StoreError::Capacity(
                            "blob store id space exhausted".to_string(),
                        ));
                    }

                    // size and page size are multiples of OFFSET_BUCKET, so any tail
                    // left on the page can hold at least a record header
                    let (page, at) = self.slot(offset)?;
                    let actual_capacity = size - RECORD_HEADER_SIZE;

                    record::write_live(&page, at, actual_capacity, payload);
                    next.store((offset + size as u64) as i64, Ordering::Release);

                    self.records_allocated.fetch_add(1, Ordering::Relaxed);
                    self.live_payload_bytes
                        .fetch_add(payload.len() as i64, Ordering::Relaxed);
                    self.live_capacity_bytes
                        .fetch_add(actual_capacity as i64, Ordering::Relaxed);
                    return Ok(id);
                }
                Placement::Pad {
                    offset,
                    padding,
                    next_page,
                } => {
                    let (page, at) = self.slot(offset)?;
                    record::write_padding(&page, at, padding);
                    next.store(next_page as i64, Ordering::Release);
                    tracing::debug!(offset, padding, "padded page tail");
                }
                Placement::SkipPage { next_page } => {
                    next.store(next_page as i64, Ordering::Release);
                }
            }
        }
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Pass the payload of the record `id` resolves to to `reader`
    pub fn read_record<T, F>(&self, id: u64, reader: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        self.with_live_record(id, |_, payload| reader(payload))
    }

    /// Id of the live record `id` currently resolves to
    pub fn resolve_id(&self, id: u64) -> Result<u64> {
        self.with_live_record(id, |live_id, _| live_id)
    }

    /// Whether `id` resolves to a live record
    pub fn has_record(&self, id: u64) -> Result<bool> {
        if id == 0 {
            return Ok(false);
        }
        match self.resolve_id(id) {
            Ok(_) => Ok(true),
            Err(StoreError::Deleted(_)) | Err(StoreError::Range(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn with_live_record<T, F>(&self, id: u64, f: F) -> Result<T>
    where
        F: FnOnce(u64, &[u8]) -> T,
    {
        let mut current = id;
        for hop in 0..MAX_REDIRECT_HOPS {
            let (page, at) = self.record_slot(current)?;
            let _guard = self.stripe(current).read();
            let header = RecordHeader::read(&page, at);

            match header.state {
                RecordState::Live { length } => {
                    if length > header.capacity {
                        return Err(self.corruption(format!(
                            "record {}: length {} > capacity {}",
                            current, length, header.capacity
                        )));
                    }
                    return Ok(f(current, record::payload(&page, at, length)));
                }
                state => current = self.next_hop(id, current, hop, state)?,
            }
        }

        Err(self.chain_too_long(id))
    }

    /// Visit every record: live, moved, deleted and padding
    ///
    /// Non-live records get an empty payload. Returns `false` if the processor stopped
    /// the scan.
    pub fn for_each<P>(&self, mut processor: P) -> Result<bool>
    where
        P: FnMut(u64, RecordHeader, &[u8]) -> bool,
    {
        let end = self.header.next_record().load(Ordering::Acquire) as u64;
        let mut offset = HEADER_SIZE as u64;

        while offset < end {
            let id = offset_to_id(offset);
            let (page, at) = self.slot(offset)?;
            let _guard = self.stripe(id).read();
            let header = RecordHeader::read(&page, at);
            check_record_fits(offset, at, &header, self.page_size)
                .map_err(|message| self.corruption(message))?;

            let payload = match header.state {
                RecordState::Live { length } => record::payload(&page, at, length),
                _ => &[],
            };
            if !processor(id, header, payload) {
                return Ok(false);
            }
            offset = next_record_start(offset + header.footprint(), self.page_size);
        }

        Ok(true)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn stats(&self) -> BlobStats {
        BlobStats {
            records_allocated: self.records_allocated.load(Ordering::Relaxed),
            records_relocated: self.records_relocated.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
            live_payload_bytes: self.live_payload_bytes.load(Ordering::Relaxed).max(0) as u64,
            live_capacity_bytes: self.live_capacity_bytes.load(Ordering::Relaxed).max(0) as u64,
        }
    }

    pub fn live_records_count(&self) -> u64 {
        self.stats().live_records() as u64
    }

    pub fn records_allocated(&self) -> u32 {
        self.records_allocated.load(Ordering::Relaxed)
    }

    pub fn records_relocated(&self) -> u32 {
        self.records_relocated.load(Ordering::Relaxed)
    }

    pub fn records_deleted(&self) -> u32 {
        self.records_deleted.load(Ordering::Relaxed)
    }

    /// Client-owned version of the data format
    pub fn data_format_version(&self) -> i32 {
        self.header.data_format_version()
    }

    pub fn set_data_format_version(&self, version: i32) {
        self.header.set_data_format_version(version);
    }

    /// Largest payload a single record can hold with this page size
    pub fn max_payload_supported(&self) -> usize {
        MAX_CAPACITY.min(self.page_size - RECORD_HEADER_SIZE)
    }

    pub fn was_closed_properly(&self) -> bool {
        self.closed_properly
    }

    pub fn recovery_report(&self) -> Option<&BlobRecoveryReport> {
        self.recovery_report.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write statistics to the header; `fsync` forces pages to disk
    pub fn flush(&self, fsync: bool) -> Result<()> {
        self.header.store_stats(&self.stats());
        if fsync {
            self.file.fsync()?;
        }
        Ok(())
    }

    /// Reclaiming space of deleted and moved records isn't supported
    pub fn compact(&self) -> Result<()> {
        Err(StoreError::Unsupported("blob store compaction"))
    }

    pub fn close(self) -> Result<()> {
        let stats = self.stats();
        self.header.store_stats(&stats);
        self.header.set_status(STATUS_SAFELY_CLOSED);
        tracing::info!(
            path = %self.file.path().display(),
            live_records = stats.live_records(),
            "blob store closed"
        );
        let Self { file, header, .. } = self;
        drop(header);
        file.close()
    }

    pub fn close_and_remove(self) -> Result<()> {
        let Self { file, header, .. } = self;
        drop(header);
        file.close_and_remove()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn stripe(&self, id: u64) -> &RwLock<()> {
        &self.stripes[(id & STRIPE_MASK) as usize]
    }

    fn slot(&self, offset: u64) -> Result<(Arc<Page>, usize)> {
        let page = self.file.page_by_offset(offset)?;
        Ok((page, self.file.to_offset_in_page(offset)))
    }

    /// Slot of an allocated record id; Range for ids outside the allocated area
    fn record_slot(&self, id: u64) -> Result<(Arc<Page>, usize)> {
        let end = self.header.next_record().load(Ordering::Acquire) as u64;
        let offset = id_to_offset(id)
            .ok_or_else(|| StoreError::Range(format!("id {} is not a record id", id)))?;
        if offset < HEADER_SIZE as u64 || offset >= end {
            return Err(StoreError::Range(format!(
                "id {} is outside the allocated records",
                id
            )));
        }
        self.slot(offset)
    }

    /// Next id while resolving `id`, coming from non-live record `current`
    fn next_hop(&self, id: u64, current: u64, hop: usize, state: RecordState) -> Result<u64> {
        let next = match state {
            RecordState::Moved { to } => to,
            // a forwarder deleted after it moved: only passable mid-chain
            RecordState::Deleted { forward: Some(to) } if hop > 0 => to,
            RecordState::Deleted { .. } => return Err(StoreError::Deleted(id)),
            RecordState::Padding => {
                return Err(self.corruption(format!("id {} points to a padding record", current)))
            }
            RecordState::Live { .. } => current,
        };

        if next <= current {
            return Err(self.corruption(format!(
                "record {} redirects backwards to {}",
                current, next
            )));
        }
        Ok(next)
    }

    fn chain_too_long(&self, id: u64) -> StoreError {
        self.corruption(format!(
            "redirect chain from {} is longer than {} hops",
            id, MAX_REDIRECT_HOPS
        ))
    }

    fn corruption(&self, message: String) -> StoreError {
        tracing::error!(path = %self.file.path().display(), "{}", message);
        StoreError::Corruption(message)
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("path", &self.file.path())
            .field("page_size", &self.page_size)
            .field("strategy", &self.strategy)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Records never straddle pages; a page tail too short for a header is skipped
fn next_record_start(offset: u64, page_size: usize) -> u64 {
    let in_page = (offset % page_size as u64) as usize;
    if page_size - in_page < RECORD_HEADER_SIZE {
        offset + (page_size - in_page) as u64
    } else {
        offset
    }
}

fn check_record_fits(
    offset: u64,
    at: usize,
    header: &RecordHeader,
    page_size: usize,
) -> std::result::Result<(), String> {
    if at + header.footprint() as usize > page_size {
        return Err(format!(
            "record at offset {} (capacity {}) crosses its page",
            offset, header.capacity
        ));
    }
    if let RecordState::Live { length } = header.state {
        if length > header.capacity {
            return Err(format!(
                "record at offset {}: length {} > capacity {}",
                offset, length, header.capacity
            ));
        }
    }
    Ok(())
}

/// Rebuild statistics by scanning `[HEADER_SIZE, end)`
fn recount(file: &PagedFile, end: u64) -> Result<BlobStats> {
    let page_size = file.page_size();
    let mut stats = BlobStats::default();
    let mut offset = HEADER_SIZE as u64;

    while offset < end {
        let page = file.page_by_offset(offset)?;
        let at = file.to_offset_in_page(offset);
        let header = RecordHeader::read(&page, at);
        check_record_fits(offset, at, &header, page_size).map_err(StoreError::Corruption)?;

        match header.state {
            RecordState::Live { length } => {
                stats.records_allocated += 1;
                stats.live_payload_bytes += length as u64;
                stats.live_capacity_bytes += header.capacity as u64;
            }
            RecordState::Moved { .. } => {
                stats.records_allocated += 1;
                stats.records_relocated += 1;
            }
            RecordState::Deleted { .. } => {
                stats.records_allocated += 1;
                stats.records_deleted += 1;
            }
            RecordState::Padding => {}
        }
        offset = next_record_start(offset + header.footprint(), page_size);
    }

    Ok(stats)
}

impl RecordStorage for BlobStore {
    fn append(&self, bytes: &[u8]) -> Result<u64> {
        self.write_new_record(|buffer| buffer.extend_from_slice(bytes))
    }

    fn read<T, F>(&self, id: u64, reader: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        self.read_record(id, reader)
    }

    fn for_each_record<V>(&self, mut visitor: V) -> Result<bool>
    where
        V: FnMut(u64, &[u8]) -> bool,
    {
        self.for_each(|id, header, payload| !header.state.is_live() || visitor(id, payload))
    }

    fn records_count(&self) -> u64 {
        self.live_records_count()
    }

    fn flush(&self, fsync: bool) -> Result<()> {
        BlobStore::flush(self, fsync)
    }

    fn close(self) -> Result<()> {
        BlobStore::close(self)
    }

    fn close_and_remove(self) -> Result<()> {
        BlobStore::close_and_remove(self)
    }
}
