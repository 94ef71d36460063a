//! Append-only log
//!
//! Lock-free appends over a paged mapped file. Writers claim space with a CAS on the
//! allocation cursor, fill it, and finalize the record by storing its length last.
//! The commit cursor trails behind: it only moves over finalized records, and a record
//! is readable once it is below it.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::{LogConfig, RecoveryPolicy};
use crate::error::{Result, StoreError};
use crate::paged::{place, Page, PagedFile, Placement};
use crate::record_storage::RecordStorage;

use super::header::{
    LogHeader, CURRENT_IMPL_VERSION, HEADER_SIZE, MAGIC, STATUS_CLOSED, STATUS_OPENED,
    USER_HEADER_FIELDS,
};
use super::record::{
    id_to_offset, load_length, offset_to_id, record_size, walk_finalized, RecordKind,
    RECORD_HEADER_SIZE,
};
use super::recovery::{self, RecoveryReport};

/// Append-only log of variable-length records
///
/// ## Concurrency:
/// - `append`: lock-free; any number of threads
/// - `read` / `for_each_record`: never block, see only committed records
/// - Length fields and cursors use SeqCst: a writer finalizing its record and a
///   concurrent sweeper must not both miss each other's store
pub struct AppendLog {
    file: PagedFile,
    header: LogHeader,
    page_size: usize,
    closed_properly: bool,
    recovery_report: Option<RecoveryReport>,
}

impl AppendLog {
    /// Open or create a log at `path`
    pub fn open(path: &Path, config: LogConfig) -> Result<Self> {
        let file = PagedFile::open(path, config.page_size)?;
        let header = LogHeader::map(&file)?;

        let mut closed_properly = true;
        let mut recovery_report = None;

        if header.is_blank() {
            header.initialize();
        } else {
            check_header(&header, config.page_size)?;

            if header.status() != STATUS_CLOSED {
                closed_properly = false;
                match config.recovery {
                    RecoveryPolicy::Fail => {
                        tracing::warn!(path = %path.display(), "log was not closed properly");
                        return Err(StoreError::NotClosedProperly {
                            path: path.to_path_buf(),
                        });
                    }
                    RecoveryPolicy::Recover => {
                        recovery_report = Some(recovery::recover(&file, &header)?);
                    }
                }
            }
        }

        header.set_status(STATUS_OPENED);

        tracing::info!(
            path = %path.display(),
            page_size = config.page_size,
            records = header.records_count().load(Ordering::SeqCst),
            "log opened"
        );

        Ok(Self {
            file,
            header,
            page_size: config.page_size,
            closed_properly,
            recovery_report,
        })
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append `bytes` as a new record and return its id
    ///
    /// The record may not be readable yet when this returns: an earlier record still
    /// being written holds the commit cursor back until its writer finishes.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let size = record_size(bytes.len());
        if size > self.page_size {
            return Err(StoreError::Capacity(format!(
                "record of {} bytes (payload {}) exceeds page size {}",
                size,
                bytes.len(),
                self.page_size
            )));
        }

        let offset = self.allocate(size)?;
        let (page, at) = self.slot(offset)?;
        page.write_bytes(at + RECORD_HEADER_SIZE, bytes);
        page.atomic_i32(at)
            .store((RECORD_HEADER_SIZE + bytes.len()) as i32, Ordering::SeqCst);

        self.commit_finalized()?;
        Ok(offset_to_id(offset))
    }

    /// Claim `size` bytes; pads out page tails that are too short
    fn allocate(&self, size: usize) -> Result<u64> {
        let allocated = self.header.allocated();
        loop {
            let current = allocated.load(Ordering::SeqCst) as u64;
            let placement = place(current, size, self.page_size, RECORD_HEADER_SIZE);
            if allocated
                .compare_exchange(
                    current as i64,
                    placement.next_cursor() as i64,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
            {
                continue;
            }

            match placement {
                Placement::Fits { offset, .. } => return Ok(offset),
                Placement::Pad {
                    offset, padding, ..
                } => {
                    let (page, at) = self.slot(offset)?;
                    page.atomic_i32(at).store(-(padding as i32), Ordering::SeqCst);
                    tracing::debug!(offset, padding, "padded page tail");
                }
                Placement::SkipPage { .. } => {}
            }
        }
    }

    /// Move the commit cursor over every finalized record it can reach
    fn commit_finalized(&self) -> Result<()> {
        let committed = self.header.committed();
        loop {
            let from = committed.load(Ordering::SeqCst) as u64;
            let limit = self.header.allocated().load(Ordering::SeqCst) as u64;
            let run = walk_finalized(&self.file, from, limit)?;
            if run.end == from {
                return Ok(());
            }

            if committed
                .compare_exchange(
                    from as i64,
                    run.end as i64,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                self.header
                    .records_count()
                    .fetch_add(run.data_records as i64, Ordering::SeqCst);
                return Ok(());
            }
        }
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Pass the payload of record `id` to `reader`
    pub fn read<T, F>(&self, id: u64, reader: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        let offset = id_to_offset(id)
            .ok_or_else(|| StoreError::Range(format!("id {} is not a record id", id)))?;
        let committed = self.committed_offset();
        if offset >= committed {
            return Err(StoreError::Range(format!(
                "id {} (offset {}) is not committed (commit cursor {})",
                id, offset, committed
            )));
        }

        let (page, at) = self.slot(offset)?;
        match RecordKind::from_length(page.atomic_i32(at).load(Ordering::SeqCst)) {
            RecordKind::Data { total } => {
                self.check_bounds(offset, at, total)?;
                let payload = page.bytes(at + RECORD_HEADER_SIZE, total - RECORD_HEADER_SIZE);
                Ok(reader(payload))
            }
            RecordKind::Padding { .. } => Err(StoreError::Corruption(format!(
                "id {} points to a padding record",
                id
            ))),
            RecordKind::Unwritten => Err(StoreError::Corruption(format!(
                "id {} is below the commit cursor but unwritten",
                id
            ))),
        }
    }

    /// Visit committed data records in order
    ///
    /// Returns `false` if the visitor stopped the scan.
    pub fn for_each_record<V>(&self, mut visitor: V) -> Result<bool>
    where
        V: FnMut(u64, &[u8]) -> bool,
    {
        let committed = self.committed_offset();
        let mut offset = HEADER_SIZE as u64;

        while offset < committed {
            let (page, at) = self.slot(offset)?;
            let kind = RecordKind::from_length(page.atomic_i32(at).load(Ordering::SeqCst));
            match kind {
                RecordKind::Data { total } => {
                    self.check_bounds(offset, at, total)?;
                    let payload =
                        page.bytes(at + RECORD_HEADER_SIZE, total - RECORD_HEADER_SIZE);
                    if !visitor(offset_to_id(offset), payload) {
                        return Ok(false);
                    }
                }
                RecordKind::Padding { total } => {
                    if at + total > self.page_size {
                        return Err(self.corruption(format!(
                            "padding at offset {} overruns its page ({} bytes)",
                            offset, total
                        )));
                    }
                }
                RecordKind::Unwritten => {
                    return Err(self.corruption(format!(
                        "unwritten record at offset {} below commit cursor",
                        offset
                    )));
                }
            }
            offset += kind.footprint();
        }

        Ok(true)
    }

    /// Whether `id` names a committed data record
    pub fn is_valid_id(&self, id: u64) -> bool {
        match id_to_offset(id) {
            Some(offset) if offset < self.committed_offset() => {
                matches!(
                    load_length(&self.file, offset).map(RecordKind::from_length),
                    Ok(RecordKind::Data { .. })
                )
            }
            _ => false,
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn records_count(&self) -> u64 {
        self.header.records_count().load(Ordering::SeqCst) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records_count() == 0
    }

    /// Client-owned version stamp stored in the header
    pub fn data_version(&self) -> i32 {
        self.header.external_version()
    }

    pub fn set_data_version(&self, version: i32) {
        self.header.set_external_version(version);
    }

    /// Client-owned header slot `field` (`0..USER_HEADER_FIELDS`), 0 until set
    pub fn user_header_field(&self, field: usize) -> Result<i32> {
        check_user_field(field)?;
        Ok(self.header.user_field(field).load(Ordering::Acquire))
    }

    pub fn set_user_header_field(&self, field: usize, value: i32) -> Result<()> {
        check_user_field(field)?;
        self.header.user_field(field).store(value, Ordering::Release);
        Ok(())
    }

    pub fn implementation_version(&self) -> i32 {
        self.header.impl_version()
    }

    /// `false` if this open found the log without the safely-closed status
    pub fn was_closed_properly(&self) -> bool {
        self.closed_properly
    }

    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.recovery_report.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn committed_offset(&self) -> u64 {
        self.header.committed().load(Ordering::SeqCst) as u64
    }

    pub(crate) fn allocated_offset(&self) -> u64 {
        self.header.allocated().load(Ordering::SeqCst) as u64
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Cursors live in the mapped header already; `fsync` forces pages to disk
    pub fn flush(&self, fsync: bool) -> Result<()> {
        if fsync {
            self.file.fsync()?;
        }
        Ok(())
    }

    /// Truncating a log in place isn't supported
    pub fn clear(&self) -> Result<()> {
        Err(StoreError::Unsupported("clearing an append-only log"))
    }

    /// Write the safely-closed status and release the file
    pub fn close(self) -> Result<()> {
        self.header.set_status(STATUS_CLOSED);
        tracing::info!(
            path = %self.file.path().display(),
            records = self.records_count(),
            "log closed"
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

    /// A data record's length must cover its own header and stay inside its page
    fn check_bounds(&self, offset: u64, at: usize, total: usize) -> Result<()> {
        if total < RECORD_HEADER_SIZE {
            return Err(self.corruption(format!(
                "record at offset {} has length {} below the header size",
                offset, total
            )));
        }
        if at + total > self.page_size {
            return Err(self.corruption(format!(
                "record at offset {} overruns its page ({} bytes)",
                offset, total
            )));
        }
        Ok(())
    }

    fn corruption(&self, message: String) -> StoreError {
        tracing::error!(path = %self.file.path().display(), "{}", message);
        StoreError::Corruption(message)
    }

    fn slot(&self, offset: u64) -> Result<(Arc<Page>, usize)> {
        let page = self.file.page_by_offset(offset)?;
        Ok((page, self.file.to_offset_in_page(offset)))
    }
}

fn check_user_field(field: usize) -> Result<()> {
    if field >= USER_HEADER_FIELDS {
        return Err(StoreError::InvalidArgument(format!(
            "user header field {} out of [0, {})",
            field, USER_HEADER_FIELDS
        )));
    }
    Ok(())
}

fn check_header(header: &LogHeader, page_size: usize) -> Result<()> {
    if header.magic() != MAGIC {
        return Err(StoreError::Format(format!(
            "bad magic {:#x}, expected {:#x}",
            header.magic(),
            MAGIC
        )));
    }
    if header.impl_version() != CURRENT_IMPL_VERSION {
        return Err(StoreError::Format(format!(
            "implementation version {} is not supported (current {})",
            header.impl_version(),
            CURRENT_IMPL_VERSION
        )));
    }
    if header.stored_page_size() as usize != page_size {
        return Err(StoreError::Format(format!(
            "log was created with page size {}, opened with {}",
            header.stored_page_size(),
            page_size
        )));
    }
    Ok(())
}

impl std::fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendLog")
            .field("path", &self.file.path())
            .field("page_size", &self.page_size)
            .field("committed", &self.committed_offset())
            .field("allocated", &self.allocated_offset())
            .finish()
    }
}

impl RecordStorage for AppendLog {
    fn append(&self, bytes: &[u8]) -> Result<u64> {
        AppendLog::append(self, bytes)
    }

    fn read<T, F>(&self, id: u64, reader: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        AppendLog::read(self, id, reader)
    }

    fn for_each_record<V>(&self, visitor: V) -> Result<bool>
    where
        V: FnMut(u64, &[u8]) -> bool,
    {
        AppendLog::for_each_record(self, visitor)
    }

    fn records_count(&self) -> u64 {
        AppendLog::records_count(self)
    }

    fn flush(&self, fsync: bool) -> Result<()> {
        AppendLog::flush(self, fsync)
    }

    fn close(self) -> Result<()> {
        AppendLog::close(self)
    }

    fn close_and_remove(self) -> Result<()> {
        AppendLog::close_and_remove(self)
    }
}
