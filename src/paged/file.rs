//! Paged mapped file
//!
//! Maps a file page by page. The file grows in whole pages: touching an offset past the
//! end extends the file (zero-filled) and maps the new page.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::MmapOptions;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::page::Page;

/// Smallest page size accepted (fits the 32-byte cursor area of any header)
pub const MIN_PAGE_SIZE: usize = 32;

/// Largest page size accepted (record lengths are i32)
pub const MAX_PAGE_SIZE: usize = 1 << 30;

/// A file accessed through fixed-size mapped pages
///
/// ## Concurrency:
/// - `pages`: RwLock over the page table, held only to look up or map a page
/// - Returned pages are `Arc`s: a page is unmapped when the last holder drops it,
///   so closing the file never invalidates an in-flight reader
pub struct PagedFile {
    path: PathBuf,
    file: File,
    page_size: usize,
    pages: RwLock<Vec<Option<Arc<Page>>>>,
}

impl PagedFile {
    /// Open or create a paged file
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        check_page_size(page_size)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            page_size,
            pages: RwLock::new(Vec::new()),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the file on disk
    pub fn actual_file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Offset within its page
    #[inline]
    pub fn to_offset_in_page(&self, offset: u64) -> usize {
        (offset % self.page_size as u64) as usize
    }

    /// Page containing `offset`, mapping (and growing the file) if needed
    pub fn page_by_offset(&self, offset: u64) -> Result<Arc<Page>> {
        let index = offset / self.page_size as u64;

        {
            let pages = self.pages.read();
            if let Some(Some(page)) = pages.get(index as usize) {
                return Ok(Arc::clone(page));
            }
        }

        let mut pages = self.pages.write();
        if let Some(Some(page)) = pages.get(index as usize) {
            return Ok(Arc::clone(page));
        }

        let page_start = index * self.page_size as u64;
        let page_end = page_start + self.page_size as u64;
        if self.actual_file_size()? < page_end {
            self.file.set_len(page_end)?;
        }

        // SAFETY: the file is opened read/write by this process only; the mapping is
        // owned by the Page and never remapped, so slices handed out stay valid while
        // the Arc<Page> lives
        let mmap = unsafe {
            MmapOptions::new()
                .offset(page_start)
                .len(self.page_size)
                .map_mut(&self.file)?
        };

        let page = Arc::new(Page::new(index, mmap));
        if pages.len() <= index as usize {
            pages.resize(index as usize + 1, None);
        }
        pages[index as usize] = Some(Arc::clone(&page));

        tracing::trace!(path = %self.path.display(), page = index, "mapped page");
        Ok(page)
    }

    /// Zero every byte from `offset` to the end of the file
    pub fn zeroize_from(&self, offset: u64) -> Result<()> {
        let file_size = self.actual_file_size()?;
        let mut current = offset;
        while current < file_size {
            let page = self.page_by_offset(current)?;
            let in_page = self.to_offset_in_page(current);
            let len = self.page_size - in_page;
            page.zero(in_page, len);
            current += len as u64;
        }
        Ok(())
    }

    /// Flush all mapped pages and file metadata to disk
    pub fn fsync(&self) -> Result<()> {
        let pages = self.pages.read();
        for page in pages.iter().flatten() {
            page.flush()?;
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Flush and release the pages
    pub fn close(self) -> Result<()> {
        self.fsync()?;
        tracing::debug!(path = %self.path.display(), "paged file closed");
        Ok(())
    }

    /// Close and delete the file
    pub fn close_and_remove(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        fs::remove_file(&path)?;
        Ok(())
    }
}

impl std::fmt::Debug for PagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn check_page_size(page_size: usize) -> Result<()> {
    if page_size < MIN_PAGE_SIZE || page_size > MAX_PAGE_SIZE || page_size % 8 != 0 {
        return Err(StoreError::InvalidArgument(format!(
            "page_size(={}) must be a multiple of 8 in [{}, {}]",
            page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
        )));
    }
    Ok(())
}
