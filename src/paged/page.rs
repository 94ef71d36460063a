//! Mapped page
//!
//! One fixed-size window of a paged file, mapped on its own. A page is never remapped,
//! so references into it stay valid for as long as the `Arc<Page>` is held.
//!
//! ## Concurrency contract
//! Raw accessors (`bytes`, `write_bytes`, `read_*`, `write_*`) don't synchronize.
//! Callers own the protocol that keeps concurrent accesses to one region apart:
//! the log publishes records through atomic length fields, the blob store through
//! stripe locks and its allocation mutex.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicI64};

use memmap2::MmapMut;

pub struct Page {
    index: u64,
    ptr: *mut u8,
    len: usize,
    mmap: MmapMut,
}

// SAFETY: the page owns its mapping; concurrent access to the bytes follows the
// contract in the module docs, and atomics are used where regions are shared.
unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Page {
    pub(crate) fn new(index: u64, mut mmap: MmapMut) -> Self {
        let ptr = mmap.as_mut_ptr();
        let len = mmap.len();
        Self {
            index,
            ptr,
            len,
            mmap,
        }
    }

    /// Index of the page within its file
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Page length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flush this page's dirty bytes to disk (msync)
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    #[inline]
    fn check(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "page[{}]: region [{}, +{}) out of bounds (len {})",
            self.index,
            offset,
            len,
            self.len
        );
    }

    // =========================================================================
    // Atomic views
    // =========================================================================

    pub(crate) fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.check(offset, 4);
        assert_eq!(offset % 4, 0, "unaligned i32 at {}", offset);
        // SAFETY: in bounds, 4-aligned (mapping base is OS-page aligned, page offsets
        // are multiples of 8), and lives as long as &self
        unsafe { &*(self.ptr.add(offset) as *const AtomicI32) }
    }

    pub(crate) fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        self.check(offset, 8);
        assert_eq!(offset % 8, 0, "unaligned i64 at {}", offset);
        // SAFETY: as above, 8-aligned
        unsafe { &*(self.ptr.add(offset) as *const AtomicI64) }
    }

    // =========================================================================
    // Raw byte access
    // =========================================================================

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check(offset, len);
        // SAFETY: in bounds; see concurrency contract
        unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) }
    }

    pub(crate) fn write_bytes(&self, offset: usize, src: &[u8]) {
        self.check(offset, src.len());
        // SAFETY: in bounds; src can't overlap the mapping mutably
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len()) }
    }

    pub(crate) fn zero(&self, offset: usize, len: usize) {
        self.check(offset, len);
        // SAFETY: in bounds
        unsafe { ptr::write_bytes(self.ptr.add(offset), 0, len) }
    }

    pub(crate) fn read_u16(&self, offset: usize) -> u16 {
        self.check(offset, 2);
        // SAFETY: in bounds, unaligned read
        unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const u16) }
    }

    pub(crate) fn write_u16(&self, offset: usize, value: u16) {
        self.check(offset, 2);
        // SAFETY: in bounds, unaligned write
        unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut u16, value) }
    }

    pub(crate) fn read_i32(&self, offset: usize) -> i32 {
        self.check(offset, 4);
        // SAFETY: in bounds, unaligned read
        unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const i32) }
    }

    pub(crate) fn write_i32(&self, offset: usize, value: i32) {
        self.check(offset, 4);
        // SAFETY: in bounds, unaligned write
        unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut i32, value) }
    }

    pub(crate) fn read_i64(&self, offset: usize) -> i64 {
        self.check(offset, 8);
        // SAFETY: in bounds, unaligned read
        unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const i64) }
    }

    pub(crate) fn write_i64(&self, offset: usize, value: i64) {
        self.check(offset, 8);
        // SAFETY: in bounds, unaligned write
        unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut i64, value) }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("len", &self.len)
            .finish()
    }
}
