//! Page-boundary-avoidance allocator
//!
//! Pure function from (cursor, record size, page size) to where the record goes.
//! No file, no mapping: both the log and the blob store drive their cursors with it.

/// Where a record of a given size lands, relative to the current allocation cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Record fits on the current page: occupies `[offset, next)`
    Fits { offset: u64, next: u64 },

    /// Record doesn't fit, but a padding record does: pad `[offset, offset + padding)`
    /// and retry from `next_page`
    Pad {
        offset: u64,
        padding: usize,
        next_page: u64,
    },

    /// Not even a record header fits the page tail: jump to `next_page`, write nothing
    SkipPage { next_page: u64 },
}

impl Placement {
    /// Cursor value after this placement is applied
    pub fn next_cursor(&self) -> u64 {
        match *self {
            Placement::Fits { next, .. } => next,
            Placement::Pad { next_page, .. } | Placement::SkipPage { next_page } => next_page,
        }
    }
}

/// Decide where a record of `record_size` bytes goes if the cursor is at `current`.
///
/// `min_record` is the smallest record the caller can write (its header size): a page tail
/// shorter than that can't hold a padding record and is skipped instead.
///
/// Callers guarantee `record_size <= page_size`, so a record starting on a fresh page
/// always fits.
pub fn place(current: u64, record_size: usize, page_size: usize, min_record: usize) -> Placement {
    debug_assert!(record_size <= page_size);
    let in_page = (current % page_size as u64) as usize;
    let remaining = page_size - in_page;

    if record_size <= remaining {
        return Placement::Fits {
            offset: current,
            next: current + record_size as u64,
        };
    }

    let next_page = current + remaining as u64;
    if remaining >= min_record {
        Placement::Pad {
            offset: current,
            padding: remaining,
            next_page,
        }
    } else {
        Placement::SkipPage { next_page }
    }
}

/// Round `value` up to a multiple of `align` (power of two)
#[inline]
pub fn round_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Page index of a file offset
#[inline]
pub fn page_index(offset: u64, page_size: usize) -> u64 {
    offset / page_size as u64
}
