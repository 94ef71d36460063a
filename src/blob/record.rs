//! Blob record layout
//!
//! `{capacity:u16, length:u16, redirect_to:i32, payload[capacity]}`. The three top
//! values of the length field are state marks, not lengths.

use crate::paged::Page;

/// capacity(2) + length(2) + redirect_to(4)
pub const RECORD_HEADER_SIZE: usize = 8;

/// Addressing bucket: records start at multiples of this, ids count buckets
pub const OFFSET_BUCKET: u64 = 8;

/// Largest payload length the length field can hold (the top three values are marks)
pub const MAX_LENGTH: usize = 0xFFFF - 3;

/// Largest capacity a record gets; bucket-aligned so rounding never overflows the u16 field
pub const MAX_CAPACITY: usize = 0xFFFF & !(OFFSET_BUCKET as usize - 1);

pub(crate) const PADDING_MARK: u16 = 0xFFFF;
pub(crate) const MOVED_MARK: u16 = 0xFFFF - 1;
pub(crate) const DELETED_MARK: u16 = 0xFFFF - 2;

const CAPACITY_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = 2;
const REDIRECT_OFFSET: usize = 4;

/// What a record header says about the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Holds `length` bytes of payload
    Live { length: usize },

    /// Content was relocated to record `to`
    Moved { to: u64 },

    /// Deleted; `forward` is kept if the record had moved before it was deleted
    Deleted { forward: Option<u64> },

    /// Filler to the end of a page
    Padding,
}

impl RecordState {
    pub(crate) fn decode(length_field: u16, redirect_to: i32) -> Self {
        match length_field {
            PADDING_MARK => RecordState::Padding,
            MOVED_MARK => RecordState::Moved {
                to: redirect_to.max(0) as u64,
            },
            DELETED_MARK => RecordState::Deleted {
                forward: (redirect_to > 0).then_some(redirect_to as u64),
            },
            length => RecordState::Live {
                length: length as usize,
            },
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, RecordState::Live { .. })
    }
}

/// Header of one record, as read from its page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub capacity: usize,
    pub state: RecordState,
}

impl RecordHeader {
    pub(crate) fn read(page: &Page, at: usize) -> Self {
        let capacity = page.read_u16(at + CAPACITY_OFFSET) as usize;
        let length = page.read_u16(at + LENGTH_OFFSET);
        let redirect = page.read_i32(at + REDIRECT_OFFSET);
        Self {
            capacity,
            state: RecordState::decode(length, redirect),
        }
    }

    /// Bytes from this record's start to the next record's start
    pub fn footprint(&self) -> u64 {
        (RECORD_HEADER_SIZE + self.capacity) as u64
    }
}

pub(crate) fn write_live(page: &Page, at: usize, capacity: usize, payload: &[u8]) {
    page.write_u16(at + CAPACITY_OFFSET, capacity as u16);
    page.write_u16(at + LENGTH_OFFSET, payload.len() as u16);
    page.write_i32(at + REDIRECT_OFFSET, 0);
    page.write_bytes(at + RECORD_HEADER_SIZE, payload);
}

pub(crate) fn write_padding(page: &Page, at: usize, total: usize) {
    page.write_u16(at + CAPACITY_OFFSET, (total - RECORD_HEADER_SIZE) as u16);
    page.write_u16(at + LENGTH_OFFSET, PADDING_MARK);
    page.write_i32(at + REDIRECT_OFFSET, 0);
}

/// Overwrite the payload of a live record in place
pub(crate) fn rewrite_payload(page: &Page, at: usize, payload: &[u8]) {
    page.write_bytes(at + RECORD_HEADER_SIZE, payload);
    page.write_u16(at + LENGTH_OFFSET, payload.len() as u16);
}

pub(crate) fn mark(page: &Page, at: usize, mark: u16, redirect_to: u64) {
    page.write_i32(at + REDIRECT_OFFSET, redirect_to as i32);
    page.write_u16(at + LENGTH_OFFSET, mark);
}

pub(crate) fn payload(page: &Page, at: usize, length: usize) -> &[u8] {
    page.bytes(at + RECORD_HEADER_SIZE, length)
}

pub fn offset_to_id(offset: u64) -> u64 {
    offset / OFFSET_BUCKET + 1
}

/// `None` for 0 (NULL) and ids past the addressable range
pub fn id_to_offset(id: u64) -> Option<u64> {
    id.checked_sub(1)?.checked_mul(OFFSET_BUCKET)
}
