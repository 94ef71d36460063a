//! Paged Mapped File Module
//!
//! Leaf layer: a file that grows in fixed-size pages, each mapped into memory.
//!
//! ## Responsibilities
//! - Resolve a byte offset to (page, offset in page)
//! - Grow the file a page at a time (new bytes read as zero)
//! - Raw and atomic views over page bytes
//! - fsync / close / remove
//!
//! ## Layout
//! ```text
//! offset 0           page_size          2*page_size
//! ┌──────────────────┬──────────────────┬──────────────────┐
//! │     page 0       │     page 1       │     page 2       │ ...
//! └──────────────────┴──────────────────┴──────────────────┘
//!   page = offset / page_size, in-page offset = offset % page_size
//! ```
//! Pages carry no semantics; records living on top never cross a page boundary
//! (see [`placement`]).

mod file;
mod page;
pub mod placement;

pub use file::{PagedFile, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
pub use page::Page;
pub use placement::{place, Placement};
