//! Tests for the paged mapped file and the placement allocator
//!
//! These tests verify:
//! - Placement decisions (fits, pad, skip page)
//! - File growth one page at a time
//! - Page size validation
//! - Close and remove

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use vfscache::paged::placement::{page_index, round_up};
use vfscache::paged::{place, PagedFile, Placement, MIN_PAGE_SIZE};
use vfscache::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.paged");
    (temp_dir, path)
}

// =============================================================================
// Placement Tests
// =============================================================================

#[test]
fn test_place_fits_on_current_page() {
    let placement = place(88, 8, 64, 4);
    assert_eq!(placement, Placement::Fits { offset: 88, next: 96 });
    assert_eq!(placement.next_cursor(), 96);
}

#[test]
fn test_place_fills_page_exactly() {
    let placement = place(112, 16, 64, 4);
    assert_eq!(placement, Placement::Fits { offset: 112, next: 128 });
}

#[test]
fn test_place_pads_short_tail() {
    // 16 bytes left on the page, record needs 24
    let placement = place(112, 24, 64, 4);
    assert_eq!(
        placement,
        Placement::Pad {
            offset: 112,
            padding: 16,
            next_page: 128
        }
    );
    assert_eq!(placement.next_cursor(), 128);
}

#[test]
fn test_place_skips_tail_shorter_than_header() {
    // 4 bytes left, the smallest record is 8
    let placement = place(124, 16, 64, 8);
    assert_eq!(placement, Placement::SkipPage { next_page: 128 });
}

#[test]
fn test_place_full_page_record_at_page_start() {
    let placement = place(128, 64, 64, 4);
    assert_eq!(placement, Placement::Fits { offset: 128, next: 192 });
}

#[test]
fn test_round_up_and_page_index() {
    assert_eq!(round_up(0, 8), 0);
    assert_eq!(round_up(5, 4), 8);
    assert_eq!(round_up(8, 8), 8);
    assert_eq!(round_up(9, 8), 16);

    assert_eq!(page_index(0, 64), 0);
    assert_eq!(page_index(63, 64), 0);
    assert_eq!(page_index(64, 64), 1);
}

// =============================================================================
// Paged File Tests
// =============================================================================

#[test]
fn test_open_creates_empty_file() {
    let (_temp, path) = setup_temp_file();

    let file = PagedFile::open(&path, 4096).unwrap();

    assert!(path.exists());
    assert_eq!(file.actual_file_size().unwrap(), 0);
    assert_eq!(file.page_size(), 4096);
    assert_eq!(file.path(), path.as_path());
}

#[test]
fn test_open_creates_parent_directories() {
    let (_temp, path) = setup_temp_file();
    let nested = path.parent().unwrap().join("a").join("b").join("file.paged");

    PagedFile::open(&nested, 4096).unwrap();

    assert!(nested.exists());
}

#[test]
fn test_file_grows_by_whole_pages() {
    let (_temp, path) = setup_temp_file();
    let file = PagedFile::open(&path, 4096).unwrap();

    let page = file.page_by_offset(5000).unwrap();
    assert_eq!(page.index(), 1);
    assert_eq!(page.len(), 4096);
    assert_eq!(file.actual_file_size().unwrap(), 8192);

    // Touching an earlier page doesn't shrink or grow the file
    file.page_by_offset(10).unwrap();
    assert_eq!(file.actual_file_size().unwrap(), 8192);
}

#[test]
fn test_same_page_is_shared() {
    let (_temp, path) = setup_temp_file();
    let file = PagedFile::open(&path, 4096).unwrap();

    let a = file.page_by_offset(100).unwrap();
    let b = file.page_by_offset(4000).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_to_offset_in_page() {
    let (_temp, path) = setup_temp_file();
    let file = PagedFile::open(&path, 64).unwrap();

    assert_eq!(file.to_offset_in_page(0), 0);
    assert_eq!(file.to_offset_in_page(88), 24);
    assert_eq!(file.to_offset_in_page(128), 0);
}

#[test]
fn test_reopen_keeps_file_size() {
    let (_temp, path) = setup_temp_file();
    {
        let file = PagedFile::open(&path, 4096).unwrap();
        file.page_by_offset(3 * 4096).unwrap();
        file.close().unwrap();
    }

    let file = PagedFile::open(&path, 4096).unwrap();
    assert_eq!(file.actual_file_size().unwrap(), 4 * 4096);
}

#[test]
fn test_zeroize_from_on_fresh_pages() {
    let (_temp, path) = setup_temp_file();
    let file = PagedFile::open(&path, 64).unwrap();
    file.page_by_offset(200).unwrap();

    file.zeroize_from(100).unwrap();

    assert_eq!(file.actual_file_size().unwrap(), 256);
}

#[test]
fn test_close_and_remove_deletes_file() {
    let (_temp, path) = setup_temp_file();
    let file = PagedFile::open(&path, 4096).unwrap();
    file.page_by_offset(0).unwrap();

    file.close_and_remove().unwrap();

    assert!(!path.exists());
}

// =============================================================================
// Page Size Validation Tests
// =============================================================================

#[test]
fn test_rejects_page_size_below_minimum() {
    let (_temp, path) = setup_temp_file();

    let result = PagedFile::open(&path, MIN_PAGE_SIZE - 8);

    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}

#[test]
fn test_rejects_unaligned_page_size() {
    let (_temp, path) = setup_temp_file();

    let result = PagedFile::open(&path, 100);

    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}

#[test]
fn test_accepts_minimum_page_size() {
    let (_temp, path) = setup_temp_file();

    assert!(PagedFile::open(&path, MIN_PAGE_SIZE).is_ok());
}
