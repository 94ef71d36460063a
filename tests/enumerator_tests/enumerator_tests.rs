//! Tests for the durable value enumerator
//!
//! These tests verify:
//! - Equal values get equal ids, distinct values distinct ids
//! - Ids and values survive a reopen (index replayed from the log)
//! - A damaged log fails the replay without leaving the log marked open
//! - Concurrent enumeration of the same values agrees on ids

use std::path::PathBuf;

use crossbeam::thread;
use tempfile::TempDir;
use vfscache::config::{LogConfig, RecoveryPolicy};
use vfscache::log::HEADER_SIZE;
use vfscache::{AppendLog, DurableEnumerator, StoreError};

const PAGE_SIZE: usize = 4096;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_enumerator() -> (TempDir, PathBuf, DurableEnumerator<String>) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("names.log");
    let names = DurableEnumerator::open(&path, LogConfig::with_page_size(PAGE_SIZE)).unwrap();
    (temp_dir, path, names)
}

// =============================================================================
// Enumerate Tests
// =============================================================================

#[test]
fn test_same_value_same_id() {
    let (_temp, _path, names) = setup_temp_enumerator();

    let a = names.enumerate("readme.md").unwrap();
    let b = names.enumerate("readme.md").unwrap();

    assert_eq!(a, b);
    assert_eq!(names.records_count(), 1);
}

#[test]
fn test_distinct_values_distinct_ids() {
    let (_temp, _path, names) = setup_temp_enumerator();

    let a = names.enumerate("a.txt").unwrap();
    let b = names.enumerate("b.txt").unwrap();

    assert_ne!(a, b);
    assert_ne!(a, 0);
    assert_ne!(b, 0);
}

#[test]
fn test_value_of_round_trips() {
    let (_temp, _path, names) = setup_temp_enumerator();

    let id = names.enumerate("src/main.rs").unwrap();

    assert_eq!(names.value_of(id).unwrap(), "src/main.rs");
}

#[test]
fn test_empty_string_is_a_value() {
    let (_temp, _path, names) = setup_temp_enumerator();

    let id = names.enumerate("").unwrap();

    assert_eq!(names.value_of(id).unwrap(), "");
    assert_eq!(names.enumerate("").unwrap(), id);
}

#[test]
fn test_try_enumerate_does_not_assign() {
    let (_temp, _path, names) = setup_temp_enumerator();

    assert_eq!(names.try_enumerate("unknown").unwrap(), None);
    assert_eq!(names.records_count(), 0);

    let id = names.enumerate("known").unwrap();
    assert_eq!(names.try_enumerate("known").unwrap(), Some(id));
}

#[test]
fn test_value_of_invalid_id_is_range_error() {
    let (_temp, _path, names) = setup_temp_enumerator();
    names.enumerate("only").unwrap();

    assert!(matches!(names.value_of(0), Err(StoreError::Range(_))));
    assert!(matches!(names.value_of(4001), Err(StoreError::Range(_))));
}

#[test]
fn test_byte_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bytes.log");
    let values: DurableEnumerator<Vec<u8>> =
        DurableEnumerator::open(&path, LogConfig::with_page_size(PAGE_SIZE)).unwrap();

    let a = values.enumerate(&[0xFF, 0x00, 0x7F]).unwrap();
    let b = values.enumerate(&[0xFF, 0x00]).unwrap();

    assert_ne!(a, b);
    assert_eq!(values.value_of(a).unwrap(), vec![0xFF, 0x00, 0x7F]);
    assert_eq!(values.enumerate(&[0xFF, 0x00, 0x7F]).unwrap(), a);
}

#[test]
fn test_for_each_in_enumeration_order() {
    let (_temp, _path, names) = setup_temp_enumerator();
    let inputs = ["c", "a", "b", "a", "c", "d"];
    for name in inputs {
        names.enumerate(name).unwrap();
    }

    let mut seen = Vec::new();
    let completed = names
        .for_each(|id, value| {
            seen.push((id, value));
            true
        })
        .unwrap();

    assert!(completed);
    let values: Vec<&str> = seen.iter().map(|(_, v)| v.as_str()).collect();
    assert_eq!(values, vec!["c", "a", "b", "d"]);
    for (id, value) in &seen {
        assert_eq!(names.try_enumerate(value).unwrap(), Some(*id));
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_ids_survive_reopen() {
    let (_temp, path, names) = setup_temp_enumerator();
    let ids: Vec<u32> = (0..200)
        .map(|i| names.enumerate(&format!("dir/file-{}.txt", i)).unwrap())
        .collect();
    names.close().unwrap();

    let names: DurableEnumerator<String> =
        DurableEnumerator::open(&path, LogConfig::with_page_size(PAGE_SIZE)).unwrap();

    assert_eq!(names.records_count(), 200);
    for (i, id) in ids.iter().enumerate() {
        let value = format!("dir/file-{}.txt", i);
        assert_eq!(names.try_enumerate(&value).unwrap(), Some(*id));
        assert_eq!(names.value_of(*id).unwrap(), value);
    }

    // New values continue after the replayed ones
    let fresh = names.enumerate("fresh").unwrap();
    assert!(fresh > *ids.last().unwrap());
}

#[test]
fn test_unclean_reopen_with_recovery() {
    let (_temp, path, names) = setup_temp_enumerator();
    let id = names.enumerate("kept").unwrap();
    drop(names);

    let failed: Result<DurableEnumerator<String>, _> =
        DurableEnumerator::open(&path, LogConfig::with_page_size(PAGE_SIZE));
    assert!(matches!(failed, Err(StoreError::NotClosedProperly { .. })));

    let config = LogConfig::with_page_size(PAGE_SIZE).recovery(RecoveryPolicy::Recover);
    let names: DurableEnumerator<String> = DurableEnumerator::open(&path, config).unwrap();
    assert_eq!(names.try_enumerate("kept").unwrap(), Some(id));
}

#[test]
fn test_damaged_log_fails_replay_and_stays_closed() {
    let (_temp, path, names) = setup_temp_enumerator();
    names.enumerate("first").unwrap();
    names.enumerate("second").unwrap();
    names.close().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&100_000i32.to_ne_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let result: Result<DurableEnumerator<String>, _> =
        DurableEnumerator::open(&path, LogConfig::with_page_size(PAGE_SIZE));
    assert!(matches!(result, Err(StoreError::Corruption(_))));

    let log = AppendLog::open(&path, LogConfig::with_page_size(PAGE_SIZE)).unwrap();
    assert!(log.was_closed_properly());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_enumeration_agrees() {
    let (_temp, _path, names) = setup_temp_enumerator();

    let per_thread: Vec<Vec<u32>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let names = &names;
                s.spawn(move |_| {
                    (0..200)
                        .map(|i| names.enumerate(&format!("name-{}", i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    for ids in &per_thread[1..] {
        assert_eq!(ids, &per_thread[0]);
    }
    assert_eq!(names.records_count(), 200);
}
