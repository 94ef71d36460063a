//! Tests for CacheEngine
//!
//! These tests verify:
//! - Storage files are laid out in the data directory
//! - Contents, names and attributes work side by side
//! - Close and reopen keeps everything
//! - Unclean shutdown handling follows the recovery policy
//! - A failed open leaves the stores it already opened closed cleanly
//! - Concurrent access through a shared engine

use std::sync::Arc;

use crossbeam::thread;
use tempfile::TempDir;
use vfscache::config::{Config, RecoveryPolicy};
use vfscache::{CacheEngine, StoreError};

const PAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .page_size(PAGE_SIZE)
        .compression_threshold(4096)
        .build()
}

fn setup_temp_engine() -> (TempDir, CacheEngine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = CacheEngine::open(test_config(&temp_dir)).unwrap();
    (temp_dir, engine)
}

/// Attribute record for a file: name id + content id
fn attributes_of(name_id: u32, content_id: u32) -> Vec<u8> {
    let mut bytes = name_id.to_le_bytes().to_vec();
    bytes.extend_from_slice(&content_id.to_le_bytes());
    bytes
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_storage_files() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("cache");
    let config = Config::builder().data_dir(&data_dir).page_size(PAGE_SIZE).build();

    let engine = CacheEngine::open(config).unwrap();

    assert!(data_dir.join(CacheEngine::CONTENTS_FILENAME).exists());
    assert!(data_dir.join(CacheEngine::CONTENTS_INDEX_FILENAME).exists());
    assert!(data_dir.join(CacheEngine::NAMES_FILENAME).exists());
    assert!(data_dir.join(CacheEngine::ATTRIBUTES_FILENAME).exists());
    assert_eq!(engine.data_dir(), data_dir.as_path());
}

#[test]
fn test_engine_open_path_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let engine = CacheEngine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.config().log.page_size, vfscache::config::DEFAULT_PAGE_SIZE);
    engine.close().unwrap();
}

#[test]
fn test_engine_close_and_reopen() {
    let (temp_dir, engine) = setup_temp_engine();

    let content = engine.contents().store_record(b"fn main() {}").unwrap();
    let name = engine.names().enumerate("src/main.rs").unwrap();
    let attrs = engine
        .attributes()
        .write_new_record(|buf| buf.extend_from_slice(&attributes_of(name, content)))
        .unwrap();
    engine.close().unwrap();

    let engine = CacheEngine::open(test_config(&temp_dir)).unwrap();

    assert_eq!(&engine.contents().read_stream(content).unwrap()[..], b"fn main() {}");
    assert_eq!(engine.names().value_of(name).unwrap(), "src/main.rs");
    assert_eq!(
        engine.attributes().read_record(attrs, |p| p.to_vec()).unwrap(),
        attributes_of(name, content)
    );
}

#[test]
fn test_engine_flush() {
    let (_temp, engine) = setup_temp_engine();
    engine.contents().store_record(b"data").unwrap();
    engine.names().enumerate("name").unwrap();

    engine.flush(true).unwrap();
    engine.flush(false).unwrap();
}

// =============================================================================
// Unclean Shutdown Tests
// =============================================================================

#[test]
fn test_engine_unclean_shutdown_fails_by_default() {
    let (temp_dir, engine) = setup_temp_engine();
    engine.contents().store_record(b"data").unwrap();
    drop(engine);

    let result = CacheEngine::open(test_config(&temp_dir));

    assert!(matches!(result, Err(StoreError::NotClosedProperly { .. })));
}

#[test]
fn test_engine_unclean_shutdown_recovers() {
    let (temp_dir, engine) = setup_temp_engine();
    let content = engine.contents().store_record(b"kept content").unwrap();
    let name = engine.names().enumerate("kept name").unwrap();
    let attrs = engine
        .attributes()
        .write_new_record(|buf| buf.extend_from_slice(b"kept attrs"))
        .unwrap();
    drop(engine);

    let config = Config::builder()
        .data_dir(temp_dir.path())
        .page_size(PAGE_SIZE)
        .recovery(RecoveryPolicy::Recover)
        .build();
    let engine = CacheEngine::open(config).unwrap();

    // The side-car index didn't cover the last store; it was rebuilt
    assert_eq!(engine.contents().store_record(b"kept content").unwrap(), content);
    assert_eq!(engine.names().try_enumerate("kept name").unwrap(), Some(name));
    assert_eq!(
        engine.attributes().read_record(attrs, |p| p.to_vec()).unwrap(),
        b"kept attrs"
    );
    assert!(!engine.attributes().was_closed_properly());
    engine.close().unwrap();

    // Clean again afterwards
    CacheEngine::open(test_config(&temp_dir)).unwrap().close().unwrap();
}

#[test]
fn test_failed_open_closes_stores_already_opened() {
    let (temp_dir, engine) = setup_temp_engine();
    let content = engine.contents().store_record(b"survives").unwrap();
    let name = engine.names().enumerate("survivor").unwrap();
    engine.close().unwrap();

    // Attributes open last; an unsupported version makes it fail
    let attributes_path = temp_dir.path().join(CacheEngine::ATTRIBUTES_FILENAME);
    let mut bytes = std::fs::read(&attributes_path).unwrap();
    bytes[0..4].copy_from_slice(&99i32.to_ne_bytes());
    std::fs::write(&attributes_path, &bytes).unwrap();

    let result = CacheEngine::open(test_config(&temp_dir));
    assert!(matches!(result, Err(StoreError::Format(_))));

    // Nothing crashed, so the default Fail policy opens the other stores again
    std::fs::remove_file(&attributes_path).unwrap();
    let engine = CacheEngine::open(test_config(&temp_dir)).unwrap();
    assert!(engine.contents().storage().was_closed_properly());
    assert_eq!(&engine.contents().read_stream(content).unwrap()[..], b"survives");
    assert_eq!(engine.names().value_of(name).unwrap(), "survivor");
    engine.close().unwrap();
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_engine_shared_across_threads() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    thread::scope(|s| {
        for t in 0..4 {
            let engine = Arc::clone(&engine);
            s.spawn(move |_| {
                for i in 0..50 {
                    let path = format!("dir-{}/file-{}", t, i);
                    let content = engine
                        .contents()
                        .store_record(format!("content of {}", i).as_bytes())
                        .unwrap();
                    let name = engine.names().enumerate(&path).unwrap();
                    let attrs = engine
                        .attributes()
                        .write_new_record(|buf| buf.extend_from_slice(&attributes_of(name, content)))
                        .unwrap();
                    assert_eq!(
                        engine.attributes().read_record(attrs, |p| p.to_vec()).unwrap(),
                        attributes_of(name, content)
                    );
                }
            });
        }
    })
    .unwrap();

    // Contents are shared between threads, names are not
    assert_eq!(engine.contents().records_count(), 50);
    assert_eq!(engine.names().records_count(), 200);
    assert_eq!(engine.attributes().live_records_count(), 200);

    let engine = Arc::try_unwrap(engine).unwrap();
    engine.close().unwrap();
}
