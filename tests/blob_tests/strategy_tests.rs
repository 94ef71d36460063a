//! Tests for blob space allocation strategies

use vfscache::blob::{
    DataLengthPlusFixedPercentStrategy, SpaceAllocationStrategy, WriterDecidesStrategy,
    MAX_CAPACITY,
};
use vfscache::StoreError;

// =============================================================================
// WriterDecidesStrategy Tests
// =============================================================================

#[test]
fn test_writer_decides_uses_buffer_capacity() {
    let strategy = WriterDecidesStrategy::new(128).unwrap();

    assert_eq!(strategy.default_capacity(), 128);
    assert_eq!(strategy.capacity(10, 128), 128);
    assert_eq!(strategy.capacity(10, 500), 500);
}

#[test]
fn test_writer_decides_never_below_length() {
    let strategy = WriterDecidesStrategy::new(128).unwrap();

    assert_eq!(strategy.capacity(300, 128), 300);
}

#[test]
fn test_writer_decides_clamped_to_max_capacity() {
    let strategy = WriterDecidesStrategy::new(128).unwrap();

    assert_eq!(strategy.capacity(10, 1 << 20), MAX_CAPACITY);
}

#[test]
fn test_writer_decides_rejects_bad_default() {
    assert!(matches!(
        WriterDecidesStrategy::new(0),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        WriterDecidesStrategy::new(MAX_CAPACITY + 1),
        Err(StoreError::InvalidArgument(_))
    ));
}

// =============================================================================
// DataLengthPlusFixedPercentStrategy Tests
// =============================================================================

#[test]
fn test_percent_strategy_defaults() {
    let strategy = DataLengthPlusFixedPercentStrategy::default();

    assert_eq!(strategy.default_capacity(), 256);
    assert_eq!(strategy.capacity(10, 256), 64);
}

#[test]
fn test_percent_strategy_adds_headroom() {
    let strategy = DataLengthPlusFixedPercentStrategy::new(256, 64, 30).unwrap();

    // 100 * 1.3 + 1
    assert_eq!(strategy.capacity(100, 256), 131);
    // 1000 * 1.3 + 1
    assert_eq!(strategy.capacity(1000, 256), 1301);
}

#[test]
fn test_percent_strategy_ignores_buffer_capacity() {
    let strategy = DataLengthPlusFixedPercentStrategy::new(256, 64, 30).unwrap();

    assert_eq!(strategy.capacity(100, 10_000), strategy.capacity(100, 0));
}

#[test]
fn test_percent_strategy_zero_percent() {
    let strategy = DataLengthPlusFixedPercentStrategy::new(16, 8, 0).unwrap();

    assert_eq!(strategy.capacity(100, 0), 101);
    assert_eq!(strategy.capacity(2, 0), 8);
}

#[test]
fn test_percent_strategy_clamped_to_max_capacity() {
    let strategy = DataLengthPlusFixedPercentStrategy::new(256, 64, 30).unwrap();

    assert_eq!(strategy.capacity(60_000, 256), MAX_CAPACITY);
}

#[test]
fn test_percent_strategy_rejects_bad_arguments() {
    assert!(matches!(
        DataLengthPlusFixedPercentStrategy::new(0, 0, 10),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        DataLengthPlusFixedPercentStrategy::new(100, 200, 10),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        DataLengthPlusFixedPercentStrategy::new(MAX_CAPACITY + 8, 64, 10),
        Err(StoreError::InvalidArgument(_))
    ));
}
