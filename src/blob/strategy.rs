//! Space allocation strategies
//!
//! Decide how much capacity a record gets, given the payload the writer produced.
//! Extra capacity lets later writes grow the record in place instead of moving it.

use std::fmt::Debug;

use crate::error::{Result, StoreError};

use super::record::MAX_CAPACITY;

/// Capacity policy for new and relocated records
pub trait SpaceAllocationStrategy: Debug + Send + Sync {
    /// Initial size of the scratch buffer handed to writers
    fn default_capacity(&self) -> usize;

    /// Capacity for a record whose writer produced `length` bytes in a buffer of
    /// `current_capacity`. Must be `>= length`.
    fn capacity(&self, length: usize, current_capacity: usize) -> usize;
}

/// Capacity is whatever the writer's buffer grew to
#[derive(Debug, Clone, Copy)]
pub struct WriterDecidesStrategy {
    default_capacity: usize,
}

impl WriterDecidesStrategy {
    pub fn new(default_capacity: usize) -> Result<Self> {
        if default_capacity == 0 || default_capacity > MAX_CAPACITY {
            return Err(StoreError::InvalidArgument(format!(
                "default_capacity(={}) must be in [1, {}]",
                default_capacity, MAX_CAPACITY
            )));
        }
        Ok(Self { default_capacity })
    }
}

impl SpaceAllocationStrategy for WriterDecidesStrategy {
    fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    fn capacity(&self, length: usize, current_capacity: usize) -> usize {
        current_capacity.min(MAX_CAPACITY).max(length)
    }
}

/// `max(min, length * (1 + percent/100) + 1)`, clamped to [`MAX_CAPACITY`]
#[derive(Debug, Clone, Copy)]
pub struct DataLengthPlusFixedPercentStrategy {
    default_capacity: usize,
    min_capacity: usize,
    percent_on_top: u32,
}

impl DataLengthPlusFixedPercentStrategy {
    pub fn new(default_capacity: usize, min_capacity: usize, percent_on_top: u32) -> Result<Self> {
        if default_capacity == 0 || default_capacity > MAX_CAPACITY {
            return Err(StoreError::InvalidArgument(format!(
                "default_capacity(={}) must be in [1, {}]",
                default_capacity, MAX_CAPACITY
            )));
        }
        if min_capacity == 0 || min_capacity > default_capacity {
            return Err(StoreError::InvalidArgument(format!(
                "min_capacity(={}) must be in [1, default_capacity(={})]",
                min_capacity, default_capacity
            )));
        }
        Ok(Self {
            default_capacity,
            min_capacity,
            percent_on_top,
        })
    }
}

impl Default for DataLengthPlusFixedPercentStrategy {
    fn default() -> Self {
        Self {
            default_capacity: 256,
            min_capacity: 64,
            percent_on_top: 30,
        }
    }
}

impl SpaceAllocationStrategy for DataLengthPlusFixedPercentStrategy {
    fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    fn capacity(&self, length: usize, _current_capacity: usize) -> usize {
        let with_headroom = length as u64 * (100 + self.percent_on_top as u64) / 100 + 1;
        let advised = with_headroom.max(self.min_capacity as u64);
        advised.min(MAX_CAPACITY as u64) as usize
    }
}
