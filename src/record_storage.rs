//! Record storage abstraction
//!
//! The narrow surface higher layers (content store, engine callers) use to talk to
//! a primary storage. Implemented by [`AppendLog`](crate::log::AppendLog) and
//! [`BlobStore`](crate::blob::BlobStore).

use crate::error::Result;

/// Id-addressed storage of opaque byte records
pub trait RecordStorage: Send + Sync {
    /// Store `bytes` as a new record and return its id (never 0)
    fn append(&self, bytes: &[u8]) -> Result<u64>;

    /// Hand the payload of record `id` to `reader`
    fn read<T, F>(&self, id: u64, reader: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T;

    /// Visit every readable record in storage order; `false` from the visitor stops the scan.
    /// Returns whether the scan ran to completion.
    fn for_each_record<V>(&self, visitor: V) -> Result<bool>
    where
        V: FnMut(u64, &[u8]) -> bool;

    /// Number of readable records
    fn records_count(&self) -> u64;

    /// Persist pending state; `fsync` forces it to disk
    fn flush(&self, fsync: bool) -> Result<()>;

    /// Mark the storage safely closed and release it
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Close and delete the underlying file
    fn close_and_remove(self) -> Result<()>
    where
        Self: Sized;
}
