//! Durable value enumerator
//!
//! Assigns each distinct value a stable id. Values live in an append-only log (the id
//! is the log record id); an in-memory multimap from value hash to ids is rebuilt
//! from the log on open.

use std::marker::PhantomData;
use std::path::Path;

use parking_lot::RwLock;

use crate::config::LogConfig;
use crate::error::{abandon_open, Result, StoreError};
use crate::log::AppendLog;
use crate::multimap::IdMultimap;

use super::descriptor::{hash_key, KeyDescriptor};

pub struct DurableEnumerator<K: KeyDescriptor> {
    log: AppendLog,
    index: RwLock<IdMultimap>,
    _key: PhantomData<fn() -> K>,
}

impl<K: KeyDescriptor> DurableEnumerator<K> {
    /// Open the log at `path` and replay it into the index
    pub fn open(path: &Path, config: LogConfig) -> Result<Self> {
        let log = AppendLog::open(path, config)?;

        let index = match replay(&log) {
            Ok(index) => index,
            Err(e) => return abandon_open(e, [log.close()]),
        };

        tracing::debug!(path = %path.display(), values = index.len(), "enumerator replayed");

        Ok(Self {
            log,
            index: RwLock::new(index),
            _key: PhantomData,
        })
    }

    /// Id of `value`, assigning a new one if it was never seen
    pub fn enumerate(&self, value: &K::Borrowed) -> Result<u32> {
        let bytes = K::as_bytes(value);
        let key = hash_key(bytes);

        if let Some(id) = self.find(&self.index.read(), key, bytes)? {
            return Ok(id);
        }

        let mut index = self.index.write();
        if let Some(id) = self.find(&index, key, bytes)? {
            return Ok(id);
        }

        let id = to_u32(self.log.append(bytes)?)?;
        index.put(key, id)?;
        Ok(id)
    }

    /// Id of `value` if it was enumerated before
    pub fn try_enumerate(&self, value: &K::Borrowed) -> Result<Option<u32>> {
        let bytes = K::as_bytes(value);
        self.find(&self.index.read(), hash_key(bytes), bytes)
    }

    /// Value behind `id`
    pub fn value_of(&self, id: u32) -> Result<K> {
        self.log.read(id as u64, K::from_bytes)?
    }

    /// Visit `(id, value)` in enumeration order until `visitor` returns `false`
    pub fn for_each<V>(&self, mut visitor: V) -> Result<bool>
    where
        V: FnMut(u32, K) -> bool,
    {
        let mut failure = None;
        let completed = self.log.for_each_record(|id, bytes| {
            match to_u32(id).and_then(|id| K::from_bytes(bytes).map(|value| (id, value))) {
                Ok((id, value)) => visitor(id, value),
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }

    pub fn records_count(&self) -> u64 {
        self.log.records_count()
    }

    pub fn flush(&self, fsync: bool) -> Result<()> {
        self.log.flush(fsync)
    }

    pub fn close(self) -> Result<()> {
        self.log.close()
    }

    pub fn close_and_remove(self) -> Result<()> {
        self.log.close_and_remove()
    }

    fn find(&self, index: &IdMultimap, key: u32, bytes: &[u8]) -> Result<Option<u32>> {
        let mut failure = None;
        let found = index.lookup(key, |id| match self.log.read(id as u64, |stored| stored == bytes) {
            Ok(equal) => equal,
            Err(e) => {
                failure = Some(e);
                true
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }
}

impl<K: KeyDescriptor> std::fmt::Debug for DurableEnumerator<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableEnumerator")
            .field("log", &self.log)
            .field("values", &self.index.read().len())
            .finish()
    }
}

fn to_u32(id: u64) -> Result<u32> {
    u32::try_from(id)
        .map_err(|_| StoreError::Capacity(format!("record id {} does not fit 32 bits", id)))
}

/// Rebuild the value index from every record in `log`
fn replay(log: &AppendLog) -> Result<IdMultimap> {
    let mut index = IdMultimap::with_capacity(log.records_count() as usize);
    let mut failure = None;
    log.for_each_record(|id, bytes| match to_u32(id) {
        Ok(id) => match index.put(hash_key(bytes), id) {
            Ok(_) => true,
            Err(e) => {
                failure = Some(e);
                false
            }
        },
        Err(e) => {
            failure = Some(e);
            false
        }
    })?;
    if let Some(e) = failure {
        return Err(e);
    }
    Ok(index)
}
