//! Key descriptors: how an enumerated value maps to and from stored bytes

use crate::error::{Result, StoreError};

/// Byte encoding of a value type kept in a [`DurableEnumerator`](super::DurableEnumerator)
///
/// Two values are equal iff their encodings are equal.
pub trait KeyDescriptor: Sized + Send + Sync {
    /// Borrowed form accepted by lookups (`str` for `String`)
    type Borrowed: ?Sized;

    fn as_bytes(value: &Self::Borrowed) -> &[u8];

    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

impl KeyDescriptor for String {
    type Borrowed = str;

    fn as_bytes(value: &str) -> &[u8] {
        value.as_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StoreError::Corruption(format!("stored value is not UTF-8: {}", e)))
    }
}

impl KeyDescriptor for Vec<u8> {
    type Borrowed = [u8];

    fn as_bytes(value: &[u8]) -> &[u8] {
        value
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// Multimap key of an encoded value (CRC32, never 0)
pub(crate) fn hash_key(bytes: &[u8]) -> u32 {
    match crc32fast::hash(bytes) {
        0 => u32::MAX,
        key => key,
    }
}
