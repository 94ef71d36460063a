//! Content hashes

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Digest length in bytes (SHA-256)
pub const HASH_SIZE: usize = 32;

/// Probe keys are never 0 (reserved by the multimap); a zero prefix maps here
pub const ZERO_KEY_SUBSTITUTE: u32 = u32::MAX;

/// SHA-256 of a content payload
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| {
            StoreError::InvalidArgument(format!(
                "hash must be {} bytes, got {}",
                HASH_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Parse 64 hex digits
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != HASH_SIZE * 2 || !hex.is_ascii() {
            return Err(StoreError::InvalidArgument(format!(
                "hash must be {} hex digits",
                HASH_SIZE * 2
            )));
        }
        let mut bytes = [0u8; HASH_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|e| {
                StoreError::InvalidArgument(format!("bad hex in hash: {}", e))
            })?;
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn probe_key(&self) -> u32 {
        probe_key(&self.0)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Multimap key for a hash: its first 4 bytes, big-endian, never 0
pub fn probe_key(hash: &[u8; HASH_SIZE]) -> u32 {
    match u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]) {
        0 => ZERO_KEY_SUBSTITUTE,
        key => key,
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
