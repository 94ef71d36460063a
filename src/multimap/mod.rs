//! Hash-Keyed ID Multimap Module
//!
//! Maps a 32-bit hash prefix to the ids of records whose full hash starts with it.
//! Callers confirm a candidate by comparing full values; several ids per key are normal.
//!
//! ## Responsibilities
//! - In-memory open-addressing multimap ([`IdMultimap`])
//! - Durable, checksummed snapshot file ([`SidecarIndex`])

mod map;
mod sidecar;

pub use map::IdMultimap;
pub use sidecar::{SidecarIndex, SidecarLoad, SidecarSnapshot};
