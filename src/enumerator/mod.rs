//! Durable Value Enumerator Module
//!
//! Interns values (names, byte strings) into stable 32-bit ids that survive restarts.
//!
//! ## Responsibilities
//! - `value → id` (assigning new ids on first sight) and `id → value`
//! - Durable storage in an append-only log; the id is the log record id
//! - Rebuild of the in-memory hash index by replaying the log on open

mod descriptor;
mod durable;

pub use descriptor::KeyDescriptor;
pub use durable::DurableEnumerator;
