//! Open-addressing `u32 → {u32}` multimap
//!
//! Each slot packs one `(key, value)` pair into a `u64` (`key << 32 | value`).
//! Linear probing; the table doubles before it gets more than half full.

use crate::error::{Result, StoreError};

const EMPTY: u64 = 0;

/// Key 0 never appears in a live slot, so `(0, 1)` marks a removed entry
const TOMBSTONE: u64 = 1;

const MIN_CAPACITY: usize = 16;

#[inline]
fn pack(key: u32, value: u32) -> u64 {
    ((key as u64) << 32) | value as u64
}

#[inline]
fn unpack(slot: u64) -> (u32, u32) {
    ((slot >> 32) as u32, slot as u32)
}

#[inline]
fn is_live(slot: u64) -> bool {
    slot >> 32 != 0
}

/// Multimap of non-zero `u32` keys to non-zero `u32` values
#[derive(Debug, Clone)]
pub struct IdMultimap {
    slots: Vec<u64>,
    live: usize,
    /// Live entries plus tombstones
    occupied: usize,
}

impl Default for IdMultimap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdMultimap {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Sized so `expected` entries fit without a resize
    pub fn with_capacity(expected: usize) -> Self {
        let capacity = (expected * 2 + 1).next_power_of_two().max(MIN_CAPACITY);
        Self {
            slots: vec![EMPTY; capacity],
            live: 0,
            occupied: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = EMPTY);
        self.live = 0;
        self.occupied = 0;
    }

    /// Add `(key, value)`; returns `false` if the pair was already present
    pub fn put(&mut self, key: u32, value: u32) -> Result<bool> {
        check_pair(key, value)?;

        if (self.occupied + 1) * 2 > self.slots.len() {
            let capacity = if (self.live + 1) * 2 > self.slots.len() / 2 {
                self.slots.len() * 2
            } else {
                self.slots.len()
            };
            self.rehash(capacity);
        }

        let packed = pack(key, value);
        let mask = self.slots.len() - 1;
        let mut index = self.home(key);
        let mut free = None;

        loop {
            match self.slots[index] {
                EMPTY => break,
                TOMBSTONE => {
                    free.get_or_insert(index);
                }
                slot if slot == packed => return Ok(false),
                _ => {}
            }
            index = (index + 1) & mask;
        }

        match free {
            Some(tombstone) => self.slots[tombstone] = packed,
            None => {
                self.slots[index] = packed;
                self.occupied += 1;
            }
        }
        self.live += 1;
        Ok(true)
    }

    /// Remove `(key, value)`; returns whether it was present
    pub fn remove(&mut self, key: u32, value: u32) -> Result<bool> {
        check_pair(key, value)?;

        let packed = pack(key, value);
        let mask = self.slots.len() - 1;
        let mut index = self.home(key);
        loop {
            match self.slots[index] {
                EMPTY => return Ok(false),
                slot if slot == packed => {
                    self.slots[index] = TOMBSTONE;
                    self.live -= 1;
                    return Ok(true);
                }
                _ => index = (index + 1) & mask,
            }
        }
    }

    /// First value under `key` accepted by `predicate`
    pub fn lookup<P>(&self, key: u32, mut predicate: P) -> Result<Option<u32>>
    where
        P: FnMut(u32) -> bool,
    {
        let mut found = None;
        self.for_each_value(key, |value| {
            if predicate(value) {
                found = Some(value);
                false
            } else {
                true
            }
        })?;
        Ok(found)
    }

    /// Visit values under `key` until `visitor` returns `false`
    pub fn for_each_value<V>(&self, key: u32, mut visitor: V) -> Result<()>
    where
        V: FnMut(u32) -> bool,
    {
        check_key(key)?;

        let mask = self.slots.len() - 1;
        let mut index = self.home(key);
        loop {
            let slot = self.slots[index];
            if slot == EMPTY {
                return Ok(());
            }
            let (slot_key, value) = unpack(slot);
            if is_live(slot) && slot_key == key && !visitor(value) {
                return Ok(());
            }
            index = (index + 1) & mask;
        }
    }

    /// All live `(key, value)` pairs, in slot order
    pub fn entries(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.slots
            .iter()
            .copied()
            .filter(|&slot| is_live(slot))
            .map(unpack)
    }

    fn home(&self, key: u32) -> usize {
        // Fibonacci hashing: keys are hash prefixes already, this spreads sequential ones
        let mixed = (key as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (mixed >> 32) as usize & (self.slots.len() - 1)
    }

    fn rehash(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; capacity]);
        self.live = 0;
        self.occupied = 0;

        let mask = capacity - 1;
        for slot in old.into_iter().filter(|&slot| is_live(slot)) {
            let (key, _) = unpack(slot);
            let mut index = self.home(key);
            while self.slots[index] != EMPTY {
                index = (index + 1) & mask;
            }
            self.slots[index] = slot;
            self.live += 1;
            self.occupied += 1;
        }
    }
}

fn check_key(key: u32) -> Result<()> {
    if key == 0 {
        return Err(StoreError::InvalidArgument("key 0 is reserved".to_string()));
    }
    Ok(())
}

fn check_pair(key: u32, value: u32) -> Result<()> {
    check_key(key)?;
    if value == 0 {
        return Err(StoreError::InvalidArgument(
            "value 0 is reserved".to_string(),
        ));
    }
    Ok(())
}
