//! Generational handle table.
//!
//! Maps opaque `u64` handles to plugin-owned objects. A handle packs a slot
//! index (low 32 bits, offset by one so that `0` stays null) and the slot's
//! generation (high 32 bits). Removing an object bumps the generation, so a
//! stale or forged handle resolves to nothing instead of another object.

use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Thread-safe table of handle-addressed objects.
pub struct HandleTable<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> HandleTable<T> {
    pub const fn new() -> Self {
        Self {
            slots: const_mutex(Slots {
                entries: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Store `value` and return its handle (never `0`).
    pub fn insert(&self, value: T) -> u64 {
        let mut slots = self.slots.lock();
        let value = Some(Arc::new(value));
        let index = match slots.free.pop() {
            Some(index) => {
                slots.entries[index as usize].value = value;
                index
            }
            None => {
                slots.entries.push(Slot {
                    generation: 0,
                    value,
                });
                (slots.entries.len() - 1) as u32
            }
        };
        slots.live += 1;
        encode(index, slots.entries[index as usize].generation)
    }

    /// Resolve a handle. The returned `Arc` keeps the object alive even if the
    /// handle is removed concurrently.
    pub fn get(&self, handle: u64) -> Option<Arc<T>> {
        let (index, generation) = decode(handle)?;
        let slots = self.slots.lock();
        let slot = slots.entries.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.clone()
    }

    /// Remove a handle, returning its object. Later lookups of the handle fail.
    pub fn remove(&self, handle: u64) -> Option<Arc<T>> {
        let (index, generation) = decode(handle)?;
        let mut slots = self.slots.lock();
        let slot = slots.entries.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slots.free.push(index as u32);
        slots.live -= 1;
        Some(value)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(index: u32, generation: u32) -> u64 {
    (u64::from(generation) << 32) | (u64::from(index) + 1)
}

fn decode(handle: u64) -> Option<(usize, u32)> {
    let low = handle & 0xffff_ffff;
    if low == 0 {
        return None;
    }
    Some(((low - 1) as usize, (handle >> 32) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let table = HandleTable::new();
        let a = table.insert("a".to_string());
        let b = table.insert("b".to_string());
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).as_deref().map(String::as_str), Some("a"));

        assert!(table.remove(a).is_some());
        assert!(table.get(a).is_none());
        assert!(table.remove(a).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let table = HandleTable::new();
        let first = table.insert(1u32);
        table.remove(first);
        let second = table.insert(2u32);
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert_eq!(table.get(second).map(|v| *v), Some(2));
    }

    #[test]
    fn test_null_and_forged_handles() {
        let table: HandleTable<u8> = HandleTable::new();
        assert!(table.get(0).is_none());
        assert!(table.get(0xdead_beef).is_none());
        assert!(table.is_empty());
    }
}
