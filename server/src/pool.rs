//! Bounded generational arena.
//!
//! Slots are addressed by a small index that doubles as the wire id. Every
//! time a slot is released its generation is bumped, so a [`Handle`] kept
//! around after its entity was destroyed never resolves to whatever reuses
//! the slot later. Freed indices are handed out lowest first.

use std::collections::BTreeSet;

use crate::error::{NpcError, NpcResult};

/// Index + generation reference into a [`Pool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u16,
    generation: u32,
}

impl Handle {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: BTreeSet<u16>,
    /// Lowest index handed out (NPC ids start at 1)
    first_index: u16,
    capacity: usize,
    len: usize,
}

impl<T> Pool<T> {
    /// Pool holding at most `capacity` entries with indices starting at `first_index`
    pub fn new(first_index: u16, capacity: usize) -> Self {
        // Keep the last index clear of the 0xFFFF "invalid" sentinel
        let max = (u16::MAX - first_index) as usize;
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            first_index,
            capacity: capacity.min(max),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate a slot and build the value with knowledge of its handle
    pub fn insert_with(&mut self, build: impl FnOnce(Handle) -> T) -> NpcResult<Handle> {
        let offset = match self.free.pop_first() {
            Some(offset) => offset as usize,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot { generation: 0, value: None });
                self.slots.len() - 1
            }
            None => return Err(NpcError::PoolExhausted { capacity: self.capacity }),
        };

        let slot = &mut self.slots[offset];
        let handle = Handle {
            index: self.first_index + offset as u16,
            generation: slot.generation,
        };
        slot.value = Some(build(handle));
        self.len += 1;
        Ok(handle)
    }

    pub fn insert(&mut self, value: T) -> NpcResult<Handle> {
        self.insert_with(|_| value)
    }

    fn slot(&self, index: u16) -> Option<&Slot<T>> {
        let offset = index.checked_sub(self.first_index)? as usize;
        self.slots.get(offset)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let offset = handle.index.checked_sub(self.first_index)? as usize;
        self.slots
            .get_mut(offset)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Live handle currently occupying a wire index
    pub fn resolve(&self, index: u16) -> Option<Handle> {
        self.slot(index)
            .filter(|slot| slot.value.is_some())
            .map(|slot| Handle { index, generation: slot.generation })
    }

    /// Release a slot. Stale handles are ignored.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let offset = handle.index.checked_sub(self.first_index)? as usize;
        let slot = self.slots.get_mut(offset)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.insert(offset as u16);
        self.len -= 1;
        Some(value)
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        let first = self.first_index;
        self.slots.iter().enumerate().filter_map(move |(offset, slot)| {
            slot.value.as_ref().map(|value| {
                (Handle { index: first + offset as u16, generation: slot.generation }, value)
            })
        })
    }
}
