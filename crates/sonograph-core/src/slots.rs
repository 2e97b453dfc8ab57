//! Generational slot storage for graph entities.
//!
//! Removing an entry frees its slot for the next insert and bumps the slot's
//! generation. A key is a `(slot, generation)` pair; keys handed out before a
//! removal stop resolving once the slot is reused.

/// Key of an entry in [`Slots`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Key {
    pub slot: u32,
    pub generation: u32,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Vector of entries whose vacated slots are reused.
#[derive(Debug, Clone)]
pub(crate) struct Slots<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Slots<T> {
    /// Key the next [`insert`](Self::insert) will return.
    pub fn vacant(&self) -> Key {
        match self.free.last() {
            Some(&slot) => Key {
                slot,
                generation: self.entries[slot as usize].generation,
            },
            None => Key {
                slot: self.entries.len() as u32,
                generation: 0,
            },
        }
    }

    pub fn insert(&mut self, value: T) -> Key {
        self.live += 1;
        match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.entries[slot as usize];
                entry.value = Some(value);
                Key {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                let slot = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    value: Some(value),
                });
                Key { slot, generation: 0 }
            }
        }
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.entries
            .get(key.slot as usize)
            .filter(|e| e.generation == key.generation)
            .and_then(|e| e.value.as_ref())
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.entries
            .get_mut(key.slot as usize)
            .filter(|e| e.generation == key.generation)
            .and_then(|e| e.value.as_mut())
    }

    /// Takes the entry out and frees its slot. Stale keys return `None`.
    pub fn remove(&mut self, key: Key) -> Option<T> {
        let entry = self
            .entries
            .get_mut(key.slot as usize)
            .filter(|e| e.generation == key.generation)?;
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.slot);
        self.live -= 1;
        Some(value)
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|e| e.value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Number of slots ever allocated, live or free.
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
