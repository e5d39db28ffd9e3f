/*
 * Copyright 2026 - Francisco F. Pinochet
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *         http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Generational slots for sessions and streams.
//!
//! A removed slot bumps its generation, so a handle kept by the host after
//! destroy never reaches whatever reuses the slot.

/// Position of a value in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the value built by `f`, which learns the index it will live at.
    pub fn insert_with(&mut self, f: impl FnOnce(Index) -> T) -> Index {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let generation = match self.slots[slot as usize] {
                Slot::Vacant { generation } => generation,
                Slot::Occupied { generation, .. } => generation,
            };
            let index = Index { slot, generation };
            self.slots[slot as usize] = Slot::Occupied { generation, value: f(index) };
            return index;
        }
        let index = Index {
            slot: self.slots.len() as u32,
            generation: 0,
        };
        self.slots.push(Slot::Occupied { generation: 0, value: f(index) });
        index
    }

    pub fn insert(&mut self, value: T) -> Index {
        self.insert_with(|_| value)
    }

    pub fn get(&self, index: Index) -> Option<&T> {
        match self.slots.get(index.slot as usize)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        match self.slots.get_mut(index.slot as usize)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub fn remove(&mut self, index: Index) -> Option<T> {
        let slot = self.slots.get_mut(index.slot as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == index.generation => {}
            _ => return None,
        }
        let next = Slot::Vacant {
            generation: index.generation.wrapping_add(1),
        };
        match std::mem::replace(slot, next) {
            Slot::Occupied { value, .. } => {
                self.free.push(index.slot);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| match entry {
            Slot::Occupied { generation, value } => Some((
                Index {
                    slot: slot as u32,
                    generation: *generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(slot, entry)| match entry {
            Slot::Occupied { generation, value } => Some((
                Index {
                    slot: slot as u32,
                    generation: *generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn indices(&self) -> Vec<Index> {
        self.iter().map(|(index, _)| index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_index_after_reuse() {
        let mut arena = Arena::new();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));
        assert_eq!(arena.remove(first), None);

        let second = arena.insert("b");
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_insert_with_sees_own_index() {
        let mut arena = Arena::new();
        let index = arena.insert_with(|index| index);
        assert_eq!(arena.get(index), Some(&index));
        assert_eq!(arena.indices(), vec![index]);
    }
}
