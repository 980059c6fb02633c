//! Tag-indexed arena with stable slots
//!
//! Objects are stored in slots that never move; a tag -> slot table resolves
//! user tags. Removing an object frees its slot without disturbing any other
//! tag, so analysis-side groups can hold tags instead of references.

use std::collections::BTreeMap;

/// Arena of objects addressed by user tags
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    index: BTreeMap<usize, usize>,
    free: Vec<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: BTreeMap::new(),
            free: Vec::new(),
        }
    }

    /// Insert an object under `tag`; returns false if the tag is taken
    pub fn insert(&mut self, tag: usize, value: T) -> bool {
        if self.index.contains_key(&tag) {
            return false;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(value);
                slot
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        };
        self.index.insert(tag, slot);
        true
    }

    /// Remove and return the object stored under `tag`
    pub fn remove(&mut self, tag: usize) -> Option<T> {
        let slot = self.index.remove(&tag)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    pub fn get(&self, tag: usize) -> Option<&T> {
        let slot = *self.index.get(&tag)?;
        self.slots[slot].as_ref()
    }

    pub fn get_mut(&mut self, tag: usize) -> Option<&mut T> {
        let slot = *self.index.get(&tag)?;
        self.slots[slot].as_mut()
    }

    pub fn contains(&self, tag: usize) -> bool {
        self.index.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Tags in ascending order
    pub fn tags(&self) -> impl Iterator<Item = usize> + '_ {
        self.index.keys().copied()
    }

    /// (tag, object) pairs in ascending tag order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.index
            .iter()
            .filter_map(move |(&tag, &slot)| self.slots[slot].as_ref().map(|v| (tag, v)))
    }

    /// Mutable objects in slot order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_keeps_other_tags() {
        let mut arena = Arena::new();
        assert!(arena.insert(10, "a"));
        assert!(arena.insert(20, "b"));
        assert!(arena.insert(30, "c"));
        assert!(!arena.insert(20, "dup"));

        assert_eq!(arena.remove(20), Some("b"));
        assert_eq!(arena.get(10), Some(&"a"));
        assert_eq!(arena.get(30), Some(&"c"));
        assert!(arena.get(20).is_none());

        // freed slot is reused
        assert!(arena.insert(40, "d"));
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.tags().collect::<Vec<_>>(), vec![10, 30, 40]);
    }
}
