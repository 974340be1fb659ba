//! Binary heap with in-place priority updates.
//!
//! Every element is reachable by key, and the heap keeps a key→position map
//! current through a single position-setter invoked on every move. That is
//! what makes `update`, `update_at` and `remove` O(log n) instead of O(n).

use std::collections::HashMap;
use std::hash::Hash;

/// An element that can live in an [`IndexedHeap`].
pub trait HeapItem {
    type Key: Clone + Eq + Hash;

    fn key(&self) -> Self::Key;

    /// Whether `self` must be popped before `other`. Must be a strict weak
    /// ordering.
    fn precedes(&self, other: &Self) -> bool;
}

/// Max-heap (by [`HeapItem::precedes`]) with addressable elements.
pub struct IndexedHeap<T: HeapItem> {
    items: Vec<T>,
    positions: HashMap<T::Key, usize>,
}

impl<T: HeapItem> IndexedHeap<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.positions.contains_key(key)
    }

    /// Current position of the element with `key`.
    pub fn position(&self, key: &T::Key) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.position(key).map(|i| &self.items[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Insert an element.
    ///
    /// # Panics
    ///
    /// Panics if an element with the same key is already present.
    pub fn push(&mut self, item: T) {
        let index = self.items.len();
        let previous = self.positions.insert(item.key(), index);
        assert!(previous.is_none(), "duplicate key pushed onto indexed heap");
        self.items.push(item);
        self.sift_up(index);
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.swap(0, last);
        let item = self.items.pop()?;
        self.positions.remove(&item.key());
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(item)
    }

    /// Mutate the element with `key` in place, then restore heap order.
    /// Returns `None` if no such element exists.
    pub fn update<R>(&mut self, key: &T::Key, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let index = self.position(key)?;
        let result = f(&mut self.items[index]);
        debug_assert!(self.items[index].key() == *key, "update must not change the key");
        self.update_at(index);
        Some(result)
    }

    /// Re-sift the element at `index` after its ordering inputs changed.
    pub fn update_at(&mut self, index: usize) {
        if index < self.items.len() && !self.sift_up(index) {
            self.sift_down(index);
        }
    }

    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let index = self.position(key)?;
        let last = self.items.len() - 1;
        self.swap(index, last);
        let item = self.items.pop()?;
        self.positions.remove(key);
        self.update_at(index);
        Some(item)
    }

    /// Keep only the elements for which `keep` returns true; the rest are
    /// returned. Rebuilds the heap in O(n).
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let (kept, dropped): (Vec<T>, Vec<T>) =
            std::mem::take(&mut self.items).into_iter().partition(|t| keep(t));
        self.items = kept;
        self.positions.clear();
        for index in 0..self.items.len() {
            self.set_position(index);
        }
        for index in (0..self.items.len() / 2).rev() {
            self.sift_down(index);
        }
        dropped
    }

    /// Whether the heap property and the position map both hold.
    pub fn is_consistent(&self) -> bool {
        let ordered = (1..self.items.len()).all(|i| {
            let parent = (i - 1) / 2;
            !self.items[i].precedes(&self.items[parent])
        });
        let indexed = self.positions.len() == self.items.len()
            && self
                .items
                .iter()
                .enumerate()
                .all(|(i, item)| self.positions.get(&item.key()) == Some(&i));
        ordered && indexed
    }

    fn set_position(&mut self, index: usize) {
        let key = self.items[index].key();
        self.positions.insert(key, index);
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.set_position(a);
        self.set_position(b);
    }

    /// Returns whether the element moved.
    fn sift_up(&mut self, mut index: usize) -> bool {
        let start = index;
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.items[index].precedes(&self.items[parent]) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
        index != start
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut best = left;
            if right < len && self.items[right].precedes(&self.items[left]) {
                best = right;
            }
            if !self.items[best].precedes(&self.items[index]) {
                break;
            }
            self.swap(index, best);
            index = best;
        }
    }
}

impl<T: HeapItem> Default for IndexedHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
