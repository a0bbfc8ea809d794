//! Fixed-capacity ring that overwrites its oldest entry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring<T> {
    items: Vec<T>,
    capacity: usize,
    /// Slot the next push lands in once full.
    next: usize,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Append, overwriting the oldest entry when full. A zero-capacity ring
    /// drops everything.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.next] = item;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        let split = if self.items.len() < self.capacity { 0 } else { self.next };
        self.items[split..].iter().chain(self.items[..split].iter())
    }

    /// Newest entry matching `pred`.
    pub fn latest_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        let newest = if len < self.capacity { len - 1 } else { (self.next + len - 1) % len };
        let index = (0..len)
            .map(|back| (newest + len - back) % len)
            .find(|&i| pred(&self.items[i]))?;
        self.items.get_mut(index)
    }
}
