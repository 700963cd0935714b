//! Fixed-capacity ring buffer for the per-run sample history.
//!
//! The capacity is part of the type, so a history declared with capacity 3
//! can never hold a fourth element: pushing into a full buffer evicts the
//! oldest element first.

use std::collections::vec_deque::Iter;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T, const N: usize> {
    items: VecDeque<T>,
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        assert!(N > 0, "RingBuffer capacity must be greater than 0");
        Self {
            items: VecDeque::with_capacity(N),
        }
    }

    /// Pushes to the back, returning the evicted front element when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= N {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone, const N: usize> RingBuffer<T, N> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
