//! Bounded FIFO buffer that evicts its oldest entry when full.

use std::collections::VecDeque;

/// Oldest-first buffer holding at most `capacity` items.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Change the capacity, evicting the oldest items that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_items() {
        let mut buf = RingBuffer::new(3);
        assert_eq!(buf.push('a'), None);
        assert_eq!(buf.push('b'), None);
        assert_eq!(buf.push('c'), None);
        assert_eq!(buf.push('d'), Some('a'));
        assert_eq!(buf.snapshot(), vec!['b', 'c', 'd']);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn shrinking_evicts_oldest() {
        let mut buf = RingBuffer::new(5);
        for n in 0..5 {
            buf.push(n);
        }
        buf.set_capacity(2);
        assert_eq!(buf.snapshot(), vec![3, 4]);
        assert_eq!(buf.capacity(), 2);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buf = RingBuffer::new(0);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.snapshot(), vec![2]);
    }

    #[test]
    fn clear_empties() {
        let mut buf = RingBuffer::new(2);
        buf.push("x");
        buf.clear();
        assert!(buf.is_empty());
    }
}
