//! FIFO buffer for bytes awaiting transmission.
//!
//! MIDI input is bursty: a chord or a controller sweep can produce many
//! messages faster than the link can complete one handshake per byte.
//! [`ByteQueue`] absorbs those bursts.
//!
//! # Contract
//!
//! - Bytes leave in exactly the order they entered; none are dropped or
//!   duplicated.
//! - There is no capacity bound.  Producers are real-time controllers and are
//!   rate-limited by the player, so growth stays small in practice.
//! - Pure in-memory state; all locking is the owner's responsibility.

use std::collections::VecDeque;

/// Ordered holding buffer for pending bytes.
#[derive(Debug, Default, Clone)]
pub struct ByteQueue {
    elements: VecDeque<u8>,
}

impl ByteQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `byte` to the tail.
    pub fn add(&mut self, byte: u8) {
        self.elements.push_back(byte);
    }

    /// Append every byte of `bytes`, preserving their order.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.elements.extend(bytes.iter().copied());
    }

    /// Remove and return the head, or `None` when the queue is empty.
    pub fn next(&mut self) -> Option<u8> {
        self.elements.pop_front()
    }

    /// `true` while at least one byte is pending.
    pub fn has_next(&self) -> bool {
        !self.elements.is_empty()
    }

    /// Number of pending bytes.
    pub fn size(&self) -> usize {
        self.elements.len()
    }

    /// Discard everything still pending, returning how many bytes were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.elements.len();
        self.elements.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_queue_is_empty() {
        let mut q = ByteQueue::new();
        assert!(!q.has_next());
        assert_eq!(q.size(), 0);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn bytes_leave_in_insertion_order() {
        let mut q = ByteQueue::new();
        q.add(0x90);
        q.extend(&[0x40, 0x7f]);
        q.add(0x80);

        assert_eq!(q.size(), 4);
        let drained: Vec<u8> = std::iter::from_fn(|| q.next()).collect();
        assert_eq!(drained, vec![0x90, 0x40, 0x7f, 0x80]);
        assert!(!q.has_next());
    }

    #[test]
    fn has_next_does_not_consume() {
        let mut q = ByteQueue::new();
        q.add(7);
        assert!(q.has_next());
        assert!(q.has_next());
        assert_eq!(q.size(), 1);
        assert_eq!(q.next(), Some(7));
    }

    #[test]
    fn add_while_partially_drained() {
        let mut q = ByteQueue::new();
        q.extend(&[1, 2, 3]);
        assert_eq!(q.next(), Some(1));
        q.extend(&[4, 5]);
        assert_eq!(q.next(), Some(2));
        assert_eq!(q.next(), Some(3));
        assert_eq!(q.next(), Some(4));
        assert_eq!(q.next(), Some(5));
        assert_eq!(q.next(), None);
    }

    #[test]
    fn every_byte_value_is_accepted() {
        let mut q = ByteQueue::new();
        let all: Vec<u8> = (0..=u8::MAX).collect();
        q.extend(&all);
        assert_eq!(q.size(), 256);
        let drained: Vec<u8> = std::iter::from_fn(|| q.next()).collect();
        assert_eq!(drained, all);
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut q = ByteQueue::new();
        q.extend(&[1, 2, 3]);
        assert_eq!(q.clear(), 3);
        assert!(!q.has_next());
        assert_eq!(q.clear(), 0);
    }
}
