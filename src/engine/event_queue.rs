// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use rand::rngs::StdRng;
use rand::Rng;

const NO_EVENT: usize = usize::MAX;

/// Ring buffer of connection indices with pending events.
///
/// A connection holds at most one pending event, so a capacity of the next
/// power of two above the connection count never overflows. In fuzzing mode
/// the head is swapped with a random pending entry before each dequeue.
pub(crate) struct EventQueue {
    ring: Vec<usize>,
    mask: usize,
    head: usize,
    tail: usize,
    fuzz: Option<StdRng>,
}

impl EventQueue {
    pub(crate) fn new(connection_count: usize, fuzz: Option<StdRng>) -> Self {
        let capacity = connection_count.max(1).next_power_of_two();
        Self {
            ring: vec![NO_EVENT; capacity],
            mask: capacity - 1,
            head: 0,
            tail: 0,
            fuzz,
        }
    }

    pub(crate) fn enqueue(&mut self, connection: usize) {
        debug_assert!(self.len() < self.ring.len(), "event queue overflow");
        self.ring[self.tail & self.mask] = connection;
        self.tail = self.tail.wrapping_add(1);
    }

    pub(crate) fn dequeue(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let idx = self.head & self.mask;
        if let Some(rng) = self.fuzz.as_mut() {
            let pending = self.tail.wrapping_sub(self.head);
            let swap_with = self.head.wrapping_add(rng.random_range(0..pending)) & self.mask;
            self.ring.swap(idx, swap_with);
        }
        let connection = self.ring[idx];
        self.ring[idx] = NO_EVENT;
        self.head = self.head.wrapping_add(1);
        Some(connection)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub(crate) fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub(crate) fn pending(&self) -> Vec<usize> {
        (self.head..self.tail)
            .map(|i| self.ring[i & self.mask])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_capacity_is_power_of_two() {
        assert_eq!(EventQueue::new(0, None).capacity(), 1);
        assert_eq!(EventQueue::new(3, None).capacity(), 4);
        assert_eq!(EventQueue::new(8, None).capacity(), 8);
        assert_eq!(EventQueue::new(9, None).capacity(), 16);
    }

    #[test]
    fn test_fifo_order_and_wraparound() {
        let mut queue = EventQueue::new(2, None);
        for round in 0..5 {
            queue.enqueue(round);
            queue.enqueue(round + 100);
            assert_eq!(queue.len(), 2);
            assert_eq!(queue.dequeue(), Some(round));
            assert_eq!(queue.dequeue(), Some(round + 100));
            assert_eq!(queue.dequeue(), None);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fuzzing_delivers_every_event_exactly_once() {
        let mut queue = EventQueue::new(8, Some(StdRng::seed_from_u64(7)));
        for conn in 0..8 {
            queue.enqueue(conn);
        }
        let mut seen: Vec<usize> = std::iter::from_fn(|| queue.dequeue()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_pending_lists_queued_connections() {
        let mut queue = EventQueue::new(4, None);
        queue.enqueue(2);
        queue.enqueue(0);
        assert_eq!(queue.pending(), vec![2, 0]);
    }
}
