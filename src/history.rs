//! Fixed-capacity history buffers
//!
//! Both the latency history and the status-change history are bounded
//! sequences where the oldest entry is evicted first. One abstraction
//! serves both.

use serde::Serialize;
use std::collections::VecDeque;

/// Bounded ordered sequence; pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone, Serialize)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Drop entries from the front while they match the predicate.
    pub fn prune_front_while<F: Fn(&T) -> bool>(&mut self, drop: F) {
        while let Some(front) = self.entries.front() {
            if drop(front) {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

impl<T: Clone> BoundedHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut history = BoundedHistory::new(3);
        history.push(1);
        history.push(2);

        assert_eq!(history.len(), 2);
        assert_eq!(history.last(), Some(&2));
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut history = BoundedHistory::new(3);
        for i in 0..5 {
            history.push(i);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_prune_front_while() {
        let mut history = BoundedHistory::new(10);
        for i in 0..6 {
            history.push(i);
        }

        history.prune_front_while(|v| *v < 3);
        assert_eq!(history.to_vec(), vec![3, 4, 5]);

        // Predicate failing on the first entry is a no-op
        history.prune_front_while(|v| *v < 0);
        assert_eq!(history.len(), 3);
    }
}
