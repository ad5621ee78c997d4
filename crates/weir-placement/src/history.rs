//! Bounded FIFO of recently retried request keys and their resolved
//! ring addresses.

use std::collections::{HashMap, VecDeque};

/// Remembers where recently retried requests landed.
///
/// Entries are evicted oldest-first once `capacity` distinct keys are held.
/// Recording a key that is already present updates its address in place and
/// keeps its position in the queue.
#[derive(Debug, Clone)]
pub struct RequestHistory {
    capacity: usize,
    order: VecDeque<String>,
    addresses: HashMap<String, u64>,
}

impl RequestHistory {
    /// Create an empty history holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            addresses: HashMap::with_capacity(capacity),
        }
    }

    /// Maximum number of keys held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Last resolved address for `key`.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.addresses.get(key).copied()
    }

    /// Record the address `key` resolved to.
    pub fn record(&mut self, key: &str, address: u64) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.addresses.get_mut(key) {
            *existing = address;
            return;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.addresses.remove(&oldest);
        }
        self.order.push_back(key.to_string());
        self.addresses.insert(key.to_string(), address);
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        self.order.clear();
        self.addresses.clear();
    }
}
