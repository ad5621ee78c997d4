//! A capacity-bounded request sink with health state.

use std::collections::HashMap;

use tracing::debug;
use weir_types::{ServerLoad, ServerState};

/// A server holding up to `capacity` request keys.
///
/// Requests are kept in arrival order and may repeat. The server dies the
/// first time a request is offered while it is full and stays dead; there is
/// no automatic revival.
#[derive(Debug, Clone)]
pub struct Server {
    name: String,
    capacity: u64,
    requests: Vec<String>,
    alive: bool,
    overload_count: u64,
}

impl Server {
    /// Create an empty, alive server.
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            requests: Vec::new(),
            alive: true,
            overload_count: 0,
        }
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of requests held.
    pub fn occupancy(&self) -> u64 {
        self.requests.len() as u64
    }

    /// Remaining headroom.
    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.occupancy())
    }

    /// Whether occupancy has reached capacity.
    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }

    /// Whether the server has never overflowed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Health state.
    pub fn state(&self) -> ServerState {
        if self.alive {
            ServerState::Alive
        } else {
            ServerState::Dead
        }
    }

    /// Times a request was offered while the server was full.
    pub fn overload_count(&self) -> u64 {
        self.overload_count
    }

    /// Requests held, in arrival order.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    /// Number of held requests equal to `key`.
    pub fn match_count(&self, key: &str) -> u64 {
        self.requests.iter().filter(|r| r.as_str() == key).count() as u64
    }

    /// Held requests grouped by key.
    pub fn key_counts(&self) -> HashMap<&str, u64> {
        let mut counts = HashMap::new();
        for request in &self.requests {
            *counts.entry(request.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Append `key` if there is room. A full server records the overload and
    /// dies instead.
    pub fn try_accept(&mut self, key: &str) -> bool {
        if self.occupancy() < self.capacity {
            self.requests.push(key.to_string());
            return true;
        }
        self.overload_count += 1;
        if self.alive {
            self.alive = false;
            debug!(server = %self.name, capacity = self.capacity, "server overflowed");
        }
        false
    }

    /// Remove up to `count` requests from the front, in order.
    pub fn drain_front(&mut self, count: usize) -> Vec<String> {
        let count = count.min(self.requests.len());
        self.requests.drain(..count).collect()
    }

    /// Hand over every held request, leaving the server empty.
    pub fn take_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.requests)
    }

    /// Point-in-time load snapshot.
    pub fn load(&self) -> ServerLoad {
        ServerLoad {
            name: self.name.clone(),
            capacity: self.capacity,
            occupancy: self.occupancy(),
            state: self.state(),
            overload_count: self.overload_count,
        }
    }
}
