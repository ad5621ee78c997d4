//! Capacity-weighted range ring.

use tracing::{debug, warn};
use weir_types::ServerId;

use crate::error::PlacementError;
use crate::hash::{key_position, rehash_address};

/// One server's slice of the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    id: ServerId,
    capacity: u64,
}

/// Servers own contiguous address ranges sized by their capacity.
///
/// Ranges are laid out in join order over `[0, total_capacity)`. Keys hash
/// into `[0, total_nodes)`; an address outside the provisioned range is
/// re-hashed until it lands inside, so the probability of picking a server
/// is proportional to its capacity regardless of `total_nodes`.
///
/// Re-hashing is a deterministic walk over a finite space and may cycle
/// without ever landing in range. After `max_rehash` steps the address is
/// folded into range with `address % total_capacity`.
#[derive(Debug, Clone)]
pub struct WeightedRing {
    ranges: Vec<Range>,
    total_capacity: u64,
    total_nodes: u64,
    seed: u64,
    max_rehash: u32,
}

impl WeightedRing {
    /// Create an empty ring hashing into `[0, total_nodes)`.
    pub fn new(total_nodes: u64, seed: u64, max_rehash: u32) -> Result<Self, PlacementError> {
        if total_nodes == 0 {
            return Err(PlacementError::EmptyAddressSpace);
        }
        Ok(Self {
            ranges: Vec::new(),
            total_capacity: 0,
            total_nodes,
            seed,
            max_rehash,
        })
    }

    /// Size of the hash address space.
    pub fn total_nodes(&self) -> u64 {
        self.total_nodes
    }

    /// Sum of all placed capacities.
    pub fn total_capacity(&self) -> u64 {
        self.total_capacity
    }

    /// Number of placed servers.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether no server is placed.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Append a server's range after every existing range.
    pub fn push(&mut self, id: ServerId, capacity: u64) -> Result<(), PlacementError> {
        if capacity == 0 {
            return Err(PlacementError::ZeroCapacity(id));
        }
        if self.ranges.iter().any(|r| r.id == id) {
            return Err(PlacementError::AlreadyPlaced(id));
        }
        let start = self.total_capacity;
        self.ranges.push(Range { id, capacity });
        self.total_capacity += capacity;
        if self.total_capacity > self.total_nodes {
            warn!(
                total_capacity = self.total_capacity,
                total_nodes = self.total_nodes,
                "capacity exceeds hash space; upper ranges are unreachable"
            );
        }
        debug!(server = %id, start, end = self.total_capacity, "appended capacity range");
        Ok(())
    }

    /// Remove a server's range, shifting later ranges down. Returns the
    /// capacity it held.
    pub fn remove(&mut self, id: ServerId) -> Option<u64> {
        let idx = self.ranges.iter().position(|r| r.id == id)?;
        let range = self.ranges.remove(idx);
        self.total_capacity -= range.capacity;
        debug!(server = %id, capacity = range.capacity, "removed capacity range");
        Some(range.capacity)
    }

    /// Address range `[start, end)` owned by `id`.
    pub fn range_of(&self, id: ServerId) -> Option<(u64, u64)> {
        let mut start = 0;
        for range in &self.ranges {
            let end = start + range.capacity;
            if range.id == id {
                return Some((start, end));
            }
            start = end;
        }
        None
    }

    /// Server owning `address`: the first whose cumulative end exceeds it.
    ///
    /// Ranges are half-open, so address `c0` belongs to the second server
    /// rather than the first as a subtract-until-non-positive walk would
    /// give, and every server owns exactly `capacity` addresses.
    pub fn owner_of(&self, address: u64) -> Option<ServerId> {
        let mut end = 0;
        for range in &self.ranges {
            end += range.capacity;
            if address < end {
                return Some(range.id);
            }
        }
        None
    }

    /// First in-range address for a request key.
    pub fn key_address(&self, key: &str) -> Option<u64> {
        self.bound(key_position(key, self.seed, self.total_nodes))
    }

    /// Next in-range address derived from a previous one.
    pub fn next_address(&self, address: u64) -> Option<u64> {
        self.bound(rehash_address(address, self.seed, self.total_nodes))
    }

    /// Re-hash `address` until it falls inside `[0, total_capacity)`.
    ///
    /// Returns `None` on an empty ring.
    pub fn bound(&self, address: u64) -> Option<u64> {
        if self.total_capacity == 0 {
            return None;
        }
        let mut address = address;
        for _ in 0..self.max_rehash {
            if address < self.total_capacity {
                return Some(address);
            }
            address = rehash_address(address, self.seed, self.total_nodes);
        }
        if address < self.total_capacity {
            return Some(address);
        }
        debug!(
            address,
            total_capacity = self.total_capacity,
            max_rehash = self.max_rehash,
            "rehash bound reached, folding address into range"
        );
        Some(address % self.total_capacity)
    }

    /// Placed servers in join order.
    pub fn members(&self) -> Vec<ServerId> {
        self.ranges.iter().map(|r| r.id).collect()
    }
}
