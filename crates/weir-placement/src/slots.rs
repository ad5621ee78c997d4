//! Discrete-slot ring: one server per slot, linear-probe placement.

use std::collections::HashMap;

use tracing::debug;
use weir_types::ServerId;

use crate::error::PlacementError;
use crate::hash::key_position;

/// A fixed ring of `total_nodes` slots, each empty or holding one server.
///
/// A server's home slot is `hash(name) mod total_nodes`. When that slot is
/// taken the insert advances by a fixed stride of `ceil(total_nodes / 16)`
/// (wrapping), which is a deterministic linear probe, not a rehash with a new
/// seed. If the stride orbit holds no free slot the insert falls back to a
/// +1 scan, so an insert only fails when every slot is occupied.
///
/// Servers are found by identity through a `ServerId -> slot` index, never by
/// re-hashing their name: after a probed insert the home slot may belong to
/// someone else.
#[derive(Debug, Clone)]
pub struct SlotRing {
    slots: Vec<Option<ServerId>>,
    index: HashMap<ServerId, usize>,
    seed: u64,
}

impl SlotRing {
    /// Create an empty ring with `total_nodes` slots.
    pub fn new(total_nodes: usize, seed: u64) -> Result<Self, PlacementError> {
        if total_nodes == 0 {
            return Err(PlacementError::EmptyAddressSpace);
        }
        Ok(Self {
            slots: vec![None; total_nodes],
            index: HashMap::new(),
            seed,
        })
    }

    /// Number of slots.
    pub fn total_nodes(&self) -> usize {
        self.slots.len()
    }

    /// Collision stride: `ceil(total_nodes / 16)`.
    pub fn stride(&self) -> usize {
        self.slots.len().div_ceil(16)
    }

    /// Number of placed servers.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no server is placed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Home slot for a server name or request key.
    pub fn home_slot(&self, key: &str) -> usize {
        key_position(key, self.seed, self.slots.len() as u64) as usize
    }

    /// Place a server, returning the slot it landed on.
    pub fn insert(&mut self, id: ServerId, name: &str) -> Result<usize, PlacementError> {
        if self.index.contains_key(&id) {
            return Err(PlacementError::AlreadyPlaced(id));
        }
        let total_nodes = self.slots.len();
        if self.index.len() == total_nodes {
            return Err(PlacementError::RingFull { total_nodes });
        }

        let home = self.home_slot(name);
        let slot = self
            .probe_stride(home)
            .or_else(|| self.probe_linear(home))
            .ok_or(PlacementError::RingFull { total_nodes })?;

        self.slots[slot] = Some(id);
        self.index.insert(id, slot);
        debug!(server = %id, name, home, slot, "placed server on ring");
        Ok(slot)
    }

    /// Vacate a server's slot. Neighbouring slots are left untouched.
    pub fn remove(&mut self, id: ServerId) -> Option<usize> {
        let slot = self.index.remove(&id)?;
        self.slots[slot] = None;
        debug!(server = %id, slot, "vacated ring slot");
        Some(slot)
    }

    /// Slot currently held by `id`.
    pub fn slot_of(&self, id: ServerId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Server at `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<ServerId> {
        self.slots.get(slot).copied().flatten()
    }

    /// First occupied slot at or after `slot`, wrapping around the ring.
    pub fn occupied_from(&self, slot: usize) -> Option<(usize, ServerId)> {
        if self.index.is_empty() {
            return None;
        }
        let total_nodes = self.slots.len();
        (0..total_nodes)
            .map(|offset| (slot + offset) % total_nodes)
            .find_map(|pos| self.slots[pos].map(|id| (pos, id)))
    }

    /// Candidate server for a request key: the first occupied slot at or
    /// after the key's home slot.
    pub fn locate(&self, key: &str) -> Option<(usize, ServerId)> {
        self.occupied_from(self.home_slot(key))
    }

    /// Placed servers in slot order.
    pub fn members(&self) -> Vec<ServerId> {
        self.slots.iter().flatten().copied().collect()
    }

    fn probe_stride(&self, home: usize) -> Option<usize> {
        let total_nodes = self.slots.len();
        let stride = self.stride();
        let mut pos = home;
        loop {
            if self.slots[pos].is_none() {
                return Some(pos);
            }
            pos = (pos + stride) % total_nodes;
            if pos == home {
                return None;
            }
        }
    }

    fn probe_linear(&self, home: usize) -> Option<usize> {
        let total_nodes = self.slots.len();
        (1..total_nodes)
            .map(|offset| (home + offset) % total_nodes)
            .find(|pos| self.slots[*pos].is_none())
    }
}
