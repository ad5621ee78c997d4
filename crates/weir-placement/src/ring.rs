//! Strategy-agnostic ring and probe sequences.

use weir_types::{PlacementStrategy, ServerId};

use crate::error::PlacementError;
use crate::slots::SlotRing;
use crate::weighted::WeightedRing;

/// A ring laid out with one of the two placement strategies.
#[derive(Debug, Clone)]
pub enum Ring {
    /// Discrete-slot placement.
    Slots(SlotRing),
    /// Capacity-weighted range placement.
    Weighted(WeightedRing),
}

/// One candidate produced by a [`Probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Server to try.
    pub server: ServerId,
    /// Slot index (discrete) or range address (weighted) that resolved to it.
    pub address: u64,
}

impl Ring {
    /// Create an empty ring for `strategy`.
    pub fn new(
        strategy: PlacementStrategy,
        total_nodes: usize,
        seed: u64,
        max_rehash: u32,
    ) -> Result<Self, PlacementError> {
        Ok(match strategy {
            PlacementStrategy::Discrete => Self::Slots(SlotRing::new(total_nodes, seed)?),
            PlacementStrategy::Weighted => {
                Self::Weighted(WeightedRing::new(total_nodes as u64, seed, max_rehash)?)
            }
        })
    }

    /// The strategy this ring implements.
    pub fn strategy(&self) -> PlacementStrategy {
        match self {
            Self::Slots(_) => PlacementStrategy::Discrete,
            Self::Weighted(_) => PlacementStrategy::Weighted,
        }
    }

    /// Size of the hash address space.
    pub fn total_nodes(&self) -> usize {
        match self {
            Self::Slots(ring) => ring.total_nodes(),
            Self::Weighted(ring) => ring.total_nodes() as usize,
        }
    }

    /// Number of placed servers.
    pub fn len(&self) -> usize {
        match self {
            Self::Slots(ring) => ring.len(),
            Self::Weighted(ring) => ring.len(),
        }
    }

    /// Whether no server is placed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place a server. `name` drives discrete placement, `capacity` sizes the
    /// weighted range.
    pub fn insert(&mut self, id: ServerId, name: &str, capacity: u64) -> Result<(), PlacementError> {
        match self {
            Self::Slots(ring) => ring.insert(id, name).map(|_| ()),
            Self::Weighted(ring) => ring.push(id, capacity),
        }
    }

    /// Take a server off the ring. Returns whether it was placed.
    pub fn remove(&mut self, id: ServerId) -> bool {
        match self {
            Self::Slots(ring) => ring.remove(id).is_some(),
            Self::Weighted(ring) => ring.remove(id).is_some(),
        }
    }

    /// Placed servers in ring order (slot order or join order).
    pub fn members(&self) -> Vec<ServerId> {
        match self {
            Self::Slots(ring) => ring.members(),
            Self::Weighted(ring) => ring.members(),
        }
    }

    /// Candidate sequence for `key`.
    ///
    /// Discrete: the first occupied slot at or after the key's home slot,
    /// then each following occupied slot, wrapping around the ring.
    ///
    /// Weighted: the first address is `rehash(remembered)` when the key has a
    /// remembered address, otherwise `hash(key)`. Each later address re-hashes
    /// the previous one, so retries never start over from the raw key.
    pub fn probe(&self, key: &str, remembered: Option<u64>) -> Probe<'_> {
        let cursor = match self {
            Self::Slots(ring) => ring.locate(key).map(|(slot, _)| slot as u64),
            Self::Weighted(ring) => match remembered {
                Some(address) => ring.next_address(address),
                None => ring.key_address(key),
            },
        };
        Probe { ring: self, cursor }
    }
}

/// Iterator over the candidate servers for one request.
///
/// The sequence is unbounded on a non-empty ring; callers apply their own
/// retry budget.
#[derive(Debug, Clone)]
pub struct Probe<'a> {
    ring: &'a Ring,
    cursor: Option<u64>,
}

impl Iterator for Probe<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let address = self.cursor?;
        match self.ring {
            Ring::Slots(ring) => {
                let (slot, server) = ring.occupied_from(address as usize)?;
                self.cursor = Some(((slot + 1) % ring.total_nodes()) as u64);
                Some(Candidate {
                    server,
                    address: slot as u64,
                })
            }
            Ring::Weighted(ring) => {
                let server = ring.owner_of(address)?;
                self.cursor = ring.next_address(address);
                Some(Candidate { server, address })
            }
        }
    }
}
