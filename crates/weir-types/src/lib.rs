//! Shared types and identifiers for Weir.
//!
//! This crate defines the core types used across the Weir workspace:
//! the server identifier ([`ServerId`]), strategy selectors
//! ([`PlacementStrategy`], [`AdmissionPolicy`]), health state
//! ([`ServerState`]), router events ([`RouterEvent`]) and the read-only
//! reports handed back to callers ([`Placement`], [`RouterMetrics`],
//! [`ServerLoad`], [`HeavyHitterReport`], [`BatchSummary`],
//! [`RemovalReport`]).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Identifier for a server in the pool.
///
/// Allocated by the router in join order and never reused, so a stale
/// identifier can never alias a newer server that reused the same name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ServerId(u64);

impl ServerId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ServerId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Strategy selectors
// ---------------------------------------------------------------------------

/// How servers are laid out on the ring and how request keys find them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementStrategy {
    /// Fixed-size ring of slots, one server per slot, linear-probe insert.
    #[default]
    Discrete,
    /// Contiguous capacity ranges, one per server, in join order.
    Weighted,
}

/// Policy deciding whether a server accepts an incoming request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Accept iff occupancy < capacity.
    #[default]
    HardCapacity,
    /// Probabilistically shed keys that would crowd out other keys, then
    /// apply the hard capacity check.
    FairShare,
}

impl fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete => f.write_str("discrete"),
            Self::Weighted => f.write_str("weighted"),
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardCapacity => f.write_str("hard-capacity"),
            Self::FairShare => f.write_str("fair-share"),
        }
    }
}

// ---------------------------------------------------------------------------
// Health and events
// ---------------------------------------------------------------------------

/// Health of a single server.
///
/// A server dies the first time a request is offered while it is full and
/// never revives on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// Has never overflowed.
    Alive,
    /// Overflowed at least once.
    Dead,
}

/// Why a request could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// No alive server existed when the request arrived.
    NoAliveServers,
    /// Every probe within the retry budget was rejected.
    RetryBudgetExceeded,
}

/// Events emitted by the router on membership and health transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterEvent {
    /// A server joined the pool.
    ServerJoined {
        /// Server name.
        name: String,
        /// Fixed capacity.
        capacity: u64,
        /// Requests pulled into it by join-time rebalancing.
        rebalanced: usize,
    },
    /// A server left the pool; its requests were re-routed.
    ServerLeft {
        /// Server name.
        name: String,
        /// Requests it held when it left.
        released: usize,
    },
    /// A server overflowed for the first time.
    ServerDied {
        /// Server name.
        name: String,
    },
    /// A request was dropped.
    RequestDropped {
        /// Request key.
        key: String,
        /// Why it was dropped.
        reason: DropReason,
    },
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of a successful request placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Server that accepted the request.
    pub server: String,
    /// Number of probes used, including the accepting one.
    pub attempts: u32,
    /// Wall time spent placing the request.
    pub elapsed: Duration,
}

/// Point-in-time load of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLoad {
    /// Server name.
    pub name: String,
    /// Fixed capacity.
    pub capacity: u64,
    /// Requests currently held.
    pub occupancy: u64,
    /// Health state.
    pub state: ServerState,
    /// Times a request was offered while the server was full.
    pub overload_count: u64,
}

/// Heavy-hitter breakdown of one server's held requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeavyHitterReport {
    /// Server name.
    pub server: String,
    /// Distinct keys holding at least `threshold * capacity` slots.
    pub heavy: usize,
    /// Remaining distinct keys.
    pub infrequent: usize,
}

/// Router-wide metrics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterMetrics {
    /// Sum of occupancy over sum of capacity across placed servers.
    pub load_fraction: f64,
    /// New requests placed since the router was created. Re-placements of
    /// released requests are not counted again.
    pub total_requests_routed: u64,
    /// Servers that ever joined.
    pub total_servers_ever: u64,
    /// Servers whose occupancy equals their capacity right now.
    pub dead_servers: usize,
    /// Alive servers holding at least one request.
    pub active_servers: usize,
    /// Alive servers regardless of occupancy.
    pub alive_servers: usize,
    /// Requests dropped because no server was alive.
    pub dropped_no_alive: u64,
    /// Requests dropped after exhausting the retry budget.
    pub dropped_exhausted: u64,
    /// Extra resolution passes taken in the weighted variant.
    pub reroutes: u64,
}

impl RouterMetrics {
    /// Total dropped requests, whatever the reason.
    pub fn total_dropped(&self) -> u64 {
        self.dropped_no_alive + self.dropped_exhausted
    }
}

/// Summary of routing a batch of requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Requests placed.
    pub placed: usize,
    /// Requests dropped because no server was alive.
    pub dropped_no_alive: usize,
    /// Requests dropped after exhausting the retry budget.
    pub dropped_exhausted: usize,
    /// Wall time for the whole batch.
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Number of requests in the batch.
    pub fn total(&self) -> usize {
        self.placed + self.dropped_no_alive + self.dropped_exhausted
    }
}

/// Result of removing a server from the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    /// Removed server name.
    pub server: String,
    /// Requests it held.
    pub released: usize,
    /// Released requests placed elsewhere.
    pub replaced: usize,
    /// Released requests dropped because no server was alive.
    pub dropped_no_alive: usize,
    /// Released requests dropped after exhausting the retry budget.
    pub dropped_exhausted: usize,
}

impl RemovalReport {
    /// Released requests that could not be placed again.
    pub fn dropped(&self) -> usize {
        self.dropped_no_alive + self.dropped_exhausted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
