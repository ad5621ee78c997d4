//! Consistent hashing rings for request placement.
//!
//! Two layouts are supported, selected by
//! [`PlacementStrategy`](weir_types::PlacementStrategy):
//!
//! - [`SlotRing`]: a fixed ring of `total_nodes` slots. A server lands on
//!   `hash(name) mod total_nodes`; collisions advance by a fixed stride of
//!   `ceil(total_nodes / 16)`. A request key lands on
//!   `hash(key) mod total_nodes` and walks forward to the next occupied slot.
//! - [`WeightedRing`]: servers own contiguous address ranges sized by their
//!   capacity, in join order. A request key hashes into `[0, total_nodes)`
//!   and is re-hashed until it falls inside `[0, total_capacity)`, so each
//!   server is picked with probability proportional to its capacity.
//!
//! [`Ring`] wraps both and yields a [`Probe`]: the ordered sequence of
//! candidate servers a router should try for one request.
//! [`RequestHistory`] remembers where recently retried requests landed so
//! that later routing of the same key stays sticky.

mod error;
pub mod hash;
mod history;
mod ring;
mod slots;
mod weighted;

pub use error::PlacementError;
pub use history::RequestHistory;
pub use ring::{Candidate, Probe, Ring};
pub use slots::SlotRing;
pub use weighted::WeightedRing;
