//! Error types for the placement crate.

use weir_types::ServerId;

/// Errors produced when mutating a ring.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlacementError {
    /// A ring needs at least one address.
    #[error("ring address space must not be empty")]
    EmptyAddressSpace,

    /// Weighted ranges cannot be empty.
    #[error("server {0} has zero capacity")]
    ZeroCapacity(ServerId),

    /// The server already has a position on the ring.
    #[error("server {0} is already placed")]
    AlreadyPlaced(ServerId),

    /// Every slot of the discrete ring is occupied.
    #[error("ring is full: all {total_nodes} slots are occupied")]
    RingFull {
        /// Ring size.
        total_nodes: usize,
    },
}
