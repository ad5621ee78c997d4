//! Error types for the router.

use weir_placement::PlacementError;

/// Errors returned by router operations.
///
/// None of these are fatal: a dropped request is a counted data-loss event
/// and the router stays usable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    /// No alive server exists, so nothing can take the request.
    #[error("no alive servers in the pool")]
    NoAliveServers,

    /// Every probe within the retry budget was rejected.
    #[error("no placement found after {attempts} attempts")]
    RetryBudgetExceeded {
        /// Probes made before giving up.
        attempts: u32,
    },

    /// The named server is not in the pool.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// A server with this name is already in the pool.
    #[error("server already exists: {0}")]
    DuplicateServer(String),

    /// Servers need a positive capacity.
    #[error("invalid capacity for server {0}: must be positive")]
    InvalidCapacity(String),

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Placement on the ring failed.
    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    /// The router service has stopped.
    #[error("router service stopped")]
    ServiceStopped,
}
