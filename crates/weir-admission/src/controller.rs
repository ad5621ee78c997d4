//! Admission control policies.
//!
//! Rejections are plain values ([`Verdict`]), never errors: the router owns
//! retry and rerouting.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;
use weir_types::AdmissionPolicy;

use crate::server::Server;

/// Result of offering a request to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The server took the request.
    Accepted,
    /// Fair-share shedding turned the request away. The server is unchanged.
    Shed,
    /// The server was full. It is now dead and its overload count grew.
    Overloaded,
}

impl Verdict {
    /// Whether the request was accepted.
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Fair-share rejection probability.
///
/// `((occupancy - matches) / capacity)^2`: the squared fraction of capacity
/// held by keys other than the one being offered. Zero capacity always
/// rejects.
pub fn rejection_probability(occupancy: u64, matches: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 1.0;
    }
    let others = occupancy.saturating_sub(matches) as f64 / capacity as f64;
    (others * others).min(1.0)
}

/// Decides whether a server accepts a request.
///
/// The random source is injectable so shedding is reproducible under a
/// fixed seed.
pub struct AdmissionController {
    policy: AdmissionPolicy,
    rng: Box<dyn RngCore + Send>,
}

impl AdmissionController {
    /// Create a controller whose random source is seeded with `seed`.
    pub fn new(policy: AdmissionPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    /// Create a controller drawing from a caller-supplied random source.
    pub fn with_rng(policy: AdmissionPolicy, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            policy,
            rng: Box::new(rng),
        }
    }

    /// Active policy.
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Offer `key` to `server`.
    ///
    /// Under [`AdmissionPolicy::FairShare`] the request is first shed with
    /// [`rejection_probability`] unless `force` is set; requests migrated
    /// during rebalancing are forced so they are never shed twice. The hard
    /// capacity check always applies.
    pub fn admit(&mut self, server: &mut Server, key: &str, force: bool) -> Verdict {
        if self.policy == AdmissionPolicy::FairShare && !force {
            let p = rejection_probability(server.occupancy(), server.match_count(key), server.capacity());
            if p > 0.0 && self.rng.random::<f64>() < p {
                debug!(server = %server.name(), key, p, "request shed");
                return Verdict::Shed;
            }
        }
        if server.try_accept(key) {
            Verdict::Accepted
        } else {
            Verdict::Overloaded
        }
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
