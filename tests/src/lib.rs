//! Shared test harness for Weir integration tests.
//!
//! Provides [`TestPool`], a router preloaded with servers plus the
//! bookkeeping needed to check pool-wide invariants, and seeded request
//! key generators.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use weir_admission::AdmissionController;
use weir_router::{Router, RouterConfig};
use weir_types::{BatchSummary, RemovalReport, ServerLoad};

/// Endpoints used to build synthetic request keys.
const ENDPOINTS: [&str; 6] = [
    "GET /api/users",
    "GET /api/items",
    "POST /api/update",
    "POST /api/orders",
    "DELETE /api/items",
    "PUT /api/profile",
];

/// The key that dominates generated traffic.
pub const HOT_KEY: &str = "GET /api/data";

// =========================================================================
// Key generators
// =========================================================================

/// `count` distinct keys, in a fixed order.
pub fn distinct_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("GET /api/item/{i}")).collect()
}

/// `count` keys drawn from a seeded mix: roughly a fifth are [`HOT_KEY`],
/// the rest spread over a few endpoints and a bounded id space, so keys
/// repeat.
pub fn traffic(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            if rng.random_bool(0.2) {
                return HOT_KEY.to_string();
            }
            let endpoint = ENDPOINTS[rng.random_range(0..ENDPOINTS.len())];
            let id: u32 = rng.random_range(0..200);
            format!("{endpoint}/{id}")
        })
        .collect()
}

// =========================================================================
// TestPool
// =========================================================================

/// A router plus the running totals needed to check conservation.
///
/// Every request that enters through [`TestPool::route`] and every
/// removal through [`TestPool::remove`] updates `expected_held`, which
/// must always equal the summed occupancy of the pool.
pub struct TestPool {
    router: Router,
    expected_held: u64,
    removals: Vec<RemovalReport>,
}

impl TestPool {
    /// Build a pool of `servers` equal-capacity servers.
    pub fn new(config: RouterConfig, servers: usize, capacity: u64) -> Self {
        let mut router = Router::new(config).expect("valid config");
        router.add_servers(servers, capacity).expect("servers join");
        Self {
            router,
            expected_held: 0,
            removals: Vec::new(),
        }
    }

    /// Build a pool with two capacity tiers.
    pub fn tiered(config: RouterConfig, servers: usize, tiers: [u64; 2]) -> Self {
        let mut router = Router::new(config).expect("valid config");
        router
            .add_servers_tiered(servers, tiers)
            .expect("servers join");
        Self {
            router,
            expected_held: 0,
            removals: Vec::new(),
        }
    }

    /// Build a pool of equal-capacity servers whose admission decisions come
    /// from a caller-built controller.
    pub fn with_admission(
        config: RouterConfig,
        admission: AdmissionController,
        servers: usize,
        capacity: u64,
    ) -> Self {
        let mut router = Router::with_admission(config, admission).expect("valid config");
        router.add_servers(servers, capacity).expect("servers join");
        Self {
            router,
            expected_held: 0,
            removals: Vec::new(),
        }
    }

    /// The router under test.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Mutable access for operations the pool does not track.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Route every key and track what was placed.
    pub fn route<K: AsRef<str>>(&mut self, keys: &[K]) -> BatchSummary {
        let summary = self.router.route_all(keys);
        self.expected_held += summary.placed as u64;
        summary
    }

    /// Add a server. Join rebalancing moves requests without changing the
    /// total held.
    pub fn join(&mut self, name: &str, capacity: u64) {
        self.router.add_server(name, capacity).expect("server joins");
    }

    /// Remove a server and track anything its departure dropped.
    pub fn remove(&mut self, name: &str) -> RemovalReport {
        let report = self.router.remove_server(name).expect("server exists");
        self.expected_held -= report.dropped() as u64;
        self.removals.push(report.clone());
        report
    }

    /// Reports from every removal so far.
    pub fn removals(&self) -> &[RemovalReport] {
        &self.removals
    }

    /// Requests the pool should be holding.
    pub fn expected_held(&self) -> u64 {
        self.expected_held
    }

    /// Requests the pool is actually holding.
    pub fn held(&self) -> u64 {
        self.router.server_loads().iter().map(|l| l.occupancy).sum()
    }

    /// Occupancy per server name.
    pub fn occupancy(&self) -> HashMap<String, u64> {
        self.router
            .server_loads()
            .into_iter()
            .map(|l| (l.name, l.occupancy))
            .collect()
    }

    /// Load snapshot.
    pub fn loads(&self) -> Vec<ServerLoad> {
        self.router.server_loads()
    }

    /// Panic if any pool-wide invariant is broken.
    pub fn assert_invariants(&self) {
        for load in self.router.server_loads() {
            assert!(
                load.occupancy <= load.capacity,
                "{} holds {} of {}",
                load.name,
                load.occupancy,
                load.capacity
            );
        }
        assert_eq!(self.held(), self.expected_held, "requests were lost or duplicated");

        let metrics = self.router.metrics();
        assert!(metrics.alive_servers <= self.router.len());
        assert!(metrics.active_servers <= metrics.alive_servers);
        assert!((0.0..=1.0).contains(&metrics.load_fraction));
    }
}
