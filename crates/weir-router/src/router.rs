//! The router: membership, request placement, redistribution and metrics.
//!
//! A [`Router`] owns the ring, every server and the admission controller.
//! All mutation goes through `&mut self`, so a router is never observed
//! half-updated; [`crate::service`] wraps one in a task when several callers
//! need to share it.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use weir_admission::{AdmissionController, Server};
use weir_placement::{RequestHistory, Ring};
use weir_types::{
    AdmissionPolicy, BatchSummary, DropReason, HeavyHitterReport, Placement, PlacementStrategy,
    RemovalReport, RouterEvent, RouterMetrics, ServerId, ServerLoad,
};

use crate::config::RouterConfig;
use crate::error::RouterError;

/// Outcome of walking one probe sequence.
#[derive(Debug, Default)]
struct ProbeOutcome {
    /// Name of the accepting server, if any.
    accepted: Option<String>,
    /// Candidates visited.
    attempts: u32,
    /// Servers that died during the walk.
    deaths: Vec<String>,
}

/// Routes request keys onto a pool of capacity-bounded servers.
#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    ring: Ring,
    servers: HashMap<ServerId, Server>,
    /// Name index, so removal never depends on re-hashing a name.
    names: HashMap<String, ServerId>,
    history: RequestHistory,
    admission: AdmissionController,
    next_id: u64,
    total_requests_routed: u64,
    dropped_no_alive: u64,
    dropped_exhausted: u64,
    reroutes: u64,
    event_tx: broadcast::Sender<RouterEvent>,
}

impl Router {
    /// Create an empty router. Fair-share shedding draws from a random
    /// source seeded with `admission.rng_seed`.
    pub fn new(config: RouterConfig) -> Result<Self, RouterError> {
        let admission = AdmissionController::new(config.admission.policy, config.admission.rng_seed);
        Self::with_admission(config, admission)
    }

    /// Create an empty router with a caller-built admission controller.
    ///
    /// The controller's policy replaces `admission.policy` in the stored
    /// config.
    pub fn with_admission(
        mut config: RouterConfig,
        admission: AdmissionController,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        config.admission.policy = admission.policy();
        let ring = Ring::new(
            config.ring.strategy,
            config.ring.total_nodes,
            config.ring.seed,
            config.ring.max_rehash,
        )?;
        let (event_tx, _) = broadcast::channel(256);

        debug!(
            strategy = %config.ring.strategy,
            policy = %admission.policy(),
            total_nodes = config.ring.total_nodes,
            "router created"
        );

        Ok(Self {
            history: RequestHistory::new(config.history.capacity),
            config,
            ring,
            servers: HashMap::new(),
            names: HashMap::new(),
            admission,
            next_id: 0,
            total_requests_routed: 0,
            dropped_no_alive: 0,
            dropped_exhausted: 0,
            reroutes: 0,
            event_tx,
        })
    }

    /// Subscribe to membership, health and drop events.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<RouterEvent> {
        self.event_tx.clone()
    }

    /// Configuration the router was built with.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Active placement strategy.
    pub fn strategy(&self) -> PlacementStrategy {
        self.ring.strategy()
    }

    /// Active admission policy.
    pub fn policy(&self) -> AdmissionPolicy {
        self.admission.policy()
    }

    /// Number of servers currently placed.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.names.get(name).and_then(|id| self.servers.get(id))
    }

    /// Server names in ring order.
    pub fn server_names(&self) -> Vec<String> {
        self.placed().map(|s| s.name().to_string()).collect()
    }

    /// Recently retried request keys and where they landed.
    pub fn history(&self) -> &RequestHistory {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Add a server and pull a share of existing requests into it.
    ///
    /// Join rebalancing is a proportional skim, not an ownership remap: every
    /// other server, in ring order, gives up to
    /// `ceil(total_nodes / servers_after_join)` requests from the front of
    /// its queue. The skim stops once the newcomer is full. Donors keep their
    /// health state.
    pub fn add_server(&mut self, name: impl Into<String>, capacity: u64) -> Result<ServerId, RouterError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(RouterError::DuplicateServer(name));
        }
        if capacity == 0 {
            return Err(RouterError::InvalidCapacity(name));
        }

        let id = ServerId::new(self.next_id);
        self.ring.insert(id, &name, capacity)?;
        self.next_id += 1;

        let mut server = Server::new(name.clone(), capacity);
        let rebalanced = self.rebalance_into(id, &mut server);
        self.servers.insert(id, server);
        self.names.insert(name.clone(), id);

        info!(server = %name, %id, capacity, rebalanced, "server joined");
        let _ = self.event_tx.send(RouterEvent::ServerJoined {
            name,
            capacity,
            rebalanced,
        });
        Ok(id)
    }

    /// Add `count` servers of equal capacity, named `Server{n}` after the
    /// running server counter.
    pub fn add_servers(&mut self, count: usize, capacity: u64) -> Result<Vec<ServerId>, RouterError> {
        (0..count)
            .map(|_| {
                let name = format!("Server{}", self.next_id);
                self.add_server(name, capacity)
            })
            .collect()
    }

    /// Add `count` servers in two capacity tiers: the first half get
    /// `tiers[0]`, the rest `tiers[1]`.
    pub fn add_servers_tiered(
        &mut self,
        count: usize,
        tiers: [u64; 2],
    ) -> Result<Vec<ServerId>, RouterError> {
        (0..count)
            .map(|i| {
                let capacity = if i < count / 2 { tiers[0] } else { tiers[1] };
                let name = format!("Server{}", self.next_id);
                self.add_server(name, capacity)
            })
            .collect()
    }

    /// Remove a server and re-route every request it held.
    ///
    /// Each released request is either placed again or counted as dropped,
    /// so `released == replaced + dropped`.
    pub fn remove_server(&mut self, name: &str) -> Result<RemovalReport, RouterError> {
        let id = self
            .names
            .remove(name)
            .ok_or_else(|| RouterError::ServerNotFound(name.to_string()))?;
        self.ring.remove(id);
        let requests = self
            .servers
            .remove(&id)
            .map(|mut server| server.take_requests())
            .unwrap_or_default();

        info!(server = %name, %id, released = requests.len(), "server left");
        let _ = self.event_tx.send(RouterEvent::ServerLeft {
            name: name.to_string(),
            released: requests.len(),
        });

        let mut report = RemovalReport {
            server: name.to_string(),
            released: requests.len(),
            replaced: 0,
            dropped_no_alive: 0,
            dropped_exhausted: 0,
        };
        for key in &requests {
            match self.route(key) {
                Ok(_) => report.replaced += 1,
                Err(RouterError::NoAliveServers) => report.dropped_no_alive += 1,
                Err(_) => report.dropped_exhausted += 1,
            }
        }

        debug!(
            server = %name,
            replaced = report.replaced,
            dropped = report.dropped(),
            "released requests redistributed"
        );
        Ok(report)
    }

    fn rebalance_into(&mut self, id: ServerId, newcomer: &mut Server) -> usize {
        let share = self.ring.total_nodes().div_ceil(self.ring.len().max(1)) as u64;
        let mut moved = 0;

        for donor_id in self.ring.members() {
            if donor_id == id {
                continue;
            }
            if newcomer.is_full() {
                break;
            }
            let Some(donor) = self.servers.get_mut(&donor_id) else {
                continue;
            };
            let take = share.min(newcomer.free()) as usize;
            let keys = donor.drain_front(take);
            if !keys.is_empty() {
                debug!(from = %donor.name(), to = %newcomer.name(), count = keys.len(), "rebalancing");
            }
            for key in keys {
                // Forced and bounded by free space, so never shed or refused.
                if self.admission.admit(newcomer, &key, true).is_accepted() {
                    moved += 1;
                }
            }
        }
        moved
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Place one request.
    ///
    /// Fails fast with [`RouterError::NoAliveServers`] when nothing is alive
    /// and with [`RouterError::RetryBudgetExceeded`] when every candidate
    /// within the budget refused. Both count as dropped requests.
    pub fn add_request(&mut self, key: &str) -> Result<Placement, RouterError> {
        let placement = self.route(key)?;
        self.total_requests_routed += 1;
        Ok(placement)
    }

    /// Place every key in order.
    pub fn route_all<I, K>(&mut self, keys: I) -> BatchSummary
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let start = Instant::now();
        let mut summary = BatchSummary::default();
        for key in keys {
            match self.add_request(key.as_ref()) {
                Ok(_) => summary.placed += 1,
                Err(RouterError::NoAliveServers) => summary.dropped_no_alive += 1,
                Err(_) => summary.dropped_exhausted += 1,
            }
        }
        summary.elapsed = start.elapsed();
        summary
    }

    /// First-attempt candidate for `key`, without placing anything.
    pub fn candidate(&self, key: &str) -> Option<String> {
        let remembered = self.remembered(key);
        let candidate = self.ring.probe(key, remembered).next()?;
        self.servers
            .get(&candidate.server)
            .map(|s| s.name().to_string())
    }

    fn remembered(&self, key: &str) -> Option<u64> {
        match self.ring.strategy() {
            PlacementStrategy::Discrete => None,
            PlacementStrategy::Weighted => self.history.get(key),
        }
    }

    fn route(&mut self, key: &str) -> Result<Placement, RouterError> {
        let start = Instant::now();
        if self.alive_servers() == 0 {
            return Err(self.drop_request(key, RouterError::NoAliveServers));
        }

        let outcome = match self.ring.strategy() {
            PlacementStrategy::Discrete => self.probe_discrete(key),
            PlacementStrategy::Weighted => self.probe_weighted(key),
        };
        for name in outcome.deaths {
            info!(server = %name, "server died");
            let _ = self.event_tx.send(RouterEvent::ServerDied { name });
        }

        match outcome.accepted {
            Some(server) => {
                debug!(key, server = %server, attempts = outcome.attempts, "request placed");
                Ok(Placement {
                    server,
                    attempts: outcome.attempts,
                    elapsed: start.elapsed(),
                })
            }
            None => Err(self.drop_request(
                key,
                RouterError::RetryBudgetExceeded {
                    attempts: outcome.attempts,
                },
            )),
        }
    }

    /// Walk forward slot by slot. Hard capacity admission gets one full
    /// revolution; fair-share shedding is bounded by the retry cap.
    fn probe_discrete(&mut self, key: &str) -> ProbeOutcome {
        let budget = match self.admission.policy() {
            AdmissionPolicy::HardCapacity => self.ring.len(),
            AdmissionPolicy::FairShare => self.config.admission.retry_cap as usize,
        };
        let mut outcome = ProbeOutcome::default();

        for candidate in self.ring.probe(key, None).take(budget) {
            outcome.attempts += 1;
            let Some(server) = self.servers.get_mut(&candidate.server) else {
                continue;
            };
            if offer(&mut self.admission, server, key, &mut outcome.deaths) {
                outcome.accepted = Some(server.name().to_string());
                break;
            }
        }
        outcome
    }

    /// Follow the re-hash chain, skipping dead servers. A placement that
    /// needed more than one probe is remembered so the next request for the
    /// same key starts from where this one landed.
    fn probe_weighted(&mut self, key: &str) -> ProbeOutcome {
        let budget = self.config.admission.retry_cap as usize;
        let remembered = self.history.get(key);
        let mut outcome = ProbeOutcome::default();
        let mut landed_at = None;

        for candidate in self.ring.probe(key, remembered).take(budget) {
            outcome.attempts += 1;
            let Some(server) = self.servers.get_mut(&candidate.server) else {
                continue;
            };
            if !server.is_alive() {
                self.reroutes += 1;
                continue;
            }
            if offer(&mut self.admission, server, key, &mut outcome.deaths) {
                outcome.accepted = Some(server.name().to_string());
                landed_at = Some(candidate.address);
                break;
            }
            self.reroutes += 1;
        }

        if outcome.attempts > 1
            && let Some(address) = landed_at
        {
            self.history.record(key, address);
        }
        outcome
    }

    fn drop_request(&mut self, key: &str, error: RouterError) -> RouterError {
        let reason = match &error {
            RouterError::NoAliveServers => {
                self.dropped_no_alive += 1;
                warn!(key, "request dropped: no alive servers");
                DropReason::NoAliveServers
            }
            _ => {
                self.dropped_exhausted += 1;
                warn!(key, %error, "request dropped: retry budget exceeded");
                DropReason::RetryBudgetExceeded
            }
        };
        let _ = self.event_tx.send(RouterEvent::RequestDropped {
            key: key.to_string(),
            reason,
        });
        error
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Servers in ring order.
    fn placed(&self) -> impl Iterator<Item = &Server> {
        self.ring
            .members()
            .into_iter()
            .filter_map(move |id| self.servers.get(&id))
    }

    /// Sum of occupancy over sum of capacity across placed servers. Zero for
    /// an empty pool.
    pub fn load_fraction(&self) -> f64 {
        let (occupancy, capacity) = self
            .servers
            .values()
            .fold((0u64, 0u64), |(o, c), s| (o + s.occupancy(), c + s.capacity()));
        if capacity == 0 {
            return 0.0;
        }
        occupancy as f64 / capacity as f64
    }

    /// Servers whose occupancy equals their capacity right now.
    pub fn dead_servers(&self) -> usize {
        self.servers.values().filter(|s| s.is_full()).count()
    }

    /// Alive servers holding at least one request.
    pub fn active_servers(&self) -> usize {
        self.servers
            .values()
            .filter(|s| s.is_alive() && s.occupancy() > 0)
            .count()
    }

    /// Alive servers regardless of occupancy.
    pub fn alive_servers(&self) -> usize {
        self.servers.values().filter(|s| s.is_alive()).count()
    }

    /// Snapshot of every metric.
    pub fn metrics(&self) -> RouterMetrics {
        RouterMetrics {
            load_fraction: self.load_fraction(),
            total_requests_routed: self.total_requests_routed,
            total_servers_ever: self.next_id,
            dead_servers: self.dead_servers(),
            active_servers: self.active_servers(),
            alive_servers: self.alive_servers(),
            dropped_no_alive: self.dropped_no_alive,
            dropped_exhausted: self.dropped_exhausted,
            reroutes: self.reroutes,
        }
    }

    /// Per-server load, in ring order.
    pub fn server_loads(&self) -> Vec<ServerLoad> {
        self.placed().map(Server::load).collect()
    }

    /// Per-server split of distinct keys into heavy hitters (holding at
    /// least `threshold * capacity` slots) and the rest, in ring order.
    pub fn heavy_hitters(&self, threshold: f64) -> Vec<HeavyHitterReport> {
        self.placed()
            .map(|server| {
                let cutoff = threshold * server.capacity() as f64;
                let counts = server.key_counts();
                let heavy = counts.values().filter(|&&n| n as f64 >= cutoff).count();
                HeavyHitterReport {
                    server: server.name().to_string(),
                    heavy,
                    infrequent: counts.len() - heavy,
                }
            })
            .collect()
    }
}

/// Offer `key` to `server`, noting the server if this offer killed it.
fn offer(
    admission: &mut AdmissionController,
    server: &mut Server,
    key: &str,
    deaths: &mut Vec<String>,
) -> bool {
    let was_alive = server.is_alive();
    let verdict = admission.admit(server, key, false);
    if was_alive && !server.is_alive() {
        deaths.push(server.name().to_string());
    }
    verdict.is_accepted()
}

impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for server in self.placed() {
            writeln!(f, "{}: {}/{}", server.name(), server.occupancy(), server.capacity())?;
        }
        write!(
            f,
            "dead: {}, active: {}, alive: {}",
            self.dead_servers(),
            self.active_servers(),
            self.alive_servers()
        )
    }
}
