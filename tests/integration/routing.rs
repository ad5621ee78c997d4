//! Integration test: request routing.
//!
//! Placement determinism, capacity-proportional placement on the weighted
//! ring, and how the two admission policies treat repeated keys.

use rand::SeedableRng;
use rand::rngs::StdRng;
use weir_admission::AdmissionController;
use weir_integration_tests::{HOT_KEY, TestPool, distinct_keys, traffic};
use weir_router::{RouterConfig, RouterError};
use weir_types::AdmissionPolicy;

fn all_configs() -> [RouterConfig; 4] {
    [
        RouterConfig::discrete(512),
        RouterConfig::discrete(512).with_policy(AdmissionPolicy::FairShare),
        RouterConfig::weighted(5_000),
        RouterConfig::weighted(5_000).with_policy(AdmissionPolicy::FairShare),
    ]
}

/// 8-slot ring, five servers of capacity 2, three API calls.
#[test]
#[ntest::timeout(10000)]
fn test_eight_slot_ring_places_three_api_calls() {
    let mut pool = TestPool::new(RouterConfig::discrete(8), 5, 2);
    let summary = pool.route(&["GET /api/data", "POST /api/update", "GET /api/users"]);

    assert_eq!(summary.placed, 3);
    assert_eq!(pool.held(), 3);
    pool.assert_invariants();
}

/// Larger servers take a proportionally larger share of distinct keys.
#[test]
#[ntest::timeout(10000)]
fn test_weighted_placement_follows_capacity() {
    let mut pool = TestPool::tiered(RouterConfig::weighted(5_000), 4, [100, 300]);
    let summary = pool.route(&distinct_keys(400));
    assert_eq!(summary.placed, 400);

    let occupancy = pool.occupancy();
    let large = occupancy["Server2"] + occupancy["Server3"];
    let share = large as f64 / 400.0;
    assert!(
        (0.6..=0.9).contains(&share),
        "capacity 300 servers took {share:.2} of keys, expected about 0.75"
    );
    pool.assert_invariants();
}

/// The same traffic through the same configuration lands identically.
#[test]
#[ntest::timeout(30000)]
fn test_same_traffic_same_layout() {
    let keys = traffic(500, 3);
    for config in all_configs() {
        let mut first = TestPool::new(config.clone(), 6, 40);
        let mut second = TestPool::new(config, 6, 40);
        assert_eq!(first.route(&keys).placed, second.route(&keys).placed);
        assert_eq!(first.loads(), second.loads());
        assert_eq!(first.router().metrics(), second.router().metrics());
    }
}

/// A key that is the only thing on its server is never shed.
#[test]
#[ntest::timeout(10000)]
fn test_dominant_key_never_shed() {
    for config in [
        RouterConfig::discrete(256).with_policy(AdmissionPolicy::FairShare),
        RouterConfig::weighted(5_000).with_policy(AdmissionPolicy::FairShare),
    ] {
        let mut pool = TestPool::new(config, 4, 40);
        for _ in 0..30 {
            let placement = pool.router_mut().add_request(HOT_KEY).unwrap();
            assert_eq!(placement.attempts, 1);
        }
        let counts: Vec<u64> = pool.loads().iter().map(|l| l.occupancy).collect();
        assert!(counts.contains(&30), "hot key was split: {counts:?}");
        assert_eq!(counts.iter().sum::<u64>(), 30);
    }
}

/// Fair-share shedding pushes mixed traffic around; hard capacity with
/// plenty of room never reroutes.
#[test]
#[ntest::timeout(10000)]
fn test_fair_share_reroutes_mixed_traffic() {
    let keys = distinct_keys(150);

    let mut fair = TestPool::new(
        RouterConfig::weighted(5_000).with_policy(AdmissionPolicy::FairShare),
        4,
        50,
    );
    fair.route(&keys);
    assert!(fair.router().metrics().reroutes > 0);
    fair.assert_invariants();

    let mut hard = TestPool::new(RouterConfig::weighted(5_000), 4, 1_000);
    hard.route(&keys);
    assert_eq!(hard.router().metrics().reroutes, 0);
    hard.assert_invariants();
}

/// Heavy-hitter reports split each server's distinct keys in two.
#[test]
#[ntest::timeout(10000)]
fn test_heavy_hitter_report_partitions_keys() {
    let mut pool = TestPool::new(RouterConfig::discrete(512), 6, 60);
    pool.route(&traffic(300, 11));

    let reports = pool.router().heavy_hitters(0.25);
    assert_eq!(reports.len(), 6);
    for report in reports {
        let server = pool.router().server(&report.server).unwrap();
        assert_eq!(report.heavy + report.infrequent, server.key_counts().len());
    }
}

/// Exhaustion and total loss are counted separately.
#[test]
#[ntest::timeout(10000)]
fn test_drop_causes_are_distinguished() {
    let mut pool = TestPool::new(RouterConfig::discrete(64), 2, 5);
    let summary = pool.route(&distinct_keys(20));

    assert_eq!(summary.placed, 10);
    assert_eq!(summary.dropped_exhausted, 1);
    assert_eq!(summary.dropped_no_alive, 9);

    let metrics = pool.router().metrics();
    assert_eq!(metrics.dropped_exhausted, 1);
    assert_eq!(metrics.dropped_no_alive, 9);
    assert_eq!(metrics.total_requests_routed, 10);
    pool.assert_invariants();

    assert_eq!(
        pool.router_mut().add_request("late").unwrap_err(),
        RouterError::NoAliveServers
    );
}

/// Shedding driven by an injected random source replays exactly, and the
/// injected policy wins over the configured one.
#[test]
#[ntest::timeout(10000)]
fn test_injected_random_source_replays_shedding() {
    let run = || {
        let admission =
            AdmissionController::with_rng(AdmissionPolicy::FairShare, StdRng::seed_from_u64(7));
        let mut pool = TestPool::with_admission(RouterConfig::discrete(512), admission, 8, 25);
        let summary = pool.route(&traffic(300, 11));
        pool.assert_invariants();
        (summary, pool.loads(), pool.router().config().admission.policy)
    };

    let (summary, loads, policy) = run();
    let (summary_again, loads_again, _) = run();
    assert_eq!(policy, AdmissionPolicy::FairShare);
    assert_eq!(summary.placed, summary_again.placed);
    assert_eq!(summary.dropped_no_alive, summary_again.dropped_no_alive);
    assert_eq!(summary.dropped_exhausted, summary_again.dropped_exhausted);
    assert_eq!(loads, loads_again);
}
