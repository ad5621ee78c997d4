//! Integration test: the router service.
//!
//! Many clients share one router task through cloned handles while
//! membership changes are interleaved with routing.

use std::time::Duration;

use weir_integration_tests::{distinct_keys, traffic};
use weir_router::{Router, RouterConfig, RouterError, service};
use weir_types::RouterEvent;

fn router(config: RouterConfig, servers: usize, capacity: u64) -> Router {
    let mut router = Router::new(config).unwrap();
    router.add_servers(servers, capacity).unwrap();
    router
}

/// Eight clients route concurrently; every request is accounted for.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_concurrent_clients() {
    let handle = service::start(router(RouterConfig::discrete(1_024), 8, 100));

    let mut tasks = Vec::new();
    for client in 0..8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                handle
                    .add_request(format!("client-{client}/req-{i}"))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.total_requests_routed, 400);
    assert_eq!(metrics.total_dropped(), 0);

    let loads = handle.server_loads().await.unwrap();
    assert_eq!(loads.iter().map(|l| l.occupancy).sum::<u64>(), 400);
    assert!(loads.iter().all(|l| l.occupancy <= l.capacity));
}

/// Joins and departures interleaved with routing never lose requests
/// silently: what is held equals what was placed minus what removals
/// dropped.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_membership_changes_while_routing() {
    let handle = service::start(router(RouterConfig::discrete(1_024), 4, 200));

    let mut routers = Vec::new();
    for client in 0..4u64 {
        let handle = handle.clone();
        routers.push(tokio::spawn(async move {
            let mut placed = 0u64;
            for key in traffic(100, client) {
                if handle.add_request(key).await.is_ok() {
                    placed += 1;
                }
            }
            placed
        }));
    }

    let membership = {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut dropped = 0u64;
            for i in 0..5 {
                let name = format!("extra-{i}");
                handle.add_server(name.clone(), 50).await.unwrap();
                tokio::task::yield_now().await;
                let report = handle.remove_server(name).await.unwrap();
                assert_eq!(report.released, report.replaced + report.dropped());
                dropped += report.dropped() as u64;
            }
            dropped
        })
    };

    let mut placed = 0;
    for task in routers {
        placed += task.await.unwrap();
    }
    let dropped = membership.await.unwrap();

    let loads = handle.server_loads().await.unwrap();
    let held: u64 = loads.iter().map(|l| l.occupancy).sum();
    assert_eq!(held, placed - dropped);
    assert_eq!(loads.len(), 4);
}

/// A batch goes through as one queued operation.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_route_all_through_handle() {
    let handle = service::start(router(RouterConfig::weighted(5_000), 4, 100));
    let summary = handle.route_all(distinct_keys(120)).await.unwrap();
    assert_eq!(summary.total(), 120);

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.total_requests_routed, summary.placed as u64);
}

/// Candidate lookups through the handle agree with real placement.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_candidate_through_handle() {
    let handle = service::start(router(RouterConfig::discrete(256), 5, 1_000));
    for key in distinct_keys(20) {
        let expected = handle.candidate(key.clone()).await.unwrap().unwrap();
        let placement = handle.add_request(key).await.unwrap();
        assert_eq!(placement.server, expected);
    }
}

/// Subscribers of the handle see membership events.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_events_through_handle() {
    let handle = service::start(router(RouterConfig::discrete(64), 1, 10));
    let mut events = handle.subscribe();

    handle.add_server("Server1", 10).await.unwrap();
    handle.remove_server("Server0").await.unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(joined, RouterEvent::ServerJoined { ref name, .. } if name == "Server1"));

    let left = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(left, RouterEvent::ServerLeft { ref name, .. } if name == "Server0"));
}

/// After shutdown every call reports that the service has stopped.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_shutdown() {
    let handle = service::start(router(RouterConfig::discrete(64), 2, 10));
    handle.add_request("GET /api/data").await.unwrap();

    handle.shutdown();
    while handle.is_running() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        handle.add_request("GET /api/data").await.unwrap_err(),
        RouterError::ServiceStopped
    );
    assert_eq!(
        handle.add_server("Server9", 1).await.unwrap_err(),
        RouterError::ServiceStopped
    );
    assert_eq!(handle.metrics().await.unwrap_err(), RouterError::ServiceStopped);
}
