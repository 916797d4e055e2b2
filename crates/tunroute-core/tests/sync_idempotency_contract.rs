//! State synchronizer contract tests
//!
//! The synchronizer must converge with the minimum set of mutations,
//! never touch state it does not own, and keep going past individual
//! operation failures.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tunroute_core::model::{InterfaceId, RouteEntry};
use tunroute_core::sync::StateSynchronizer;

use common::{net, MockNetStack};

fn tun_id() -> InterfaceId {
    InterfaceId::new(0xbeef, 10)
}

fn eth_id() -> InterfaceId {
    InterfaceId::new(0xe000, 2)
}

fn sync_for(stack: &Arc<MockNetStack>) -> StateSynchronizer {
    StateSynchronizer::new(stack.clone(), stack.clone())
}

#[tokio::test]
async fn repeated_sync_against_converged_state_mutates_nothing() {
    let stack = Arc::new(MockNetStack::new());
    let sync = sync_for(&stack);

    let addrs = vec![net("10.0.0.5/24"), net("fd00::5/64")];
    let routes = vec![
        RouteEntry::new(net("0.0.0.0/0"), Some("10.0.0.5".parse().unwrap()), 0, tun_id()),
        RouteEntry::new(net("::/0"), Some("fd00::5".parse().unwrap()), 0, tun_id()),
    ];

    sync.sync_addresses(tun_id(), &addrs).await.unwrap();
    sync.sync_routes(tun_id(), &routes).await.unwrap();

    let addr_muts = stack.addr_mutations.load(Ordering::SeqCst);
    let route_muts = stack.route_mutations.load(Ordering::SeqCst);
    assert_eq!(addr_muts, 2);
    assert_eq!(route_muts, 2);

    // Second pass over identical desired state: zero OS mutations.
    sync.sync_addresses(tun_id(), &addrs).await.unwrap();
    sync.sync_routes(tun_id(), &routes).await.unwrap();

    assert_eq!(stack.addr_mutations.load(Ordering::SeqCst), addr_muts);
    assert_eq!(stack.route_mutations.load(Ordering::SeqCst), route_muts);
}

#[tokio::test]
async fn stale_addresses_are_replaced_incrementally() {
    let stack = Arc::new(MockNetStack::new());
    stack.seed_address(tun_id(), net("10.99.0.9/24"));
    stack.seed_address(tun_id(), net("10.0.0.5/24"));
    let sync = sync_for(&stack);

    sync.sync_addresses(tun_id(), &[net("10.0.0.5/24")]).await.unwrap();

    assert_eq!(stack.addresses(tun_id()), vec![net("10.0.0.5/24")]);
    // One removal, no redundant re-add of the address already present.
    assert_eq!(stack.addr_mutations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn link_local_addresses_are_never_removed() {
    let stack = Arc::new(MockNetStack::new());
    stack.seed_address(tun_id(), net("fe80::ab:1/64"));
    let sync = sync_for(&stack);

    sync.sync_addresses(tun_id(), &[net("fd00::5/64")]).await.unwrap();

    let addrs = stack.addresses(tun_id());
    assert!(addrs.contains(&net("fe80::ab:1/64")));
    assert!(addrs.contains(&net("fd00::5/64")));
}

#[tokio::test]
async fn routes_of_other_interfaces_are_untouched() {
    let stack = Arc::new(MockNetStack::new());
    let foreign = RouteEntry::new(
        net("0.0.0.0/0"),
        Some("192.168.1.1".parse().unwrap()),
        25,
        eth_id(),
    );
    stack.seed_route(foreign.clone());
    let sync = sync_for(&stack);

    // Desired state for the tunnel is empty; the physical interface's
    // default route is not ours to remove.
    sync.sync_routes(tun_id(), &[]).await.unwrap();

    assert_eq!(stack.route_mutations.load(Ordering::SeqCst), 0);
    assert!(stack.live_routes().contains(&foreign));
}

#[tokio::test]
async fn stale_tunnel_routes_are_removed() {
    let stack = Arc::new(MockNetStack::new());
    let stale = RouteEntry::new(
        net("10.77.0.0/16"),
        Some("10.0.0.5".parse().unwrap()),
        0,
        tun_id(),
    );
    stack.seed_route(stale.clone());
    let sync = sync_for(&stack);

    let desired = vec![RouteEntry::new(
        net("10.60.0.0/16"),
        Some("10.0.0.5".parse().unwrap()),
        0,
        tun_id(),
    )];
    sync.sync_routes(tun_id(), &desired).await.unwrap();

    let live = stack.live_routes();
    assert!(!live.contains(&stale));
    assert!(live.contains(&desired[0]));
}

#[tokio::test]
async fn partial_failure_applies_the_rest_and_converges_on_retry() {
    let stack = Arc::new(MockNetStack::new());
    stack.fail_add_route(net("10.60.0.0/16"));
    let sync = sync_for(&stack);

    let desired = vec![
        RouteEntry::new(net("10.60.0.0/16"), Some("10.0.0.5".parse().unwrap()), 0, tun_id()),
        RouteEntry::new(net("10.70.0.0/16"), Some("10.0.0.5".parse().unwrap()), 0, tun_id()),
    ];

    assert!(sync.sync_routes(tun_id(), &desired).await.is_err());
    assert!(stack.live_routes().contains(&desired[1]));

    // The failed route is still missing, so a retry adds exactly it.
    sync.sync_routes(tun_id(), &desired).await.unwrap();
    assert!(stack.live_routes().contains(&desired[0]));
}

#[tokio::test]
async fn missing_ipv6_yields_an_empty_v6_snapshot() {
    let stack = Arc::new(MockNetStack::new());
    stack.ipv6_available.store(false, Ordering::SeqCst);
    let sync = sync_for(&stack);

    let desired = vec![RouteEntry::new(
        net("0.0.0.0/0"),
        Some("10.0.0.5".parse().unwrap()),
        0,
        tun_id(),
    )];
    sync.sync_routes(tun_id(), &desired).await.unwrap();
    assert!(stack.live_routes().contains(&desired[0]));
}
