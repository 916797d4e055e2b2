//! Monitor lifecycle contract tests
//!
//! stop() must be deterministic: once it returns, no further
//! notification handling runs. Transient refresh failures must never
//! end the subscription.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tunroute_core::model::{AddressFamily, InterfaceId, RouteEntry};
use tunroute_core::monitor::DefaultRouteMonitor;

use common::{net, MockEgressBinder, MockNetStack, MockTunDevice};

fn tun_id() -> InterfaceId {
    InterfaceId::new(0xbeef, 10)
}

fn eth_id() -> InterfaceId {
    InterfaceId::new(0xe000, 2)
}

fn v4_default(iface: InterfaceId, metric: u32) -> RouteEntry {
    RouteEntry::new(net("0.0.0.0/0"), Some("192.168.1.1".parse().unwrap()), metric, iface)
}

#[tokio::test]
async fn no_notification_handling_after_stop_returns() {
    let stack = Arc::new(MockNetStack::new());
    let device = Arc::new(MockTunDevice::new(tun_id(), 65535));
    let binder = Arc::new(MockEgressBinder::new());

    let handle = DefaultRouteMonitor::start(
        stack.clone(),
        stack.clone(),
        device.clone(),
        binder.clone(),
        true,
    )
    .await
    .unwrap();

    handle.stop().await;

    // A change that would certainly rebind if the monitor were alive.
    stack.seed_route(v4_default(eth_id(), 10));
    stack.set_mtu(eth_id(), AddressFamily::V4, 1500);
    stack.emit(MockNetStack::default_change());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(binder.v4_bind_calls().is_empty());
    assert!(device.forced_mtus().is_empty());
    assert_eq!(stack.record_writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn initial_refresh_failure_fails_start() {
    let stack = Arc::new(MockNetStack::new());
    let device = Arc::new(MockTunDevice::new(tun_id(), 65535));
    let binder = Arc::new(MockEgressBinder::new());
    stack.fail_next_lists(2);

    let result = DefaultRouteMonitor::start(
        stack.clone(),
        stack.clone(),
        device,
        binder,
        true,
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn transient_refresh_failures_do_not_end_the_subscription() {
    let stack = Arc::new(MockNetStack::new());
    let device = Arc::new(MockTunDevice::new(tun_id(), 65535));
    let binder = Arc::new(MockEgressBinder::new());

    let handle = DefaultRouteMonitor::start(
        stack.clone(),
        stack.clone(),
        device,
        binder.clone(),
        true,
    )
    .await
    .unwrap();

    // One refresh worth of list failures.
    stack.fail_next_lists(2);
    stack.emit(MockNetStack::default_change());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(binder.v4_bind_calls().is_empty());

    // The monitor is still alive and handles the next change.
    stack.seed_route(v4_default(eth_id(), 10));
    stack.emit(MockNetStack::default_change());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(binder.v4_bind_calls(), vec![eth_id().index()]);

    handle.stop().await;
}
